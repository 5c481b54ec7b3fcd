//! Router process launch and exit detection.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::{Child, Command};

/// Tells the router how to interpret its configuration.
const CONF_TYPE_ENV: &str = "QDROUTERD_CONF_TYPE";
const CONF_ENV: &str = "QDROUTERD_CONF";
const CONF_TYPE: &str = "json";

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to start router {binary:?}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for router to exit: {0}")]
    Wait(#[source] std::io::Error),
}

/// How the router receives its configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchConfig {
    /// `--config <path>` to the rendered document.
    File(PathBuf),
    /// The rendered document itself, through the environment.
    Inline(String),
}

/// The supervised router process.
#[derive(Debug, Clone)]
pub struct RouterProcess {
    binary: PathBuf,
    config: LaunchConfig,
}

impl RouterProcess {
    pub fn new(binary: impl Into<PathBuf>, config: LaunchConfig) -> Self {
        Self {
            binary: binary.into(),
            config,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.env(CONF_TYPE_ENV, CONF_TYPE)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        match &self.config {
            LaunchConfig::File(path) => {
                cmd.arg("--config").arg(path);
            }
            LaunchConfig::Inline(text) => {
                cmd.env(CONF_ENV, text);
            }
        }
        cmd
    }

    /// The child is killed if the returned handle is dropped.
    fn spawn(&self) -> Result<Child, SupervisorError> {
        let child = self.command().spawn().map_err(|source| SupervisorError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;
        tracing::info!(binary = ?self.binary, pid = ?child.id(), "Router started");
        Ok(child)
    }

    /// Start the router and wait for it to exit, whatever the reason.
    ///
    /// Dropping the future kills the router.
    pub async fn run(&self) -> Result<ExitStatus, SupervisorError> {
        let mut child = self.spawn()?;
        let status = child.wait().await.map_err(SupervisorError::Wait)?;
        tracing::error!(status = %status, "Router exited");
        Ok(status)
    }
}

/// Exit code for the sidecar given the router's status; 1 when the router
/// was killed by a signal.
pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exit_status_is_propagated() {
        let process = RouterProcess::new("false", LaunchConfig::File("/dev/null".into()));
        let status = process.run().await.unwrap();
        assert!(!status.success());
        assert_eq!(exit_code(status), 1);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let process = RouterProcess::new("/nonexistent/skrouterd", LaunchConfig::Inline("[]".into()));
        assert!(matches!(process.run().await, Err(SupervisorError::Spawn { .. })));
    }

    #[tokio::test]
    async fn inline_config_is_passed_through_environment() {
        let process = RouterProcess::new("sh", LaunchConfig::Inline(r#"[["router", {}]]"#.into()));
        let output = process
            .command()
            .args(["-c", r#"test "$QDROUTERD_CONF_TYPE" = json && test -n "$QDROUTERD_CONF""#])
            .output()
            .await
            .unwrap();
        assert!(output.status.success());
    }

    #[test]
    fn file_config_is_passed_as_argument() {
        let process = RouterProcess::new("skrouterd", LaunchConfig::File("/etc/skupper-router/skupper-router.json".into()));
        let cmd = process.command();
        let args: Vec<_> = cmd.as_std().get_args().collect();
        assert_eq!(args, ["--config", "/etc/skupper-router/skupper-router.json"]);
    }
}
