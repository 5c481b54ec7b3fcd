//! Restartable quiet-period timer for `tokio::select!` loops.

use std::time::Duration;

use tokio::time::Instant;

/// Quiet period used by both watchers.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// `Idle → PendingDebounce → Idle`.
///
/// Every [`bump`](Debounce::bump) pushes the deadline out again, so a burst
/// of events fires once, after the last one.
#[derive(Debug)]
pub struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Start or restart the timer.
    pub fn bump(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves when the pending deadline passes; never resolves while idle.
    ///
    /// Cancel safe: dropping the future before it completes keeps the timer
    /// pending.
    pub async fn elapsed(&mut self) {
        match self.deadline {
            Some(deadline) => {
                tokio::time::sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending().await,
        }
    }
}

impl Default for Debounce {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}
