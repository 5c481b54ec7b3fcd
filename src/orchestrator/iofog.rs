//! ioFog agent client.
//!
//! - `POST {agent}/v2/config/get` with `{"id": element}` answers
//!   `{"config": "<json text>"}`.
//! - `{agent}/v2/control/socket/id/{element}` is a websocket on which a
//!   binary frame starting with `0x0C` announces new configuration; it is
//!   acknowledged with `[0x0B]`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::orchestrator::{OrchestratorClient, OrchestratorError};
use crate::resilience::backoff::exponential_delay;

const OPCODE_CONFIG_CHANGED: u8 = 0x0C;
const OPCODE_ACK: u8 = 0x0B;

const RECONNECT_BASE: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct ConfigRequest<'a> {
    id: &'a str,
}

#[derive(Deserialize)]
struct ConfigResponse {
    config: String,
}

/// Client for the local ioFog agent.
#[derive(Debug, Clone)]
pub struct IoFogClient {
    http: reqwest::Client,
    config_url: Url,
    control_url: Url,
    element_id: String,
}

impl IoFogClient {
    pub fn new(agent: &Url, element_id: impl Into<String>) -> Result<Self, OrchestratorError> {
        let element_id = element_id.into();
        let config_url = agent.join("/v2/config/get")?;

        let mut control_url = agent.join(&format!("/v2/control/socket/id/{element_id}"))?;
        let ws_scheme = if agent.scheme() == "https" { "wss" } else { "ws" };
        // Only fails for cannot-be-a-base URLs, which `join` already rejected.
        let _ = control_url.set_scheme(ws_scheme);

        // The agent runs next to us; never route to it through a proxy.
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .no_proxy()
            .build()?;

        Ok(Self {
            http,
            config_url,
            control_url,
            element_id,
        })
    }

    pub fn control_url(&self) -> &Url {
        &self.control_url
    }
}

#[async_trait]
impl OrchestratorClient for IoFogClient {
    async fn fetch_config(&self) -> Result<String, OrchestratorError> {
        let response = self
            .http
            .post(self.config_url.clone())
            .json(&ConfigRequest { id: &self.element_id })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ConfigResponse = response.json().await?;
        Ok(body.config)
    }

    fn notifications(&self, shutdown: broadcast::Receiver<()>) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(control_loop(self.control_url.clone(), tx, shutdown));
        rx
    }
}

/// Keep the control socket open, reconnecting with backoff, until shutdown
/// or until nobody listens for notifications any more.
async fn control_loop(url: Url, tx: mpsc::Sender<()>, mut shutdown: broadcast::Receiver<()>) {
    let mut attempt = 0;

    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            connected = connect_async(url.as_str()) => match connected {
                Ok((mut socket, _)) => {
                    tracing::info!(url = %url, "Control channel connected");
                    attempt = 0;

                    loop {
                        tokio::select! {
                            _ = shutdown.recv() => {
                                let _ = socket.close(None).await;
                                return;
                            }
                            frame = socket.next() => match frame {
                                Some(Ok(Message::Binary(data))) if data.first() == Some(&OPCODE_CONFIG_CHANGED) => {
                                    tracing::info!("Orchestrator announced new configuration");
                                    // A full channel already holds a pending signal.
                                    let _ = tx.try_send(());
                                    if let Err(e) = socket.send(Message::binary(vec![OPCODE_ACK])).await {
                                        tracing::warn!(error = %e, "Failed to acknowledge control message");
                                        break;
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None => {
                                    tracing::warn!("Control channel closed by agent");
                                    break;
                                }
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    tracing::warn!(error = %e, "Control channel error");
                                    break;
                                }
                            },
                        }
                        if tx.is_closed() {
                            return;
                        }
                    }
                }
                Err(e) => tracing::warn!(url = %url, error = %e, "Failed to connect control channel"),
            },
        }

        if tx.is_closed() {
            return;
        }

        attempt += 1;
        let delay = exponential_delay(attempt, RECONNECT_BASE, RECONNECT_MAX);
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
