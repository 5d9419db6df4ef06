//! Deriv WebSocket connection.
//!
//! One socket, split into a writer task (outbound queue + application
//! ping keep-alive) and a reader task that forwards text frames to the
//! dispatcher over a bounded channel. There is no reconnect: when the
//! socket goes away the inbound channel closes and the session ends.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, trace, warn};

use super::protocol::OutboundRequest;
use super::VenueTransport;
use crate::types::EngineError;

pub const DEFAULT_ENDPOINT: &str = "wss://ws.derivws.com/websockets/v3";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Full socket URL for an application id.
pub fn endpoint_url(base: &str, app_id: &str) -> String {
    format!("{base}?app_id={app_id}")
}

/// Handle to a live connection. Cheap to clone; the socket closes once
/// every handle is dropped and the reader has finished.
#[derive(Clone)]
pub struct DerivConnection {
    outbound: mpsc::UnboundedSender<Message>,
}

impl DerivConnection {
    /// Open the socket and start the reader/writer tasks.
    ///
    /// Returns the connection and the receiver of inbound text frames.
    pub async fn connect(
        url: &str,
        ping_interval: Duration,
        inbound_capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<String>), EngineError> {
        info!(url = %redact(url), "Connecting to venue");

        let (ws, _) = timeout(CONNECT_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| EngineError::Transport(format!("connect timed out after {CONNECT_TIMEOUT:?}")))?
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        info!("Venue connected");

        let (mut write, mut read) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let (in_tx, in_rx) = mpsc::channel::<String>(inbound_capacity.max(1));

        // Writer: drains the outbound queue and keeps the session alive.
        tokio::spawn(async move {
            let mut keepalive = interval(ping_interval);
            keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
            keepalive.tick().await;
            let ping = OutboundRequest::Ping.to_payload(None).to_string();

            loop {
                tokio::select! {
                    msg = out_rx.recv() => match msg {
                        Some(msg) => {
                            if let Err(e) = write.send(msg).await {
                                error!(error = %e, "WebSocket write failed");
                                break;
                            }
                        }
                        None => {
                            let _ = write.close().await;
                            break;
                        }
                    },
                    _ = keepalive.tick() => {
                        if let Err(e) = write.send(Message::Text(ping.clone())).await {
                            warn!(error = %e, "Keep-alive ping failed");
                            break;
                        }
                        trace!("Sent ping");
                    }
                }
            }
            debug!("Writer task finished");
        });

        // Reader: forwards text frames; answers protocol pings.
        let pong_tx = out_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        let _ = pong_tx.send(Message::Pong(data));
                    }
                    Ok(Message::Close(frame)) => {
                        warn!(frame = ?frame, "Venue closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "WebSocket read failed");
                        break;
                    }
                }
            }
            debug!("Reader task finished");
        });

        Ok((Self { outbound: out_tx }, in_rx))
    }
}

#[async_trait]
impl VenueTransport for DerivConnection {
    async fn send(&self, payload: Value) -> Result<(), EngineError> {
        self.outbound
            .send(Message::Text(payload.to_string()))
            .map_err(|_| EngineError::Transport("connection closed".into()))
    }
}

/// Strip the query string so app ids stay out of the logs.
fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
