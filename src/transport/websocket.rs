//! WebSocket port adapter.
//!
//! Adapts a WebSocket stream to the [`Transport`] interface for hosts that
//! run the pilot and worker in separate processes. Messages travel as JSON
//! text frames; a background pump task owns the socket.

// ============================================================================
// Imports
// ============================================================================

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};

use super::Transport;

// ============================================================================
// Constants
// ============================================================================

/// Inbound buffer before slow subscribers start lagging.
const INBOUND_CAPACITY: usize = 256;

// ============================================================================
// WebSocketTransport
// ============================================================================

/// A [`Transport`] backed by a WebSocket stream.
///
/// The pump task reads text frames into the inbound stream and drains the
/// outbound queue onto the socket. Binary, ping and pong frames are ignored;
/// a close frame or socket error terminates the pump.
pub struct WebSocketTransport {
    /// Outbound frame queue drained by the pump task.
    outbound: mpsc::UnboundedSender<Value>,
    /// Inbound fan-out.
    inbound: broadcast::Sender<Value>,
    /// Pump task handle.
    pump: JoinHandle<()>,
}

impl WebSocketTransport {
    /// Wraps an established WebSocket stream.
    ///
    /// Spawns the pump task internally.
    #[must_use]
    pub fn new<S>(ws_stream: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound, _) = broadcast::channel(INBOUND_CAPACITY);

        let pump = tokio::spawn(Self::run_pump(ws_stream, outbound_rx, inbound.clone()));

        Self {
            outbound,
            inbound,
            pump,
        }
    }

    /// Closes the transport and stops the pump task.
    pub fn close(&self) {
        self.pump.abort();
        debug!("websocket transport closed");
    }

    /// Pump loop owning the socket.
    async fn run_pump<S>(
        ws_stream: WebSocketStream<S>,
        mut outbound_rx: mpsc::UnboundedReceiver<Value>,
        inbound: broadcast::Sender<Value>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                frame = ws_read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<Value>(&text) {
                                Ok(value) => {
                                    // No subscriber attached is a silent drop,
                                    // same contract as every transport.
                                    let _ = inbound.send(value);
                                }
                                Err(e) => {
                                    warn!(error = %e, "non-JSON text frame ignored");
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("websocket closed by peer");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "websocket read error");
                            break;
                        }

                        None => {
                            debug!("websocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                payload = outbound_rx.recv() => {
                    match payload {
                        Some(value) => {
                            let text = value.to_string();
                            if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                                error!(error = %e, "websocket write error");
                                break;
                            }
                            trace!("frame sent");
                        }
                        None => {
                            debug!("outbound queue closed");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        debug!("websocket pump terminated");
    }
}

impl Transport for WebSocketTransport {
    fn post(&self, payload: Value) -> Result<()> {
        self.outbound
            .send(payload)
            .map_err(|_| Error::transport_closed("websocket pump stopped"))
    }

    fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.inbound.subscribe()
    }
}

// ============================================================================
// Tests
// ============================================================================
