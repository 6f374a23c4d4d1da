//! Session handshake.
//!
//! Negotiates a fresh session ID between the two contexts before any RPC can
//! occur. The transport can silently drop the very first message (the peer
//! may not have attached its listener yet), so the initiating side re-sends
//! its request on a fixed interval up to a bounded attempt count. That retry
//! loop is the system's only redundancy against the race; once matched, the
//! channel is assumed reliable.
//!
//! # States
//!
//! ```text
//! Parent: idle → requesting (retrying) → established
//! Child:  idle → waiting-for-request   → accepted
//! ```
//!
//! The child never initiates and has no retry logic; it is purely reactive.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::{Envelope, Payload};
use crate::transport::Transport;

use super::Connection;

// ============================================================================
// Constants
// ============================================================================

/// Default handshake attempt budget.
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default spacing between handshake requests.
const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

// ============================================================================
// HandshakeConfig
// ============================================================================

/// Retry parameters for the initiating side.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Maximum number of handshake requests sent before giving up.
    pub max_attempts: u32,
    /// Fixed spacing between requests.
    pub interval: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl HandshakeConfig {
    /// Creates the default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attempt budget.
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the retry interval.
    #[inline]
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

// ============================================================================
// Parent Side
// ============================================================================

/// Initiates a handshake as the parent (pilot) side.
///
/// Mints a fresh session ID, re-sends `handshakeRequest` every
/// `config.interval` until the matching `handshakeResponse` arrives, then
/// tears down the handshake listener and builds a [`Connection`] scoped to
/// the negotiated session.
///
/// # Errors
///
/// - [`Error::HandshakeFailed`] after `config.max_attempts` unanswered
///   requests; fatal for this session and never retried internally
/// - [`Error::TransportClosed`] if the transport dies mid-negotiation
pub async fn initiate(
    transport: Arc<dyn Transport>,
    config: &HandshakeConfig,
) -> Result<Connection> {
    let session_id = SessionId::mint();
    let mut inbound = transport.subscribe();

    for attempt in 1..=config.max_attempts {
        transport.post(Envelope::new(session_id, Payload::HandshakeRequest).to_value())?;
        debug!(%session_id, attempt, "handshake request sent");

        if wait_for_response(&mut inbound, session_id, config.interval).await? {
            debug!(%session_id, attempt, "handshake established");
            return Ok(Connection::new(transport, session_id));
        }
    }

    Err(Error::handshake_failed(config.max_attempts))
}

/// Waits one retry interval for the matching response.
///
/// Returns `Ok(true)` when the response arrived, `Ok(false)` on interval
/// expiry.
async fn wait_for_response(
    inbound: &mut broadcast::Receiver<serde_json::Value>,
    session_id: SessionId,
    interval: Duration,
) -> Result<bool> {
    let deadline = sleep(interval);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => return Ok(false),

            message = inbound.recv() => match message {
                Ok(value) => {
                    let Some(envelope) = Envelope::parse(&value) else {
                        continue;
                    };
                    if envelope.session_id == session_id
                        && envelope.payload == Payload::HandshakeResponse
                    {
                        return Ok(true);
                    }
                    trace!("non-matching negotiation message during handshake");
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(Error::transport_closed("transport died during handshake"));
                }
            }
        }
    }
}

// ============================================================================
// Child Side
// ============================================================================

/// Accepts a handshake as the child (worker) side.
///
/// Waits passively for a `handshakeRequest`, immediately echoes a
/// `handshakeResponse` carrying the same session ID, and builds a
/// [`Connection`] for that session. Callers wanting a bound should wrap this
/// in [`tokio::time::timeout`].
///
/// # Errors
///
/// Returns [`Error::TransportClosed`] if the transport dies while waiting.
pub async fn accept(transport: Arc<dyn Transport>) -> Result<Connection> {
    let mut inbound = transport.subscribe();

    loop {
        match inbound.recv().await {
            Ok(value) => {
                let Some(envelope) = Envelope::parse(&value) else {
                    continue;
                };
                if envelope.payload == Payload::HandshakeRequest {
                    let session_id = envelope.session_id;
                    transport
                        .post(Envelope::new(session_id, Payload::HandshakeResponse).to_value())?;
                    debug!(%session_id, "handshake accepted");
                    return Ok(Connection::new(transport, session_id));
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => {
                return Err(Error::transport_closed("transport died while waiting"));
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Instant;

    use serde_json::{Value, json};

    use crate::transport::ChannelTransport;

    #[tokio::test]
    async fn test_handshake_establishes_matching_sessions() {
        let (pilot_side, worker_side) = ChannelTransport::pair();
        let pilot_side: Arc<dyn Transport> = Arc::new(pilot_side);
        let worker_side: Arc<dyn Transport> = Arc::new(worker_side);

        let child = tokio::spawn(accept(worker_side));

        let parent = initiate(pilot_side, &HandshakeConfig::default())
            .await
            .expect("parent handshake");
        let child = child.await.expect("join").expect("child handshake");

        assert_eq!(parent.session_id(), child.session_id());

        parent.close();
        child.close();
    }

    #[tokio::test]
    async fn test_parent_retries_until_child_attaches_late() {
        let (pilot_side, worker_side) = ChannelTransport::pair();
        let pilot_side: Arc<dyn Transport> = Arc::new(pilot_side);
        let worker_side: Arc<dyn Transport> = Arc::new(worker_side);

        let config = HandshakeConfig::new()
            .with_max_attempts(20)
            .with_interval(Duration::from_millis(20));

        let late_child = tokio::spawn(async move {
            // Miss the first few requests entirely.
            sleep(Duration::from_millis(70)).await;
            accept(worker_side).await
        });

        let parent = initiate(pilot_side, &config).await.expect("parent");
        let child = late_child.await.expect("join").expect("child");
        assert_eq!(parent.session_id(), child.session_id());

        parent.close();
        child.close();
    }

    #[tokio::test]
    async fn test_unanswered_handshake_rejects_after_exact_budget() {
        let (pilot_side, worker_side) = ChannelTransport::pair();
        let pilot_side: Arc<dyn Transport> = Arc::new(pilot_side);

        // Count the requests without ever responding.
        let sends = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let seen = Arc::clone(&sends);
        let mut silent = worker_side.subscribe();
        let counter = tokio::spawn(async move {
            loop {
                match silent.recv().await {
                    Ok(value) => {
                        if Envelope::parse(&value)
                            .is_some_and(|e| e.payload == Payload::HandshakeRequest)
                        {
                            seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let config = HandshakeConfig::new()
            .with_max_attempts(4)
            .with_interval(Duration::from_millis(30));

        let started = Instant::now();
        let err = initiate(pilot_side, &config).await.expect_err("must fail");
        let elapsed = started.elapsed();

        assert!(matches!(err, Error::HandshakeFailed { attempts: 4 }));
        // Four sends spaced by 30ms: not before the budget is spent.
        assert!(elapsed >= Duration::from_millis(4 * 30 - 15));

        // Let any in-flight request drain, then check the exact send count.
        sleep(Duration::from_millis(50)).await;
        assert_eq!(sends.load(std::sync::atomic::Ordering::SeqCst), 4);
        counter.abort();
    }

    #[tokio::test]
    async fn test_child_ignores_foreign_traffic_while_waiting() {
        let (pilot_side, worker_side) = ChannelTransport::pair();
        let pilot_side: Arc<dyn Transport> = Arc::new(pilot_side);
        let worker_side: Arc<dyn Transport> = Arc::new(worker_side);

        let child = tokio::spawn(accept(worker_side));

        // Foreign traffic on the shared transport must not confuse the child.
        pilot_side.post(json!({"unrelated": true})).expect("post");
        pilot_side.post(Value::String("noise".into())).expect("post");

        let parent = initiate(pilot_side, &HandshakeConfig::default())
            .await
            .expect("parent");
        let child = child.await.expect("join").expect("child");
        assert_eq!(parent.session_id(), child.session_id());

        parent.close();
        child.close();
    }
}
