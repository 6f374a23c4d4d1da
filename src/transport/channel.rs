//! In-memory duplex transport pair.
//!
//! The same-process analogue of two windows exchanging structured-clone
//! messages: each half posts into the other half's inbound stream. Used by
//! hosts that run both contexts in one process, and by every test in this
//! crate.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::Result;

use super::Transport;

// ============================================================================
// Constants
// ============================================================================

/// Inbound buffer per transport half.
const CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// ChannelTransport
// ============================================================================

/// One half of an in-memory duplex transport.
///
/// # Example
///
/// ```ignore
/// use context_bridge::transport::ChannelTransport;
///
/// let (pilot_side, worker_side) = ChannelTransport::pair();
/// ```
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    /// Peer's inbound stream (we post here).
    outbound: broadcast::Sender<Value>,
    /// Own inbound stream (subscribers attach here).
    inbound: broadcast::Sender<Value>,
}

impl ChannelTransport {
    /// Creates a connected pair of transport halves.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (left, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (right, _) = broadcast::channel(CHANNEL_CAPACITY);

        (
            Self {
                outbound: right.clone(),
                inbound: left.clone(),
            },
            Self {
                outbound: left,
                inbound: right,
            },
        )
    }
}

impl Transport for ChannelTransport {
    fn post(&self, payload: Value) -> Result<()> {
        // A send error only means no subscriber is attached yet; the message
        // is dropped, which is the documented delivery contract.
        if self.outbound.send(payload).is_err() {
            trace!("posted with no attached subscriber; message dropped");
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.inbound.subscribe()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[tokio::test]
    async fn test_pair_delivers_both_directions() {
        let (a, b) = ChannelTransport::pair();

        let mut from_a = b.subscribe();
        let mut from_b = a.subscribe();

        a.post(json!({"n": 1})).expect("post");
        b.post(json!({"n": 2})).expect("post");

        assert_eq!(from_a.recv().await.expect("recv"), json!({"n": 1}));
        assert_eq!(from_b.recv().await.expect("recv"), json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_receive() {
        let (a, b) = ChannelTransport::pair();

        let mut first = b.subscribe();
        let mut second = b.subscribe();

        a.post(json!("hello")).expect("post");

        assert_eq!(first.recv().await.expect("recv"), json!("hello"));
        assert_eq!(second.recv().await.expect("recv"), json!("hello"));
    }

    #[tokio::test]
    async fn test_post_without_subscriber_is_silently_dropped() {
        let (a, b) = ChannelTransport::pair();

        // No subscriber attached on b's side yet: the message is lost,
        // not an error. This is the race the handshake retry covers.
        a.post(json!("dropped")).expect("post");

        let mut late = b.subscribe();
        a.post(json!("seen")).expect("post");
        assert_eq!(late.recv().await.expect("recv"), json!("seen"));
    }

    #[tokio::test]
    async fn test_own_posts_do_not_loop_back() {
        let (a, _b) = ChannelTransport::pair();

        let mut own = a.subscribe();
        a.post(json!("out")).expect("post");

        assert!(matches!(
            own.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
