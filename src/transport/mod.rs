//! Message transport layer.
//!
//! This module abstracts the bidirectional messaging primitive connecting
//! the pilot and worker contexts behind one capability interface.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐                                ┌──────────────┐
//! │ Pilot context│                                │Worker context│
//! │              │      structured-clone          │              │
//! │   Router     │◄──────────────────────────────►│   Router     │
//! │              │        Transport               │              │
//! └──────────────┘                                └──────────────┘
//! ```
//!
//! Delivery is fire-and-forget: posting when the peer has not yet attached
//! a subscriber silently drops the message. The handshake retry loop is the
//! system's only redundancy against that race; no other delivery guarantee
//! exists at this layer.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | In-memory duplex pair (same-process contexts) |
//! | `websocket` | Generic bidirectional port adapter over WebSocket |

// ============================================================================
// Submodules
// ============================================================================

/// In-memory duplex transport pair.
pub mod channel;

/// WebSocket port adapter.
pub mod websocket;

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Result;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::ChannelTransport;
pub use websocket::WebSocketTransport;

// ============================================================================
// Transport
// ============================================================================

/// Capability interface over a concrete bidirectional messaging primitive.
///
/// One implementation exists per hosting arrangement (in-process pair,
/// WebSocket port); the protocol stack above never sees the difference.
pub trait Transport: Send + Sync {
    /// Posts a payload to the peer context.
    ///
    /// Fire-and-forget: a peer without a live subscriber simply misses the
    /// message and that is not an error.
    fn post(&self, payload: Value) -> Result<()>;

    /// Posts a payload with a zero-copy transfer hint.
    ///
    /// `transfer` lists argument positions whose values may be moved rather
    /// than cloned on transports that support it. The default implementation
    /// ignores the hint.
    fn post_with_transfer(&self, payload: Value, transfer: &[usize]) -> Result<()> {
        let _ = transfer;
        self.post(payload)
    }

    /// Opens an independent inbound message stream.
    ///
    /// Each call returns its own receiver; dropping the receiver detaches
    /// the listener.
    fn subscribe(&self) -> broadcast::Receiver<Value>;
}
