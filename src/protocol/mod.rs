//! Wire protocol message types.
//!
//! This module defines the message format exchanged between the pilot and
//! worker contexts over the transport.
//!
//! # Protocol Overview
//!
//! | Action | Direction | Purpose |
//! |--------|-----------|---------|
//! | `handshakeRequest` | Pilot → Worker | Session negotiation |
//! | `handshakeResponse` | Worker → Pilot | Session acceptance |
//! | `call` | Either | Method invocation request |
//! | `response` | Either | Call result or error |
//! | `event` | Either | Fire-and-forget notification |
//! | `callback` | Either | Invocation of a proxied function argument |
//!
//! Every message carries the protocol marker and a session ID; anything
//! lacking the marker or carrying an unrecognized action is ignored.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | Envelope, payload union, callback proxy, remote error |

// ============================================================================
// Submodules
// ============================================================================

/// Envelope and payload definitions.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{CallbackProxy, Envelope, PROTOCOL_MARKER, Payload, RemoteError};
