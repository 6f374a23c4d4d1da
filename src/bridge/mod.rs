//! Session-scoped RPC bridge.
//!
//! This module turns a raw message transport into request/response calls,
//! fire-and-forget events and callback invocation between the pilot and
//! worker contexts.
//!
//! # Architecture
//!
//! ```text
//! Transport ─► Router ─► Handshake (once) ─► Connection ─► Bridge
//!                                             │
//!                                             ├─ LocalHandle  (serves calls)
//!                                             └─ RemoteHandle (issues calls)
//! ```
//!
//! One [`Connection`] exists per context per session; it is created at
//! handshake completion and dies with the context. A context reload always
//! starts a fresh handshake; no protocol state survives it.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `router` | Session filtering and message classification |
//! | `handshake` | Session negotiation state machine |
//! | `connection` | Router + handle pairing |
//! | `local` | Inbound call service (method table) |
//! | `remote` | Outbound calls and events |
//! | `facade` | The [`Bridge`] facade consumed by application code |

// ============================================================================
// Submodules
// ============================================================================

/// Message router and internal dispatch.
pub mod router;

/// Session handshake.
pub mod handshake;

/// Router + handle pairing.
pub mod connection;

/// Inbound call service.
pub mod local;

/// Outbound calls and events.
pub mod remote;

/// Bridge facade.
pub mod facade;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::connection::Connection;
pub use self::facade::Bridge;
pub use self::handshake::{HandshakeConfig, accept, initiate};
pub use self::local::{CallbackHandle, LocalHandle, MethodHandler, ServedArg};
pub use self::remote::{CallArg, RemoteHandle};
pub use self::router::{CallbackFn, EventListener, Router, TransferFn};
