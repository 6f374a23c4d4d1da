//! Context Bridge - Session-scoped RPC and request interception for paired
//! automation contexts.
//!
//! Two isolated execution contexts, a controlling "pilot" and a
//! content-hosting "worker", cooperate as one logical session over an
//! asynchronous message transport that only carries structured-clone-safe
//! payloads.
//!
//! # Architecture
//!
//! The bridge follows a symmetric peer model:
//!
//! - **Pilot**: initiates the handshake, orchestrates, awaits intercepted
//!   requests by logical identifier
//! - **Worker**: accepts the handshake, serves methods, observes its own
//!   outbound traffic
//!
//! Key design principles:
//!
//! - Everything is session-scoped: one handshake mints one [`SessionId`] and
//!   every message carries it; foreign traffic is ignored, never an error
//! - Calls settle exactly once; correlation is by monotonic request ID
//! - Function arguments cross the transport as callback proxies; the real
//!   function never leaves its side
//! - Interception is read-only: the real response always comes back untouched
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use context_bridge::transport::{ChannelTransport, Transport};
//! use context_bridge::{Bridge, HandshakeConfig, Result, pilot};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (pilot_side, worker_side) = ChannelTransport::pair();
//!
//!     // Worker side: accept the handshake, serve methods.
//!     let worker = tokio::spawn(Bridge::open_worker(
//!         Arc::new(worker_side) as Arc<dyn Transport>
//!     ));
//!
//!     // Pilot side: initiate with bounded retry.
//!     let bridge = Bridge::open_pilot(
//!         Arc::new(pilot_side) as Arc<dyn Transport>,
//!         HandshakeConfig::default(),
//!     )
//!     .await?;
//!     let worker = worker.await.expect("worker task")?;
//!
//!     worker.set_method("readTitle", |_args| async { Ok("Example".into()) });
//!
//!     let title =
//!         pilot::run_in_worker(&bridge, "readTitle", vec![], Duration::from_secs(5)).await?;
//!     println!("{title}");
//!
//!     bridge.close();
//!     worker.close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | RPC core: [`Bridge`], handshake, router, handles |
//! | [`intercept`] | Network interception: gateway, watch-list, records |
//! | [`pilot`] | Pilot-side orchestration helpers |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire message types (internal) |
//! | [`transport`] | Message transport layer |

// ============================================================================
// Modules
// ============================================================================

/// Session-scoped RPC bridge.
///
/// This module contains the core types for cross-context calls:
///
/// - [`Bridge`] - facade held by application code
/// - [`Connection`](bridge::Connection) - router + handle pairing
/// - [`HandshakeConfig`] - retry parameters for the initiating side
pub mod bridge;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for protocol entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Network interception.
///
/// Watch-list matching and read-only observation of the worker context's
/// outbound requests.
pub mod intercept;

/// Pilot-side orchestration helpers.
///
/// Timeout-bounded calls, condition polling, interception correlation and
/// bounded retry.
pub mod pilot;

/// Wire protocol message types.
///
/// Internal module defining the envelope and action union.
pub mod protocol;

/// Message transport layer.
///
/// The [`Transport`](transport::Transport) capability interface and its
/// in-memory and WebSocket implementations.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Bridge types
pub use bridge::{
    Bridge, CallArg, CallbackHandle, Connection, HandshakeConfig, LocalHandle, RemoteHandle,
    ServedArg,
};

// Interception types
pub use intercept::{
    EventedRequest, HttpIssuer, HttpRequest, HttpResponse, InterceptedRecord, Interceptor,
    RequestGateway, Serialization, WatchDescriptor,
};

// Pilot helpers
pub use pilot::{UntilTrue, WaitOptions};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CallbackId, ListenerId, RequestId, SessionId};
