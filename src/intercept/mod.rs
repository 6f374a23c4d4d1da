//! Network interception.
//!
//! Observes outbound requests made in the worker context, matches them
//! against a declarative watch-list, serializes matched response bodies and
//! republishes them as correlated records the pilot can await by logical
//! identifier.
//!
//! # Architecture
//!
//! ```text
//!                 ┌────────────────┐
//! EventedRequest ─┤                │    ┌──────────────────┐
//!                 │ RequestGateway ├───►│  dyn HttpIssuer  │
//! direct issue  ──┤                │    │ (swapped by the  │
//!                 └────────────────┘    │   Interceptor)   │
//!                                       └────────┬─────────┘
//!                                                │ matched records
//!                                                ▼
//!                                    broadcast bus ─► relay ─► bridge event
//! ```
//!
//! Interception is strictly read-only. The real response is never altered,
//! delayed or swallowed; failures while producing a record are caught and
//! logged inside the wrapper.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `descriptor` | Watch-list entries and serialization modes |
//! | `http` | Request gateway and the issuer capability interface |
//! | `evented` | Event-driven request primitive |
//! | `interceptor` | Observing wrapper, record bus, bridge relay |

// ============================================================================
// Submodules
// ============================================================================

/// Watch descriptors.
pub mod descriptor;

/// Request gateway.
pub mod http;

/// Event-driven request primitive.
pub mod evented;

/// Observing interceptor.
pub mod interceptor;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::descriptor::{Serialization, WatchDescriptor};
pub use self::evented::{CompletionListener, EventedRequest, parse_raw_header_block};
pub use self::http::{HttpIssuer, HttpRequest, HttpResponse, RequestGateway};
pub use self::interceptor::{
    InterceptedRecord, Interceptor, REQUEST_RESPONSE_EVENT, WORKER_EVENT, spawn_intercept_relay,
};
