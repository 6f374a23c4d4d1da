//! Error types for the context bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use context_bridge::{Result, Error};
//!
//! async fn example(bridge: &Bridge) -> Result<()> {
//!     let token = bridge.call("readToken", vec![]).await?;
//!     println!("{token}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Handshake | [`Error::HandshakeFailed`] |
//! | Connection | [`Error::ConnectionClosed`], [`Error::TransportClosed`] |
//! | Call | [`Error::MethodNotFound`], [`Error::Remote`] |
//! | Execution | [`Error::Timeout`] |
//! | Interception | [`Error::UnsupportedSerialization`], [`Error::Http`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// Handshake attempt budget exhausted without a response.
    ///
    /// The peer never echoed a handshake response. Fatal for this session;
    /// retry policy (reload-and-retry) lives above this crate.
    #[error("Handshake failed: maximum attempts reached ({attempts})")]
    HandshakeFailed {
        /// Number of handshake requests sent before giving up.
        attempts: u32,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// The session's router was closed while the operation was pending.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The underlying transport can no longer deliver messages.
    #[error("Transport closed: {message}")]
    TransportClosed {
        /// Description of the transport failure.
        message: String,
    },

    // ========================================================================
    // Call Errors
    // ========================================================================
    /// Called a method the serving side never registered.
    ///
    /// Delivered by the peer as a call error, never a local panic.
    #[error("Method not implemented: {method}")]
    MethodNotFound {
        /// The unregistered method name.
        method: String,
    },

    /// The served method failed on the remote side.
    ///
    /// Carries the normalized `{name, message}` error shape from the wire.
    #[error("Remote error [{name}]: {message}")]
    Remote {
        /// Error name reported by the peer.
        name: String,
        /// Error message reported by the peer.
        message: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Operation timeout.
    ///
    /// Returned when an awaited operation exceeds its timeout duration.
    /// Purely local: the peer may still complete the operation and its
    /// eventual message is simply ignored.
    #[error("Timed out after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Interception Errors
    // ========================================================================
    /// Watch descriptor carries no usable serialization mode.
    #[error("Unsupported serialization for intercept '{identifier}'")]
    UnsupportedSerialization {
        /// Logical identifier of the offending descriptor.
        identifier: String,
    },

    /// The underlying request primitive failed.
    #[error("HTTP error: {message}")]
    Http {
        /// Description of the request failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a handshake failure error.
    #[inline]
    pub fn handshake_failed(attempts: u32) -> Self {
        Self::HandshakeFailed { attempts }
    }

    /// Creates a transport closed error.
    #[inline]
    pub fn transport_closed(message: impl Into<String>) -> Self {
        Self::TransportClosed {
            message: message.into(),
        }
    }

    /// Creates a method not found error.
    #[inline]
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Creates a remote error.
    #[inline]
    pub fn remote(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates an unsupported serialization error.
    #[inline]
    pub fn unsupported_serialization(identifier: impl Into<String>) -> Self {
        Self::UnsupportedSerialization {
            identifier: identifier.into(),
        }
    }

    /// Creates an HTTP error.
    #[inline]
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed | Self::TransportClosed { .. } | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error originated on the remote side.
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. } | Self::MethodNotFound { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry at a higher level.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::HandshakeFailed { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::handshake_failed(10);
        assert_eq!(
            err.to_string(),
            "Handshake failed: maximum attempts reached (10)"
        );
    }

    #[test]
    fn test_timeout_display_names_operation() {
        let err = Error::timeout("waitForRequestInterception:initPage", 50);
        assert_eq!(
            err.to_string(),
            "Timed out after 50ms: waitForRequestInterception:initPage"
        );
    }

    #[test]
    fn test_method_not_found_names_method() {
        let err = Error::method_not_found("scrapeBills");
        assert!(err.to_string().contains("scrapeBills"));
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::timeout("poll", 1000);
        let other_err = Error::ConnectionClosed;

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        let closed = Error::ConnectionClosed;
        let transport = Error::transport_closed("peer gone");
        let other = Error::timeout("poll", 1);

        assert!(closed.is_connection_error());
        assert!(transport.is_connection_error());
        assert!(!other.is_connection_error());
    }

    #[test]
    fn test_is_remote() {
        assert!(Error::remote("TypeError", "boom").is_remote());
        assert!(Error::method_not_found("x").is_remote());
        assert!(!Error::ConnectionClosed.is_remote());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::timeout("poll", 1).is_recoverable());
        assert!(Error::handshake_failed(3).is_recoverable());
        assert!(!Error::ConnectionClosed.is_recoverable());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
