//! Type-safe identifiers for protocol entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! All IDs are opaque, process-local and monotonically increasing. They exist
//! purely for correlation: a [`SessionId`] scopes one connection's messages
//! on a shared transport, a [`RequestId`] pairs a call with its response, a
//! [`CallbackId`] selects a function argument stored on the calling side.
//! None of them is ever persisted or reused across context reloads.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// Minting
// ============================================================================

/// Process-wide counter backing [`SessionId::mint`].
static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Process-wide counter backing [`CallbackId::mint`].
static NEXT_CALLBACK: AtomicU64 = AtomicU64::new(1);

/// Process-wide counter backing [`ListenerId::mint`].
static NEXT_LISTENER: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// SessionId
// ============================================================================

/// Opaque correlation token scoping one connection on a shared transport.
///
/// Minted by the handshake-initiating side; messages carrying a foreign
/// session ID are discarded by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Mints a fresh session ID.
    ///
    /// Monotonically increasing so that two concurrent negotiations on the
    /// same transport can never collide.
    #[inline]
    #[must_use]
    pub fn mint() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates a session ID from a raw value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

// ============================================================================
// RequestId
// ============================================================================

/// Correlates a call with its response and callback messages.
///
/// Monotonically increasing per [`RemoteHandle`](crate::bridge::RemoteHandle)
/// instance; minted through [`RequestIdSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Creates a request ID from a raw value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Per-handle monotonic source of [`RequestId`]s.
#[derive(Debug, Default)]
pub struct RequestIdSource {
    next: AtomicU64,
}

impl RequestIdSource {
    /// Creates a source starting at 1.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns the next request ID.
    #[inline]
    pub fn next(&self) -> RequestId {
        RequestId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

// ============================================================================
// CallbackId
// ============================================================================

/// Selects a stored function argument on the calling side.
///
/// Carried inside a callback proxy placeholder because functions cannot
/// cross the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(u64);

impl CallbackId {
    /// Mints a fresh callback ID.
    #[inline]
    #[must_use]
    pub fn mint() -> Self {
        Self(NEXT_CALLBACK.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates a callback ID from a raw value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb-{}", self.0)
    }
}

// ============================================================================
// ListenerId
// ============================================================================

/// Handle to a registered event listener.
///
/// Returned by `add_event_listener`; passing it to `remove_event_listener`
/// unregisters that listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Mints a fresh listener ID.
    #[inline]
    #[must_use]
    pub fn mint() -> Self {
        Self(NEXT_LISTENER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique_and_increasing() {
        let a = SessionId::mint();
        let b = SessionId::mint();
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_request_id_source_is_monotonic() {
        let source = RequestIdSource::new();
        let first = source.next();
        let second = source.next();
        assert_eq!(first.as_u64() + 1, second.as_u64());
    }

    #[test]
    fn test_request_id_serde_transparent() {
        let id = RequestId::from_raw(42);
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "42");

        let back: RequestId = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, id);
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionId::from_raw(7).to_string(), "session-7");
        assert_eq!(RequestId::from_raw(3).to_string(), "req-3");
        assert_eq!(CallbackId::from_raw(9).to_string(), "cb-9");
    }
}
