//! Router + handle pairing.
//!
//! A [`Connection`] is the per-session unit of the RPC stack: one router,
//! one local handle answering the peer's calls, one remote handle issuing
//! ours. Created at handshake completion; dies with the context.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::identifiers::SessionId;
use crate::transport::Transport;

use super::local::LocalHandle;
use super::remote::RemoteHandle;
use super::router::Router;

// ============================================================================
// Connection
// ============================================================================

/// A session-scoped pairing of router, local handle and remote handle.
pub struct Connection {
    router: Arc<Router>,
    local: LocalHandle,
    remote: RemoteHandle,
}

impl Connection {
    /// Builds a connection for an established session.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, session_id: SessionId) -> Self {
        let router = Arc::new(Router::new(transport, session_id));
        let local = LocalHandle::new(Arc::clone(&router));
        let remote = RemoteHandle::new(Arc::clone(&router));

        Self {
            router,
            local,
            remote,
        }
    }

    /// Returns the negotiated session ID.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.router.session_id()
    }

    /// Returns the router.
    #[inline]
    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Returns the local handle (serves the peer's calls).
    #[inline]
    #[must_use]
    pub fn local(&self) -> &LocalHandle {
        &self.local
    }

    /// Returns the remote handle (issues our calls).
    #[inline]
    #[must_use]
    pub fn remote(&self) -> &RemoteHandle {
        &self.remote
    }

    /// Closes the connection.
    ///
    /// Stops the call service and the router; every pending call fails with
    /// [`Error::ConnectionClosed`](crate::Error::ConnectionClosed).
    pub fn close(&self) {
        self.local.stop();
        self.router.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("session_id", &self.session_id())
            .field("closed", &self.router.is_closed())
            .finish_non_exhaustive()
    }
}
