//! Request gateway.
//!
//! The worker context issues every outbound request through one seam: the
//! [`RequestGateway`]. Interception works by swapping the issuer behind that
//! seam, which is why it can observe without touching the calling code.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::Result;

// ============================================================================
// HttpRequest / HttpResponse
// ============================================================================

/// An outbound request as seen by the gateway.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: String,
    /// Absolute URL.
    pub url: String,
    /// Request headers, combined per header-combination semantics.
    pub headers: FxHashMap<String, String>,
    /// Request body, if any.
    pub body: Option<String>,
}

impl HttpRequest {
    /// Creates a body-less request.
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: FxHashMap::default(),
            body: None,
        }
    }

    /// Sets the request body.
    #[inline]
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets one request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A completed response as seen by the gateway.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: FxHashMap<String, String>,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response with the given status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: FxHashMap::default(),
            body: body.into(),
        }
    }

    /// Sets one response header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Returns the `content-type` header, looked up case-insensitively.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the body as UTF-8 text, replacing invalid sequences.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

// ============================================================================
// HttpIssuer
// ============================================================================

/// Capability interface over the concrete request-issuing primitive.
///
/// Both request styles funnel through this one seam: the promise-returning
/// primitive calls it directly, the event-driven one
/// ([`EventedRequest`](super::EventedRequest)) is layered on top. Swapping
/// the issuer therefore observes every outbound request.
#[async_trait]
pub trait HttpIssuer: Send + Sync {
    /// Issues the request and resolves with its completed response.
    async fn issue(&self, request: HttpRequest) -> Result<HttpResponse>;
}

// ============================================================================
// RequestGateway
// ============================================================================

/// The single request-issuing seam of a worker context.
///
/// Holds the current [`HttpIssuer`]; [`install`](Self::install) swaps it,
/// which is the entire mechanism behind
/// [`Interceptor`](super::Interceptor) init/restore.
pub struct RequestGateway {
    issuer: RwLock<Arc<dyn HttpIssuer>>,
}

impl RequestGateway {
    /// Creates a gateway around the context's real issuer.
    #[must_use]
    pub fn new(issuer: Arc<dyn HttpIssuer>) -> Arc<Self> {
        Arc::new(Self {
            issuer: RwLock::new(issuer),
        })
    }

    /// Returns the currently installed issuer.
    #[inline]
    #[must_use]
    pub fn current(&self) -> Arc<dyn HttpIssuer> {
        Arc::clone(&self.issuer.read())
    }

    /// Swaps the installed issuer.
    pub fn install(&self, issuer: Arc<dyn HttpIssuer>) {
        *self.issuer.write() = issuer;
    }

    /// Issues a request through whatever issuer is currently installed.
    ///
    /// # Errors
    ///
    /// Propagates the issuer's error unchanged.
    pub async fn issue(&self, request: HttpRequest) -> Result<HttpResponse> {
        let issuer = self.current();
        issuer.issue(request).await
    }
}

impl fmt::Debug for RequestGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestGateway").finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
