//! Event-driven request primitive.
//!
//! The second of the worker context's two request styles: open, set headers,
//! attach a completion listener, send. It issues through the same
//! [`RequestGateway`] seam as the promise-returning style, so interception
//! observes both without knowing which one was used.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{Error, Result};

use super::http::{HttpRequest, HttpResponse, RequestGateway};

// ============================================================================
// Types
// ============================================================================

/// Completion listener, fired once with the finished response.
pub type CompletionListener = Box<dyn FnOnce(&HttpResponse) + Send>;

// ============================================================================
// EventedRequest
// ============================================================================

/// An open-set-send request builder with a completion listener.
pub struct EventedRequest {
    gateway: Arc<RequestGateway>,
    method: Option<String>,
    url: Option<String>,
    headers: FxHashMap<String, String>,
    on_complete: Option<CompletionListener>,
}

impl EventedRequest {
    /// Creates an unopened request bound to the gateway.
    #[must_use]
    pub fn new(gateway: Arc<RequestGateway>) -> Self {
        Self {
            gateway,
            method: None,
            url: None,
            headers: FxHashMap::default(),
            on_complete: None,
        }
    }

    /// Opens the request, fixing its method and URL.
    ///
    /// Re-opening resets any headers set so far.
    pub fn open(&mut self, method: impl Into<String>, url: impl Into<String>) {
        self.method = Some(method.into());
        self.url = Some(url.into());
        self.headers.clear();
    }

    /// Sets a request header.
    ///
    /// Repeated calls with the same name append, comma-joined, following
    /// header-combination semantics.
    pub fn set_request_header(&mut self, name: impl Into<String>, value: impl AsRef<str>) {
        let name = name.into();
        let value = value.as_ref();
        self.headers
            .entry(name)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_owned());
    }

    /// Attaches the completion listener, replacing any previous one.
    pub fn on_complete(&mut self, listener: impl FnOnce(&HttpResponse) + Send + 'static) {
        self.on_complete = Some(Box::new(listener));
    }

    /// Sends the request through the gateway.
    ///
    /// Fires the completion listener before returning the response.
    ///
    /// # Errors
    ///
    /// - [`Error::Http`] if [`open`](Self::open) was never called
    /// - the gateway's error if issuing fails (the listener does not fire)
    pub async fn send(mut self, body: Option<String>) -> Result<HttpResponse> {
        let (Some(method), Some(url)) = (self.method.take(), self.url.take()) else {
            return Err(Error::http("send before open"));
        };

        let request = HttpRequest {
            method,
            url,
            headers: std::mem::take(&mut self.headers),
            body,
        };
        debug!(method = request.method, url = request.url, "evented request sent");

        let response = self.gateway.issue(request).await?;
        if let Some(listener) = self.on_complete.take() {
            listener(&response);
        }
        Ok(response)
    }
}

impl fmt::Debug for EventedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventedRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parses a raw CRLF-separated header block into a map.
///
/// Lines without a colon are skipped; names and values are trimmed. Repeated
/// names combine comma-joined, matching
/// [`set_request_header`](EventedRequest::set_request_header).
#[must_use]
pub fn parse_raw_header_block(raw: &str) -> FxHashMap<String, String> {
    let mut headers = FxHashMap::default();
    for line in raw.split("\r\n").flat_map(|chunk| chunk.split('\n')) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() {
            continue;
        }
        headers
            .entry(name.to_owned())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_owned());
    }
    headers
}

// ============================================================================
// Tests
// ============================================================================
