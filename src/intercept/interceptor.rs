//! Observing interceptor.
//!
//! Wraps the gateway's issuer so every outbound request is matched against
//! the watch-list after it completes. Interception is strictly read-only:
//! the real response is returned untouched, and any failure while producing
//! a record is caught and logged at this seam.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::bridge::Bridge;
use crate::error::{Error, Result};

use super::descriptor::{Serialization, WatchDescriptor};
use super::http::{HttpIssuer, HttpRequest, HttpResponse, RequestGateway};

// ============================================================================
// Constants
// ============================================================================

/// Capacity of the intercepted-record bus.
const RECORD_BUS_CAPACITY: usize = 64;

/// Bridge event name carrying worker-originated notifications.
pub const WORKER_EVENT: &str = "workerEvent";

/// Worker notification kind for an intercepted request.
pub const REQUEST_RESPONSE_EVENT: &str = "requestResponse";

// ============================================================================
// InterceptedRecord
// ============================================================================

/// One matched request, serialized and ready for republication.
///
/// Published at most once per matched request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptedRecord {
    /// Identifier of the descriptor that claimed the request.
    pub identifier: String,
    /// Request method.
    pub method: String,
    /// Request URL.
    pub url: String,
    /// Serialized response body, per the descriptor's mode.
    pub response: Value,
    /// Response headers.
    pub response_headers: FxHashMap<String, String>,
    /// Request headers.
    pub request_headers: FxHashMap<String, String>,
}

// ============================================================================
// Interceptor
// ============================================================================

/// Installs and removes the observing issuer on a [`RequestGateway`].
///
/// `init`/`restore` are idempotent and reversible; the interceptor never
/// alters, delays or swallows the real response.
pub struct Interceptor {
    gateway: Arc<RequestGateway>,
    descriptors: Arc<Vec<WatchDescriptor>>,
    records: broadcast::Sender<InterceptedRecord>,
    original: Mutex<Option<Arc<dyn HttpIssuer>>>,
}

impl Interceptor {
    /// Creates an interceptor over the gateway with the given watch-list.
    #[must_use]
    pub fn new(gateway: Arc<RequestGateway>, descriptors: Vec<WatchDescriptor>) -> Arc<Self> {
        let (records, _) = broadcast::channel(RECORD_BUS_CAPACITY);
        Arc::new(Self {
            gateway,
            descriptors: Arc::new(descriptors),
            records,
            original: Mutex::new(None),
        })
    }

    /// Saves the current issuer and installs the observing wrapper.
    ///
    /// Calling `init` again while installed is a no-op.
    pub fn init(&self) {
        let mut original = self.original.lock();
        if original.is_some() {
            return;
        }
        let inner = self.gateway.current();
        *original = Some(Arc::clone(&inner));
        self.gateway.install(Arc::new(ObservingIssuer {
            inner,
            descriptors: Arc::clone(&self.descriptors),
            records: self.records.clone(),
        }));
        debug!(descriptors = self.descriptors.len(), "interception installed");
    }

    /// Reinstates the saved issuer.
    ///
    /// Calling `restore` when not installed is a no-op.
    pub fn restore(&self) {
        if let Some(inner) = self.original.lock().take() {
            self.gateway.install(inner);
            debug!("interception removed");
        }
    }

    /// Opens an independent stream of intercepted records.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<InterceptedRecord> {
        self.records.subscribe()
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("descriptors", &self.descriptors.len())
            .field("installed", &self.original.lock().is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ObservingIssuer
// ============================================================================

/// Issuer wrapper that matches completed requests against the watch-list.
struct ObservingIssuer {
    inner: Arc<dyn HttpIssuer>,
    descriptors: Arc<Vec<WatchDescriptor>>,
    records: broadcast::Sender<InterceptedRecord>,
}

#[async_trait]
impl HttpIssuer for ObservingIssuer {
    async fn issue(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = request.method.clone();
        let url = request.url.clone();
        let request_headers = request.headers.clone();

        let response = self.inner.issue(request).await?;

        // Observation must never break the real request.
        if let Err(e) = self.observe(&method, &url, request_headers, &response) {
            error!(method, url, error = %e, "interception failed, record dropped");
        }

        Ok(response)
    }
}

impl ObservingIssuer {
    /// Matches the completed request and publishes a record on first match.
    fn observe(
        &self,
        method: &str,
        url: &str,
        request_headers: FxHashMap<String, String>,
        response: &HttpResponse,
    ) -> Result<()> {
        // First match wins; later descriptors never see the request.
        let Some(descriptor) = self.descriptors.iter().find(|d| d.matches(method, url)) else {
            return Ok(());
        };

        let serialized = serialize_body(descriptor, response)?;
        let record = InterceptedRecord {
            identifier: descriptor.identifier.clone(),
            method: method.to_owned(),
            url: url.to_owned(),
            response: serialized,
            response_headers: response.headers.clone(),
            request_headers,
        };

        debug!(identifier = record.identifier, url, "request intercepted");
        // No subscriber just means nobody is waiting yet.
        let _ = self.records.send(record);
        Ok(())
    }
}

/// Serializes a clone of the response body per the descriptor's mode.
///
/// The original body stays consumable; only the copy is read here.
fn serialize_body(descriptor: &WatchDescriptor, response: &HttpResponse) -> Result<Value> {
    let Some(mode) = descriptor.serialization else {
        return Err(Error::unsupported_serialization(&descriptor.identifier));
    };

    match mode {
        Serialization::Json => Ok(serde_json::from_slice(&response.body)?),
        Serialization::Text => Ok(Value::String(response.body_text())),
        Serialization::DataUri => {
            let content_type = response.content_type().unwrap_or("application/octet-stream");
            Ok(Value::String(format!(
                "data:{content_type};base64,{}",
                BASE64.encode(&response.body)
            )))
        }
    }
}

// ============================================================================
// Relay
// ============================================================================

/// Re-emits every intercepted record as a bridge event.
///
/// Each record becomes a `workerEvent` with payload
/// `{event: "requestResponse", payload: record}`. This is the only path by
/// which the pilot sees intercepted data.
pub fn spawn_intercept_relay(bridge: Arc<Bridge>, interceptor: &Interceptor) -> JoinHandle<()> {
    let mut records = interceptor.subscribe();
    tokio::spawn(async move {
        loop {
            match records.recv().await {
                Ok(record) => {
                    let payload = match serde_json::to_value(&record) {
                        Ok(value) => value,
                        Err(e) => {
                            warn!(identifier = record.identifier, error = %e, "record not serializable");
                            continue;
                        }
                    };
                    let event = serde_json::json!({
                        "event": REQUEST_RESPONSE_EVENT,
                        "payload": payload,
                    });
                    if let Err(e) = bridge.emit(WORKER_EVENT, event) {
                        warn!(error = %e, "intercept relay send failed, stopping");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "intercept relay lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::time::{Duration, sleep, timeout};

    use crate::bridge::HandshakeConfig;
    use crate::transport::{ChannelTransport, Transport};

    /// Issuer answering every request with a canned response.
    struct CannedIssuer {
        response: HttpResponse,
    }

    #[async_trait]
    impl HttpIssuer for CannedIssuer {
        async fn issue(&self, _request: HttpRequest) -> Result<HttpResponse> {
            Ok(self.response.clone())
        }
    }

    fn canned_gateway(response: HttpResponse) -> Arc<RequestGateway> {
        RequestGateway::new(Arc::new(CannedIssuer { response }))
    }

    #[tokio::test]
    async fn test_init_and_restore_swap_the_issuer() {
        let gateway = canned_gateway(HttpResponse::new(200, "ok"));
        let original = gateway.current();

        let interceptor = Interceptor::new(Arc::clone(&gateway), Vec::new());
        interceptor.init();
        assert!(!Arc::ptr_eq(&gateway.current(), &original));

        // init is idempotent: a second call must not wrap the wrapper.
        let wrapped = gateway.current();
        interceptor.init();
        assert!(Arc::ptr_eq(&gateway.current(), &wrapped));

        interceptor.restore();
        assert!(Arc::ptr_eq(&gateway.current(), &original));

        // restore is idempotent too.
        interceptor.restore();
        assert!(Arc::ptr_eq(&gateway.current(), &original));
    }

    #[tokio::test]
    async fn test_first_matching_descriptor_claims_the_request() {
        let gateway = canned_gateway(
            HttpResponse::new(200, r#"{"ok":true}"#)
                .with_header("content-type", "application/json"),
        );
        let interceptor = Interceptor::new(
            Arc::clone(&gateway),
            vec![
                WatchDescriptor::new("broad", "/api/", "POST")
                    .with_serialization(Serialization::Json),
                WatchDescriptor::new("narrow", "/api/token", "POST")
                    .with_serialization(Serialization::Json),
            ],
        );
        interceptor.init();
        let mut records = interceptor.subscribe();

        gateway
            .issue(HttpRequest::new("POST", "https://example.com/api/token"))
            .await
            .expect("issue");

        let record = timeout(Duration::from_millis(200), records.recv())
            .await
            .expect("record in time")
            .expect("record");
        assert_eq!(record.identifier, "broad");
        assert_eq!(record.response, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_no_match_publishes_nothing() {
        let gateway = canned_gateway(HttpResponse::new(200, "ok"));
        let interceptor = Interceptor::new(
            Arc::clone(&gateway),
            vec![
                WatchDescriptor::new("token", "/api/token", "POST")
                    .with_serialization(Serialization::Text),
            ],
        );
        interceptor.init();
        let mut records = interceptor.subscribe();

        gateway
            .issue(HttpRequest::new("GET", "https://example.com/api/token"))
            .await
            .expect("issue");

        sleep(Duration::from_millis(30)).await;
        assert!(records.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_json_parse_failure_drops_record_but_not_response() {
        let gateway = canned_gateway(HttpResponse::new(200, "not json at all"));
        let interceptor = Interceptor::new(
            Arc::clone(&gateway),
            vec![WatchDescriptor::new("t", "/", "GET").with_serialization(Serialization::Json)],
        );
        interceptor.init();
        let mut records = interceptor.subscribe();

        // The real response still comes back intact.
        let response = gateway
            .issue(HttpRequest::new("GET", "https://example.com/"))
            .await
            .expect("issue");
        assert_eq!(response.body_text(), "not json at all");

        sleep(Duration::from_millis(30)).await;
        assert!(records.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_serialization_drops_record() {
        let gateway = canned_gateway(HttpResponse::new(200, "ok"));
        let interceptor = Interceptor::new(
            Arc::clone(&gateway),
            vec![WatchDescriptor::new("t", "/", "GET")],
        );
        interceptor.init();
        let mut records = interceptor.subscribe();

        gateway
            .issue(HttpRequest::new("GET", "https://example.com/"))
            .await
            .expect("issue");

        sleep(Duration::from_millis(30)).await;
        assert!(records.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_data_uri_serialization_uses_content_type() {
        let gateway = canned_gateway(
            HttpResponse::new(200, vec![0xde, 0xad, 0xbe, 0xef])
                .with_header("content-type", "image/png"),
        );
        let interceptor = Interceptor::new(
            Arc::clone(&gateway),
            vec![WatchDescriptor::new("img", "/", "GET").with_serialization(Serialization::DataUri)],
        );
        interceptor.init();
        let mut records = interceptor.subscribe();

        gateway
            .issue(HttpRequest::new("GET", "https://example.com/pic"))
            .await
            .expect("issue");

        let record = timeout(Duration::from_millis(200), records.recv())
            .await
            .expect("record in time")
            .expect("record");
        assert_eq!(record.response, json!("data:image/png;base64,3q2+7w=="));
    }

    #[tokio::test]
    async fn test_relay_republishes_records_as_worker_events() {
        let (pilot_side, worker_side) = ChannelTransport::pair();
        let worker = tokio::spawn(Bridge::open_worker(
            Arc::new(worker_side) as Arc<dyn Transport>
        ));
        let pilot = Bridge::open_pilot(
            Arc::new(pilot_side) as Arc<dyn Transport>,
            HandshakeConfig::default(),
        )
        .await
        .expect("pilot");
        let worker = Arc::new(worker.await.expect("join").expect("worker"));

        let gateway = canned_gateway(
            HttpResponse::new(200, r#"{"token":"tok123"}"#)
                .with_header("content-type", "application/json"),
        );
        let interceptor = Interceptor::new(
            Arc::clone(&gateway),
            vec![
                WatchDescriptor::new("token", "/api/token", "POST")
                    .with_serialization(Serialization::Json),
            ],
        );
        interceptor.init();
        let relay = spawn_intercept_relay(Arc::clone(&worker), &interceptor);

        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
        let seen_tx = parking_lot::Mutex::new(Some(seen_tx));
        pilot.add_event_listener(
            WORKER_EVENT,
            Arc::new(move |payload| {
                if let Some(tx) = seen_tx.lock().take() {
                    let _ = tx.send(payload.clone());
                }
            }),
        );

        gateway
            .issue(HttpRequest::new("POST", "https://example.com/api/token"))
            .await
            .expect("issue");

        let event = timeout(Duration::from_millis(500), seen_rx)
            .await
            .expect("event in time")
            .expect("event");
        assert_eq!(event["event"], json!(REQUEST_RESPONSE_EVENT));
        assert_eq!(event["payload"]["identifier"], json!("token"));
        assert_eq!(event["payload"]["response"], json!({"token": "tok123"}));

        relay.abort();
        pilot.close();
        worker.close();
    }
}
