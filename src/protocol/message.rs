//! Envelope and payload message types.
//!
//! Defines the discriminated union that crosses the transport. Messages are
//! conceptually JSON and must survive structured cloning, so every shape here
//! round-trips through [`serde_json::Value`].

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::Error;
use crate::identifiers::{CallbackId, RequestId, SessionId};

// ============================================================================
// Protocol Marker
// ============================================================================

/// Structural tag identifying messages belonging to this protocol.
///
/// Shared transports carry unrelated traffic; any payload without this
/// marker in its `type` field is foreign and silently ignored.
pub const PROTOCOL_MARKER: &str = "context-bridge";

// ============================================================================
// Payload
// ============================================================================

/// Message payload, discriminated by the `action` wire field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Payload {
    /// Session negotiation request (sent by the pilot, retried).
    HandshakeRequest,

    /// Session acceptance (echoed by the worker).
    HandshakeResponse,

    /// Method invocation request.
    #[serde(rename_all = "camelCase")]
    Call {
        /// Correlates the eventual response and any callback messages.
        request_id: RequestId,
        /// Name looked up in the serving side's method table.
        method_name: String,
        /// Arguments; function arguments travel as [`CallbackProxy`] values.
        args: Vec<Value>,
    },

    /// Call result or error. Exactly one of `result`/`error` is present.
    #[serde(rename_all = "camelCase")]
    Response {
        /// Matches the call's request ID.
        request_id: RequestId,
        /// Result value (success).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Normalized error (failure).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RemoteError>,
    },

    /// Fire-and-forget notification. Not acknowledged, not retried.
    #[serde(rename_all = "camelCase")]
    Event {
        /// Event name listeners subscribe to.
        event_name: String,
        /// Event payload.
        payload: Value,
    },

    /// Invocation of a proxied function argument on the calling side.
    #[serde(rename_all = "camelCase")]
    Callback {
        /// The call this callback belongs to.
        request_id: RequestId,
        /// Selects which stored function to invoke.
        callback_id: CallbackId,
        /// Invocation arguments.
        args: Vec<Value>,
    },
}

impl Payload {
    /// Returns a short name for logging.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HandshakeRequest => "handshakeRequest",
            Self::HandshakeResponse => "handshakeResponse",
            Self::Call { .. } => "call",
            Self::Response { .. } => "response",
            Self::Event { .. } => "event",
            Self::Callback { .. } => "callback",
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// A complete wire message: protocol marker, session ID, payload.
///
/// # Format
///
/// ```json
/// {
///   "type": "context-bridge",
///   "sessionId": 3,
///   "action": "call",
///   "requestId": 1,
///   "methodName": "readToken",
///   "args": []
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Session this message belongs to.
    pub session_id: SessionId,
    /// The message payload.
    pub payload: Payload,
}

impl Envelope {
    /// Creates a new envelope.
    #[inline]
    #[must_use]
    pub fn new(session_id: SessionId, payload: Payload) -> Self {
        Self {
            session_id,
            payload,
        }
    }

    /// Serializes the envelope to a wire value.
    ///
    /// The payload's fields are flattened next to the marker and session ID.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut value = serde_json::to_value(&self.payload)
            .unwrap_or_else(|_| json!({ "action": self.payload.kind() }));
        if let Some(object) = value.as_object_mut() {
            object.insert("type".to_string(), Value::String(PROTOCOL_MARKER.into()));
            object.insert("sessionId".to_string(), json!(self.session_id.as_u64()));
        }
        value
    }

    /// Structural check and parse of an inbound transport payload.
    ///
    /// Returns `None` for anything that is not a well-formed protocol
    /// message: missing marker, missing session ID, unrecognized action.
    /// Foreign traffic is never an error.
    #[must_use]
    pub fn parse(value: &Value) -> Option<Self> {
        let marker = value.get("type")?.as_str()?;
        if marker != PROTOCOL_MARKER {
            return None;
        }

        let session_id = SessionId::from_raw(value.get("sessionId")?.as_u64()?);
        let payload: Payload = serde_json::from_value(value.clone()).ok()?;

        Some(Self {
            session_id,
            payload,
        })
    }
}

// ============================================================================
// RemoteError
// ============================================================================

/// Normalized error shape carried in `response.error`.
///
/// Error-like values thrown inside a served method reduce to `{name,
/// message}` before crossing the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Error name (for example `MethodNotFound` or `TypeError`).
    pub name: String,
    /// Human-readable message.
    pub message: String,
}

impl RemoteError {
    /// Creates a remote error.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Reduces a local error to its wire shape.
    #[must_use]
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::MethodNotFound { method } => Self::new(
                "MethodNotFound",
                format!("method not implemented: {method}"),
            ),
            Error::Timeout { .. } => Self::new("Timeout", err.to_string()),
            Error::Remote { name, message } => Self::new(name.clone(), message.clone()),
            other => Self::new("Error", other.to_string()),
        }
    }

    /// Converts the wire shape back into a local error.
    #[must_use]
    pub fn into_error(self) -> Error {
        Error::remote(self.name, self.message)
    }
}

// ============================================================================
// CallbackProxy
// ============================================================================

/// Serializable placeholder standing in for a function argument.
///
/// Functions cannot cross the transport; the calling side stores the real
/// function under a [`CallbackId`] and ships this tagged proxy instead. The
/// serving side rehydrates it into a handle that sends `callback` messages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CallbackProxy {
    /// Proxy marker, always `true` on the wire.
    #[serde(rename = "__cbproxy")]
    marker: bool,

    /// Selects the stored function on the calling side.
    #[serde(rename = "callbackId")]
    pub callback_id: CallbackId,
}

impl CallbackProxy {
    /// Creates a proxy for the given callback ID.
    #[inline]
    #[must_use]
    pub fn new(callback_id: CallbackId) -> Self {
        Self {
            marker: true,
            callback_id,
        }
    }

    /// Serializes the proxy to its wire value.
    #[must_use]
    pub fn to_value(self) -> Value {
        json!({ "__cbproxy": true, "callbackId": self.callback_id.as_u64() })
    }

    /// Recognizes a proxy inside a deserialized argument.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<CallbackId> {
        if value.get("__cbproxy")?.as_bool()? {
            Some(CallbackId::from_raw(value.get("callbackId")?.as_u64()?))
        } else {
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_round_trip() {
        let envelope = Envelope::new(
            SessionId::from_raw(7),
            Payload::Call {
                request_id: RequestId::from_raw(1),
                method_name: "readToken".to_string(),
                args: vec![json!("a"), json!(2)],
            },
        );

        let value = envelope.to_value();
        assert_eq!(value["type"], PROTOCOL_MARKER);
        assert_eq!(value["sessionId"], 7);
        assert_eq!(value["action"], "call");
        assert_eq!(value["methodName"], "readToken");

        let parsed = Envelope::parse(&value).expect("parse");
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn test_response_carries_exactly_one_of_result_error() {
        let ok = Envelope::new(
            SessionId::from_raw(1),
            Payload::Response {
                request_id: RequestId::from_raw(4),
                result: Some(json!({"data": "tok123"})),
                error: None,
            },
        )
        .to_value();
        assert!(ok.get("result").is_some());
        assert!(ok.get("error").is_none());

        let err = Envelope::new(
            SessionId::from_raw(1),
            Payload::Response {
                request_id: RequestId::from_raw(4),
                result: None,
                error: Some(RemoteError::new("TypeError", "boom")),
            },
        )
        .to_value();
        assert!(err.get("result").is_none());
        assert_eq!(err["error"]["name"], "TypeError");
    }

    #[test]
    fn test_foreign_payload_is_ignored() {
        assert!(Envelope::parse(&json!({"hello": "world"})).is_none());
        assert!(Envelope::parse(&json!("just a string")).is_none());
        assert!(Envelope::parse(&json!({"type": "other-protocol", "action": "call"})).is_none());
    }

    #[test]
    fn test_unrecognized_action_is_ignored() {
        let value = json!({
            "type": PROTOCOL_MARKER,
            "sessionId": 3,
            "action": "teleport"
        });
        assert!(Envelope::parse(&value).is_none());
    }

    #[test]
    fn test_missing_session_id_is_ignored() {
        let value = json!({
            "type": PROTOCOL_MARKER,
            "action": "handshakeRequest"
        });
        assert!(Envelope::parse(&value).is_none());
    }

    #[test]
    fn test_handshake_round_trip() {
        let envelope = Envelope::new(SessionId::from_raw(9), Payload::HandshakeRequest);
        let parsed = Envelope::parse(&envelope.to_value()).expect("parse");
        assert_eq!(parsed.payload, Payload::HandshakeRequest);
        assert_eq!(parsed.session_id, SessionId::from_raw(9));
    }

    #[test]
    fn test_callback_proxy_round_trip() {
        let proxy = CallbackProxy::new(CallbackId::from_raw(11));
        let value = proxy.to_value();
        assert_eq!(
            CallbackProxy::from_value(&value),
            Some(CallbackId::from_raw(11))
        );
    }

    #[test]
    fn test_callback_proxy_rejects_plain_objects() {
        assert!(CallbackProxy::from_value(&json!({"callbackId": 1})).is_none());
        assert!(CallbackProxy::from_value(&json!({"__cbproxy": false, "callbackId": 1})).is_none());
        assert!(CallbackProxy::from_value(&json!(42)).is_none());
    }

    #[test]
    fn test_remote_error_from_method_not_found() {
        let err = Error::method_not_found("scrapeBills");
        let remote = RemoteError::from_error(&err);
        assert_eq!(remote.name, "MethodNotFound");
        assert!(remote.message.contains("scrapeBills"));
    }

    #[test]
    fn test_payload_kind() {
        let payload = Payload::Event {
            event_name: "workerEvent".to_string(),
            payload: json!(null),
        };
        assert_eq!(payload.kind(), "event");
    }
}
