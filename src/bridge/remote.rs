//! Outbound calls and events.
//!
//! The remote handle issues calls against the peer's method table, proxies
//! function arguments through the callback side-channel and exposes
//! fire-and-forget event emission.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::{CallbackId, RequestIdSource};
use crate::protocol::CallbackProxy;

use super::router::{CallbackFn, Router, TransferFn};

// ============================================================================
// CallArg
// ============================================================================

/// One argument of an outbound call.
///
/// Function arguments cannot cross the transport; they travel as tagged
/// callback proxies and the real function stays on this side, invoked by
/// inbound `callback` messages.
pub enum CallArg {
    /// A plain value, passed through unchanged.
    Value(Value),
    /// A function argument, replaced by a callback proxy on the wire.
    Callback(CallbackFn),
}

impl CallArg {
    /// Creates a value argument from anything serializable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn value<T: Serialize>(value: T) -> Result<Self> {
        Ok(Self::Value(serde_json::to_value(value)?))
    }

    /// Creates a callback argument.
    #[must_use]
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(f))
    }
}

impl From<Value> for CallArg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl fmt::Debug for CallArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Callback(_) => f.debug_tuple("Callback").finish(),
        }
    }
}

// ============================================================================
// RemoteHandle
// ============================================================================

/// Issues outgoing calls and events over a session router.
///
/// # Thread Safety
///
/// `RemoteHandle` is `Send + Sync`; concurrent calls are independent and
/// unordered, correlated solely by request ID.
pub struct RemoteHandle {
    router: Arc<Router>,
    request_ids: RequestIdSource,
    transfer_fns: Mutex<FxHashMap<String, TransferFn>>,
}

impl RemoteHandle {
    /// Creates a remote handle over the session router.
    #[must_use]
    pub(crate) fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            request_ids: RequestIdSource::new(),
            transfer_fns: Mutex::new(FxHashMap::default()),
        }
    }

    /// Registers a transfer hint function for a method's arguments.
    ///
    /// Called with the sanitized outbound values before each `call`; the
    /// returned positions are passed to the transport as zero-copy hints.
    pub fn register_transfer<F>(&self, method: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> Vec<usize> + Send + Sync + 'static,
    {
        self.transfer_fns.lock().insert(method.into(), Arc::new(f));
    }

    /// Calls a method on the peer's method table.
    ///
    /// Function arguments are replaced by callback proxies; the stored
    /// functions may be invoked any number of times until the response
    /// arrives, at which point the callback route is retired.
    ///
    /// The returned future settles exactly once: with the peer's `result`,
    /// with its `error`, or with [`Error::ConnectionClosed`] if the router
    /// is closed while the call is pending.
    ///
    /// # Errors
    ///
    /// - [`Error::Remote`] / [`Error::MethodNotFound`] from the peer
    /// - [`Error::ConnectionClosed`] if the router closes mid-call
    /// - [`Error::TransportClosed`] if the send itself fails
    pub async fn call(&self, method: &str, args: Vec<CallArg>) -> Result<Value> {
        if self.router.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let request_id = self.request_ids.next();

        let mut wire_args = Vec::with_capacity(args.len());
        let mut callbacks: FxHashMap<CallbackId, CallbackFn> = FxHashMap::default();
        for arg in args {
            match arg {
                CallArg::Value(value) => wire_args.push(value),
                CallArg::Callback(f) => {
                    let callback_id = CallbackId::mint();
                    wire_args.push(CallbackProxy::new(callback_id).to_value());
                    callbacks.insert(callback_id, f);
                }
            }
        }

        let transfer = self
            .transfer_fns
            .lock()
            .get(method)
            .map(|f| f(&wire_args))
            .unwrap_or_default();

        // Register before sending so a fast peer cannot win the race.
        if !callbacks.is_empty() {
            self.router.install_callback_route(request_id, callbacks);
        }
        let settled = self.router.register_response(request_id);

        if let Err(e) = self
            .router
            .send_call(request_id, method, wire_args, &transfer)
        {
            self.router.abandon_call(request_id);
            return Err(e);
        }
        debug!(%request_id, method, "call issued");

        match settled.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(remote)) => Err(remote.into_error()),
            Err(_) => Err(Error::ConnectionClosed),
        }
    }

    /// Emits a fire-and-forget event to the peer.
    ///
    /// Delivery is not acknowledged and not retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportClosed`] if the send fails.
    pub fn emit(&self, event_name: &str, payload: Value) -> Result<()> {
        self.router.send_event(event_name, payload)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::sync::broadcast;

    use crate::bridge::local::LocalHandle;
    use crate::identifiers::SessionId;
    use crate::transport::{ChannelTransport, Transport};

    /// Transport whose sends always fail.
    struct DeadTransport {
        inbound: broadcast::Sender<Value>,
    }

    impl DeadTransport {
        fn new() -> Self {
            let (inbound, _) = broadcast::channel(8);
            Self { inbound }
        }
    }

    impl Transport for DeadTransport {
        fn post(&self, _payload: Value) -> Result<()> {
            Err(Error::transport_closed("dead"))
        }

        fn subscribe(&self) -> broadcast::Receiver<Value> {
            self.inbound.subscribe()
        }
    }

    /// Transport wrapper recording the transfer hints it is handed.
    struct HintRecorder {
        inner: ChannelTransport,
        hints: Arc<Mutex<Vec<Vec<usize>>>>,
    }

    impl Transport for HintRecorder {
        fn post(&self, payload: Value) -> Result<()> {
            self.inner.post(payload)
        }

        fn post_with_transfer(&self, payload: Value, transfer: &[usize]) -> Result<()> {
            self.hints.lock().push(transfer.to_vec());
            self.inner.post(payload)
        }

        fn subscribe(&self) -> broadcast::Receiver<Value> {
            self.inner.subscribe()
        }
    }

    #[test]
    fn test_call_arg_value_serializes() {
        let arg = CallArg::value("hello").expect("serialize");
        assert!(matches!(arg, CallArg::Value(Value::String(_))));
    }

    #[test]
    fn test_call_arg_from_value() {
        let arg: CallArg = json!({"k": 1}).into();
        assert!(matches!(arg, CallArg::Value(_)));
    }

    #[test]
    fn test_call_arg_debug_hides_function_body() {
        let arg = CallArg::callback(|_args| {});
        assert_eq!(format!("{arg:?}"), "Callback");
    }

    #[tokio::test]
    async fn test_send_failure_surfaces_instead_of_hanging() {
        let router = Arc::new(Router::new(
            Arc::new(DeadTransport::new()) as Arc<dyn Transport>,
            SessionId::from_raw(1),
        ));
        let remote = RemoteHandle::new(Arc::clone(&router));

        // A callback arg exercises the route cleanup on the error path too.
        let err = remote
            .call("ping", vec![CallArg::callback(|_args| {})])
            .await
            .expect_err("send must fail");
        assert!(matches!(err, Error::TransportClosed { .. }));

        router.close();
    }

    #[tokio::test]
    async fn test_argument_transfer_hint_reaches_transport() {
        let (pilot_side, worker_side) = ChannelTransport::pair();
        let hints = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::new(HintRecorder {
            inner: pilot_side,
            hints: Arc::clone(&hints),
        });

        let session = SessionId::from_raw(1);
        let pilot_router = Arc::new(Router::new(recorder as Arc<dyn Transport>, session));
        let worker_router = Arc::new(Router::new(
            Arc::new(worker_side) as Arc<dyn Transport>,
            session,
        ));
        let local = LocalHandle::new(Arc::clone(&worker_router));
        local.set_method("upload", |_args| async { Ok(json!("stored")) });

        let remote = RemoteHandle::new(Arc::clone(&pilot_router));
        // Mark the last sanitized argument as transferable.
        remote.register_transfer("upload", |args| vec![args.len() - 1]);

        let result = remote
            .call("upload", vec![json!("meta").into(), json!("blob").into()])
            .await
            .expect("call");
        assert_eq!(result, json!("stored"));
        assert_eq!(hints.lock().as_slice(), &[vec![1]]);

        local.stop();
        pilot_router.close();
        worker_router.close();
    }
}
