//! Inbound call service.
//!
//! The local handle answers the peer's calls out of an explicit method
//! table. Callback proxy arguments are rehydrated into [`CallbackHandle`]s
//! so a served method can call "back" into the other context as if it had a
//! real function reference.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::{CallbackId, RequestId};
use crate::protocol::{CallbackProxy, RemoteError};

use super::router::{InboundCall, Router, TransferFn};

// ============================================================================
// Types
// ============================================================================

/// A served method: takes rehydrated arguments, returns a result value.
pub type MethodHandler = Arc<dyn Fn(Vec<ServedArg>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

// ============================================================================
// CallbackHandle
// ============================================================================

/// Rehydrated function argument.
///
/// Invoking it sends a `callback` message back to the calling side, which
/// routes it to the stored function by callback ID. Valid until the call's
/// response is sent; later invocations are discarded by the peer.
#[derive(Clone)]
pub struct CallbackHandle {
    router: Arc<Router>,
    request_id: RequestId,
    callback_id: CallbackId,
}

impl CallbackHandle {
    /// Invokes the remote function argument with the given values.
    ///
    /// Fire-and-forget, may be called any number of times.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportClosed`] if the send fails.
    pub fn invoke(&self, args: Vec<Value>) -> Result<()> {
        self.router
            .send_callback(self.request_id, self.callback_id, args)
    }

    /// Returns the callback ID this handle stands in for.
    #[inline]
    #[must_use]
    pub fn callback_id(&self) -> CallbackId {
        self.callback_id
    }
}

impl fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackHandle")
            .field("request_id", &self.request_id)
            .field("callback_id", &self.callback_id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ServedArg
// ============================================================================

/// One argument of an inbound call, after rehydration.
#[derive(Debug)]
pub enum ServedArg {
    /// A plain value.
    Value(Value),
    /// A rehydrated function argument.
    Callback(CallbackHandle),
}

impl ServedArg {
    /// Returns the plain value, if this argument is one.
    #[inline]
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Callback(_) => None,
        }
    }

    /// Consumes the argument, returning the plain value or `Null`.
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Value(value) => value,
            Self::Callback(_) => Value::Null,
        }
    }

    /// Returns the callback handle, if this argument is one.
    #[inline]
    #[must_use]
    pub fn as_callback(&self) -> Option<&CallbackHandle> {
        match self {
            Self::Value(_) => None,
            Self::Callback(handle) => Some(handle),
        }
    }
}

// ============================================================================
// LocalHandle
// ============================================================================

/// Serves the peer's calls out of a registered method table.
///
/// Mutation of the table happens only through [`set_method`](Self::set_method)
/// and [`set_methods`](Self::set_methods); the service task is the only
/// reader, one call at a time.
pub struct LocalHandle {
    methods: Arc<Mutex<FxHashMap<String, MethodHandler>>>,
    transfer_fns: Arc<Mutex<FxHashMap<String, TransferFn>>>,
    service: JoinHandle<()>,
}

impl LocalHandle {
    /// Creates the local handle and starts its service task.
    #[must_use]
    pub(crate) fn new(router: Arc<Router>) -> Self {
        let methods: Arc<Mutex<FxHashMap<String, MethodHandler>>> =
            Arc::new(Mutex::new(FxHashMap::default()));
        let transfer_fns: Arc<Mutex<FxHashMap<String, TransferFn>>> =
            Arc::new(Mutex::new(FxHashMap::default()));

        let (sink, calls) = mpsc::unbounded_channel();
        router.set_call_sink(sink);

        let service = tokio::spawn(Self::run_service(
            calls,
            router,
            Arc::clone(&methods),
            Arc::clone(&transfer_fns),
        ));

        Self {
            methods,
            transfer_fns,
            service,
        }
    }

    /// Registers a single served method.
    ///
    /// Replaces any handler previously registered under the same name.
    pub fn set_method<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(Vec<ServedArg>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        let handler: MethodHandler = Arc::new(move |args| Box::pin(f(args)));
        self.methods.lock().insert(name.into(), handler);
    }

    /// Registers several served methods at once.
    pub fn set_methods(&self, methods: impl IntoIterator<Item = (String, MethodHandler)>) {
        let mut table = self.methods.lock();
        for (name, handler) in methods {
            table.insert(name, handler);
        }
    }

    /// Registers a transfer hint function for a method's result.
    pub fn register_transfer<F>(&self, method: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> Vec<usize> + Send + Sync + 'static,
    {
        self.transfer_fns.lock().insert(method.into(), Arc::new(f));
    }

    /// Stops the service task.
    pub(crate) fn stop(&self) {
        self.service.abort();
    }

    /// Service loop answering inbound calls.
    async fn run_service(
        mut calls: mpsc::UnboundedReceiver<InboundCall>,
        router: Arc<Router>,
        methods: Arc<Mutex<FxHashMap<String, MethodHandler>>>,
        transfer_fns: Arc<Mutex<FxHashMap<String, TransferFn>>>,
    ) {
        while let Some(call) = calls.recv().await {
            let handler = methods.lock().get(&call.method_name).cloned();

            let Some(handler) = handler else {
                debug!(
                    request_id = %call.request_id,
                    method = call.method_name,
                    "call for unregistered method"
                );
                let remote = RemoteError::from_error(&Error::method_not_found(&call.method_name));
                if let Err(e) = router.send_response(call.request_id, Err(remote), &[]) {
                    warn!(error = %e, "failed to send method-not-found response");
                }
                continue;
            };

            let args = rehydrate_args(&router, call.request_id, call.args);
            let transfer = transfer_fns.lock().get(&call.method_name).cloned();
            let router = Arc::clone(&router);
            let request_id = call.request_id;

            // Served methods run concurrently; each answers its own call.
            tokio::spawn(async move {
                let (settlement, hint) = match handler(args).await {
                    Ok(value) => {
                        let hint = transfer
                            .map(|f| f(std::slice::from_ref(&value)))
                            .unwrap_or_default();
                        (Ok(value), hint)
                    }
                    Err(e) => (Err(RemoteError::from_error(&e)), Vec::new()),
                };
                if let Err(e) = router.send_response(request_id, settlement, &hint) {
                    warn!(%request_id, error = %e, "failed to send response");
                }
            });
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Rehydrates wire arguments, turning callback proxies into handles.
fn rehydrate_args(router: &Arc<Router>, request_id: RequestId, args: Vec<Value>) -> Vec<ServedArg> {
    args.into_iter()
        .map(|value| match CallbackProxy::from_value(&value) {
            Some(callback_id) => ServedArg::Callback(CallbackHandle {
                router: Arc::clone(router),
                request_id,
                callback_id,
            }),
            None => ServedArg::Value(value),
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
