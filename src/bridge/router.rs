//! Message router and internal dispatch.
//!
//! The router owns one session ID and one transport subscription. A
//! background pump task classifies every inbound payload and re-dispatches
//! it internally:
//!
//! - `call` → the registered call sink (consumed by the local handle)
//! - `response` → the pending entry keyed by request ID
//! - `callback` → the callback route keyed by request ID, then callback ID
//! - `event` → listeners registered for that event name
//!
//! Foreign payloads, foreign sessions, duplicate responses and unroutable
//! callbacks are discarded, never errors.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::identifiers::{CallbackId, ListenerId, RequestId, SessionId};
use crate::protocol::{Envelope, Payload, RemoteError};
use crate::transport::Transport;

// ============================================================================
// Types
// ============================================================================

/// Stored function argument invoked by inbound `callback` messages.
pub type CallbackFn = Arc<dyn Fn(Vec<Value>) + Send + Sync>;

/// Listener invoked for inbound `event` messages.
pub type EventListener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Per-method transfer hint function.
///
/// Given the sanitized outbound values, returns the positions eligible for
/// zero-copy transfer on transports that support it.
pub type TransferFn = Arc<dyn Fn(&[Value]) -> Vec<usize> + Send + Sync>;

/// Settlement delivered to a pending call.
type Settlement = StdResult<Value, RemoteError>;

/// An inbound call handed to the local handle.
#[derive(Debug)]
pub(crate) struct InboundCall {
    /// Correlates the response the local handle must send.
    pub request_id: RequestId,
    /// Method table key.
    pub method_name: String,
    /// Raw wire arguments (callback proxies not yet rehydrated).
    pub args: Vec<Value>,
}

// ============================================================================
// RouterShared
// ============================================================================

/// State shared between the router handle and its pump task.
struct RouterShared {
    session_id: SessionId,
    /// Pending calls awaiting a response.
    pending: Mutex<FxHashMap<RequestId, oneshot::Sender<Settlement>>>,
    /// Callback routes, retired when the matching response arrives.
    callback_routes: Mutex<FxHashMap<RequestId, FxHashMap<CallbackId, CallbackFn>>>,
    /// Sink for inbound calls.
    call_sink: Mutex<Option<mpsc::UnboundedSender<InboundCall>>>,
    /// Event listeners by listener ID.
    event_listeners: Mutex<FxHashMap<ListenerId, (String, EventListener)>>,
}

// ============================================================================
// Router
// ============================================================================

/// Session-scoped message router.
///
/// # Thread Safety
///
/// `Router` is `Send + Sync`; all interior state is lock-protected and the
/// pump task is the only inbound writer.
pub struct Router {
    session_id: SessionId,
    transport: Arc<dyn Transport>,
    shared: Arc<RouterShared>,
    pump: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Router {
    /// Creates a router for an established session and starts its pump task.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, session_id: SessionId) -> Self {
        let shared = Arc::new(RouterShared {
            session_id,
            pending: Mutex::new(FxHashMap::default()),
            callback_routes: Mutex::new(FxHashMap::default()),
            call_sink: Mutex::new(None),
            event_listeners: Mutex::new(FxHashMap::default()),
        });

        let inbound = transport.subscribe();
        let pump = tokio::spawn(Self::run_pump(inbound, Arc::clone(&shared)));

        Self {
            session_id,
            transport,
            shared,
            pump: Mutex::new(Some(pump)),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the session this router is scoped to.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Closes the router.
    ///
    /// Stops the pump task, fails every pending call with
    /// [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) and clears
    /// all internal subscribers. No inbound message is processed afterwards,
    /// even if it has already arrived.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }

        // Dropping the senders settles every outstanding call as closed.
        self.shared.pending.lock().clear();
        self.shared.callback_routes.lock().clear();
        self.shared.call_sink.lock().take();
        self.shared.event_listeners.lock().clear();

        debug!(session_id = %self.session_id, "router closed");
    }

    /// Returns `true` once [`close`](Self::close) has run.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Router - Outbound Primitives
// ============================================================================

impl Router {
    /// Sends a `call` message.
    pub fn send_call(
        &self,
        request_id: RequestId,
        method_name: &str,
        args: Vec<Value>,
        transfer: &[usize],
    ) -> Result<()> {
        let envelope = Envelope::new(
            self.session_id,
            Payload::Call {
                request_id,
                method_name: method_name.to_string(),
                args,
            },
        );
        trace!(session_id = %self.session_id, %request_id, method_name, "call sent");
        self.transport
            .post_with_transfer(envelope.to_value(), transfer)
    }

    /// Sends a `response` message for a served call.
    pub fn send_response(
        &self,
        request_id: RequestId,
        outcome: Settlement,
        transfer: &[usize],
    ) -> Result<()> {
        let (result, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(remote) => (None, Some(remote)),
        };
        let envelope = Envelope::new(
            self.session_id,
            Payload::Response {
                request_id,
                result,
                error,
            },
        );
        trace!(session_id = %self.session_id, %request_id, "response sent");
        self.transport
            .post_with_transfer(envelope.to_value(), transfer)
    }

    /// Sends a `callback` message invoking a proxied function argument.
    pub fn send_callback(
        &self,
        request_id: RequestId,
        callback_id: CallbackId,
        args: Vec<Value>,
    ) -> Result<()> {
        let envelope = Envelope::new(
            self.session_id,
            Payload::Callback {
                request_id,
                callback_id,
                args,
            },
        );
        trace!(session_id = %self.session_id, %request_id, %callback_id, "callback sent");
        self.transport.post(envelope.to_value())
    }

    /// Sends a fire-and-forget `event` message.
    pub fn send_event(&self, event_name: &str, payload: Value) -> Result<()> {
        let envelope = Envelope::new(
            self.session_id,
            Payload::Event {
                event_name: event_name.to_string(),
                payload,
            },
        );
        trace!(session_id = %self.session_id, event_name, "event sent");
        self.transport.post(envelope.to_value())
    }
}

// ============================================================================
// Router - Internal Registration
// ============================================================================

impl Router {
    /// Registers a pending call; the returned receiver settles exactly once.
    ///
    /// On a closed router the receiver settles immediately as closed.
    pub(crate) fn register_response(&self, request_id: RequestId) -> oneshot::Receiver<Settlement> {
        let (tx, rx) = oneshot::channel();
        if self.is_closed() {
            return rx;
        }
        self.shared.pending.lock().insert(request_id, tx);
        // close() may have cleared the map between the check and the insert.
        if self.is_closed() {
            self.shared.pending.lock().remove(&request_id);
        }
        rx
    }

    /// Installs the callback route for a call with function arguments.
    ///
    /// The route lives until the call's response arrives. No-op on a closed
    /// router.
    pub(crate) fn install_callback_route(
        &self,
        request_id: RequestId,
        callbacks: FxHashMap<CallbackId, CallbackFn>,
    ) {
        if self.is_closed() {
            return;
        }
        self.shared
            .callback_routes
            .lock()
            .insert(request_id, callbacks);
    }

    /// Discards the correlation state of a call whose send failed.
    ///
    /// Dropping the pending sender settles the caller's receiver as closed.
    pub(crate) fn abandon_call(&self, request_id: RequestId) {
        self.shared.pending.lock().remove(&request_id);
        self.shared.callback_routes.lock().remove(&request_id);
    }

    /// Registers the sink that receives inbound calls.
    pub(crate) fn set_call_sink(&self, sink: mpsc::UnboundedSender<InboundCall>) {
        *self.shared.call_sink.lock() = Some(sink);
    }

    /// Adds an event listener; returns its removal handle.
    pub fn add_event_listener(
        &self,
        event_name: impl Into<String>,
        listener: EventListener,
    ) -> ListenerId {
        let id = ListenerId::mint();
        self.shared
            .event_listeners
            .lock()
            .insert(id, (event_name.into(), listener));
        id
    }

    /// Removes a previously added event listener.
    pub fn remove_event_listener(&self, id: ListenerId) {
        self.shared.event_listeners.lock().remove(&id);
    }
}

// ============================================================================
// Router - Pump
// ============================================================================

impl Router {
    /// Pump loop classifying inbound payloads.
    async fn run_pump(mut inbound: broadcast::Receiver<Value>, shared: Arc<RouterShared>) {
        loop {
            match inbound.recv().await {
                Ok(value) => Self::dispatch(&value, &shared),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "router lagged behind transport; messages lost");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(session_id = %shared.session_id, "transport stream closed");
                    break;
                }
            }
        }
    }

    /// Classifies one inbound payload and re-dispatches it.
    fn dispatch(value: &Value, shared: &RouterShared) {
        let Some(envelope) = Envelope::parse(value) else {
            trace!("foreign payload discarded");
            return;
        };

        if envelope.session_id != shared.session_id {
            trace!(
                theirs = %envelope.session_id,
                ours = %shared.session_id,
                "foreign session discarded"
            );
            return;
        }

        match envelope.payload {
            // Late handshake retries after establishment carry no information.
            Payload::HandshakeRequest | Payload::HandshakeResponse => {
                trace!("post-handshake negotiation message discarded");
            }

            Payload::Call {
                request_id,
                method_name,
                args,
            } => {
                let sink = shared.call_sink.lock().clone();
                match sink {
                    Some(sink) => {
                        let _ = sink.send(InboundCall {
                            request_id,
                            method_name,
                            args,
                        });
                    }
                    None => {
                        warn!(%request_id, method_name, "call received with no local handle");
                    }
                }
            }

            Payload::Response {
                request_id,
                result,
                error,
            } => {
                // Retire the callback route first: no further callback for
                // this request is accepted once its response has arrived.
                shared.callback_routes.lock().remove(&request_id);

                let entry = shared.pending.lock().remove(&request_id);
                match entry {
                    Some(tx) => {
                        let settlement = match error {
                            Some(remote) => Err(remote),
                            None => Ok(result.unwrap_or(Value::Null)),
                        };
                        let _ = tx.send(settlement);
                    }
                    None => {
                        trace!(%request_id, "late or duplicate response discarded");
                    }
                }
            }

            Payload::Callback {
                request_id,
                callback_id,
                args,
            } => {
                let callback = shared
                    .callback_routes
                    .lock()
                    .get(&request_id)
                    .and_then(|route| route.get(&callback_id).cloned());
                match callback {
                    Some(callback) => callback(args),
                    None => {
                        trace!(%request_id, %callback_id, "unroutable callback discarded");
                    }
                }
            }

            Payload::Event {
                event_name,
                payload,
            } => {
                let listeners: Vec<EventListener> = shared
                    .event_listeners
                    .lock()
                    .values()
                    .filter(|(name, _)| *name == event_name)
                    .map(|(_, listener)| Arc::clone(listener))
                    .collect();
                trace!(event_name, listeners = listeners.len(), "event dispatched");
                for listener in listeners {
                    listener(&payload);
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
