//! Bridge facade.
//!
//! The thin convenience surface application code holds on each side of the
//! session: open, call, emit, listen, close.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::identifiers::{ListenerId, SessionId};
use crate::transport::Transport;

use super::connection::Connection;
use super::handshake::{self, HandshakeConfig};
use super::local::{MethodHandler, ServedArg};
use super::remote::CallArg;
use super::router::EventListener;

// ============================================================================
// Bridge
// ============================================================================

/// Convenience facade over an established [`Connection`].
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use context_bridge::{Bridge, HandshakeConfig};
/// use context_bridge::transport::ChannelTransport;
///
/// let (pilot_side, worker_side) = ChannelTransport::pair();
///
/// let worker = tokio::spawn(Bridge::open_worker(Arc::new(worker_side)));
/// let pilot = Bridge::open_pilot(Arc::new(pilot_side), HandshakeConfig::default()).await?;
/// let worker = worker.await??;
///
/// worker.set_method("readToken", |_args| async { Ok("tok123".into()) });
/// let token = pilot.call("readToken", vec![]).await?;
/// ```
pub struct Bridge {
    connection: Connection,
}

impl Bridge {
    /// Opens the pilot (initiating) side of a session.
    ///
    /// Runs the parent handshake to completion before returning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeFailed`](crate::Error::HandshakeFailed) if
    /// the worker never answers within the configured attempt budget.
    pub async fn open_pilot(
        transport: Arc<dyn Transport>,
        config: HandshakeConfig,
    ) -> Result<Self> {
        let connection = handshake::initiate(transport, &config).await?;
        Ok(Self { connection })
    }

    /// Opens the worker (accepting) side of a session.
    ///
    /// Waits for the pilot's handshake request; callers wanting a bound
    /// should wrap this in [`tokio::time::timeout`].
    pub async fn open_worker(transport: Arc<dyn Transport>) -> Result<Self> {
        let connection = handshake::accept(transport).await?;
        Ok(Self { connection })
    }

    /// Wraps an already established connection.
    #[inline]
    #[must_use]
    pub fn from_connection(connection: Connection) -> Self {
        Self { connection }
    }

    /// Returns the negotiated session ID.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.connection.session_id()
    }

    /// Returns the underlying connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Calls a method registered on the other side.
    ///
    /// # Errors
    ///
    /// Rejects with the remote error, or with
    /// [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) if this
    /// bridge closes mid-call.
    pub async fn call(&self, method: &str, args: Vec<CallArg>) -> Result<Value> {
        self.connection.remote().call(method, args).await
    }

    /// Emits a fire-and-forget event to the other side.
    pub fn emit(&self, event_name: &str, payload: Value) -> Result<()> {
        self.connection.remote().emit(event_name, payload)
    }

    /// Adds a listener for events emitted by the other side.
    pub fn add_event_listener(
        &self,
        event_name: impl Into<String>,
        listener: EventListener,
    ) -> ListenerId {
        self.connection
            .router()
            .add_event_listener(event_name, listener)
    }

    /// Removes a previously added event listener.
    pub fn remove_event_listener(&self, id: ListenerId) {
        self.connection.router().remove_event_listener(id);
    }

    /// Registers a method the other side may call.
    pub fn set_method<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(Vec<ServedArg>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        self.connection.local().set_method(name, f);
    }

    /// Registers several served methods at once.
    pub fn set_methods(&self, methods: impl IntoIterator<Item = (String, MethodHandler)>) {
        self.connection.local().set_methods(methods);
    }

    /// Closes the bridge and its session.
    pub fn close(&self) {
        self.connection.close();
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex as PlMutex;
    use serde_json::json;
    use tokio::time::sleep;
    use tokio_test::assert_err;

    use crate::error::Error;
    use crate::transport::ChannelTransport;

    /// Opens a handshaken pilot/worker pair over an in-memory transport.
    async fn open_pair() -> (Bridge, Bridge) {
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
        let worker = worker.await.expect("join").expect("worker");
        (pilot, worker)
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let (pilot, worker) = open_pair().await;

        worker.set_method("echo", |args| async move {
            Ok(args
                .into_iter()
                .next()
                .map(ServedArg::into_value)
                .unwrap_or(Value::Null))
        });

        let result = pilot
            .call("echo", vec![json!({"data": "tok123"}).into()])
            .await
            .expect("call");
        assert_eq!(result, json!({"data": "tok123"}));

        pilot.close();
        worker.close();
    }

    #[tokio::test]
    async fn test_method_not_found_rejects_with_name() {
        let (pilot, worker) = open_pair().await;

        let err = pilot
            .call("definitelyMissing", vec![])
            .await
            .expect_err("must reject");

        assert!(matches!(err, Error::Remote { .. }));
        assert!(err.to_string().contains("definitelyMissing"));

        pilot.close();
        worker.close();
    }

    #[tokio::test]
    async fn test_handler_error_is_normalized() {
        let (pilot, worker) = open_pair().await;

        worker.set_method("explode", |_args| async {
            Err(Error::remote("TypeError", "cannot read field"))
        });

        let err = pilot.call("explode", vec![]).await.expect_err("reject");
        match err {
            Error::Remote { name, message } => {
                assert_eq!(name, "TypeError");
                assert_eq!(message, "cannot read field");
            }
            other => panic!("unexpected error: {other}"),
        }

        pilot.close();
        worker.close();
    }

    #[tokio::test]
    async fn test_concurrent_calls_settle_independently() {
        let (pilot, worker) = open_pair().await;

        worker.set_method("slow", |_args| async {
            sleep(Duration::from_millis(60)).await;
            Ok(json!("slow"))
        });
        worker.set_method("fast", |_args| async { Ok(json!("fast")) });

        let (slow, fast) = tokio::join!(pilot.call("slow", vec![]), pilot.call("fast", vec![]));

        // Responses arrive out of order; correlation is by request ID only.
        assert_eq!(slow.expect("slow"), json!("slow"));
        assert_eq!(fast.expect("fast"), json!("fast"));

        pilot.close();
        worker.close();
    }

    #[tokio::test]
    async fn test_callbacks_route_by_id_in_order() {
        let (pilot, worker) = open_pair().await;

        worker.set_method("subscribe", |args| async move {
            let progress = args[0].as_callback().expect("progress cb").clone();
            let status = args[1].as_callback().expect("status cb").clone();

            progress.invoke(vec![json!(10)]).expect("cb");
            progress.invoke(vec![json!(50)]).expect("cb");
            status.invoke(vec![json!("halfway")]).expect("cb");
            progress.invoke(vec![json!(100)]).expect("cb");

            Ok(json!("subscribed"))
        });

        let progress_seen = Arc::new(PlMutex::new(Vec::new()));
        let status_seen = Arc::new(PlMutex::new(Vec::new()));

        let progress_log = Arc::clone(&progress_seen);
        let status_log = Arc::clone(&status_seen);

        let result = pilot
            .call(
                "subscribe",
                vec![
                    CallArg::callback(move |args| {
                        progress_log.lock().push(args[0].clone());
                    }),
                    CallArg::callback(move |args| {
                        status_log.lock().push(args[0].clone());
                    }),
                ],
            )
            .await
            .expect("call");

        assert_eq!(result, json!("subscribed"));
        // Per-sender order holds within one call's message sequence.
        assert_eq!(*progress_seen.lock(), vec![json!(10), json!(50), json!(100)]);
        assert_eq!(*status_seen.lock(), vec![json!("halfway")]);

        pilot.close();
        worker.close();
    }

    #[tokio::test]
    async fn test_events_flow_both_directions() {
        let (pilot, worker) = open_pair().await;

        let at_pilot = Arc::new(AtomicUsize::new(0));
        let at_worker = Arc::new(AtomicUsize::new(0));

        let pilot_counter = Arc::clone(&at_pilot);
        pilot.add_event_listener(
            "workerEvent",
            Arc::new(move |_| {
                pilot_counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let worker_counter = Arc::clone(&at_worker);
        worker.add_event_listener(
            "pilotEvent",
            Arc::new(move |_| {
                worker_counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        worker.emit("workerEvent", json!({"n": 1})).expect("emit");
        pilot.emit("pilotEvent", json!({"n": 2})).expect("emit");
        sleep(Duration::from_millis(50)).await;

        assert_eq!(at_pilot.load(Ordering::SeqCst), 1);
        assert_eq!(at_worker.load(Ordering::SeqCst), 1);

        pilot.close();
        worker.close();
    }

    #[tokio::test]
    async fn test_close_fails_pending_call() {
        let (pilot, worker) = open_pair().await;

        worker.set_method("forever", |_args| async {
            sleep(Duration::from_secs(3600)).await;
            Ok(Value::Null)
        });

        let call = {
            let pilot_ref = &pilot;
            tokio::time::timeout(Duration::from_millis(500), async move {
                let fut = pilot_ref.call("forever", vec![]);
                fut.await
            })
        };

        // Close while the call is pending.
        let closer = async {
            sleep(Duration::from_millis(50)).await;
            pilot.close();
        };

        let (outcome, ()) = tokio::join!(call, closer);
        let err = outcome.expect("not timed out").expect_err("must fail");
        assert!(matches!(err, Error::ConnectionClosed));

        worker.close();
    }

    #[tokio::test]
    async fn test_call_after_close_settles_as_closed() {
        let (pilot, worker) = open_pair().await;
        worker.set_method("ping", |_args| async { Ok(json!("pong")) });

        pilot.close();

        // Must settle promptly, not park forever in a dead pending map.
        let outcome = tokio::time::timeout(Duration::from_millis(300), pilot.call("ping", vec![]))
            .await
            .expect("must settle, not hang");
        let err = assert_err!(outcome);
        assert!(matches!(err, Error::ConnectionClosed));

        worker.close();
    }

    #[tokio::test]
    async fn test_two_sessions_on_one_transport_do_not_crosstalk() {
        // Two independent pilot/worker pairs sharing the same duplex pipe.
        let (pilot_side, worker_side) = ChannelTransport::pair();
        let pilot_side: Arc<dyn Transport> = Arc::new(pilot_side);
        let worker_side: Arc<dyn Transport> = Arc::new(worker_side);

        let worker_a = tokio::spawn(Bridge::open_worker(Arc::clone(&worker_side)));
        let pilot_a = Bridge::open_pilot(Arc::clone(&pilot_side), HandshakeConfig::default())
            .await
            .expect("pilot a");
        let worker_a = worker_a.await.expect("join").expect("worker a");

        let worker_b = tokio::spawn(Bridge::open_worker(Arc::clone(&worker_side)));
        let pilot_b = Bridge::open_pilot(Arc::clone(&pilot_side), HandshakeConfig::default())
            .await
            .expect("pilot b");
        let worker_b = worker_b.await.expect("join").expect("worker b");

        assert_ne!(pilot_a.session_id(), pilot_b.session_id());

        worker_a.set_method("whoami", |_args| async { Ok(json!("a")) });
        worker_b.set_method("whoami", |_args| async { Ok(json!("b")) });

        assert_eq!(pilot_a.call("whoami", vec![]).await.expect("a"), json!("a"));
        assert_eq!(pilot_b.call("whoami", vec![]).await.expect("b"), json!("b"));

        pilot_a.close();
        worker_a.close();
        pilot_b.close();
        worker_b.close();
    }
}
