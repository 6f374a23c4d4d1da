//! Pilot-side orchestration.
//!
//! Timeout-bounded helpers layered on the [`Bridge`]: one-shot calls,
//! condition polling, intercepted-request correlation and a bounded retry
//! combinator. Every timeout here is local: the worker is never told to
//! cancel anything, its late messages are simply ignored.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::bridge::{Bridge, CallArg};
use crate::error::{Error, Result};
use crate::intercept::{REQUEST_RESPONSE_EVENT, WORKER_EVENT};

// ============================================================================
// Constants
// ============================================================================

/// Default bound for polling and correlation waits.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default spacing between condition polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Options
// ============================================================================

/// Parameters for [`run_in_worker_until_true`].
#[derive(Debug, Clone)]
pub struct UntilTrue {
    /// Method polled on the worker side.
    pub method: String,
    /// Arguments passed on every poll.
    pub args: Vec<Value>,
    /// Overall deadline for the condition to become true.
    pub timeout: Duration,
    /// Spacing between polls.
    pub interval: Duration,
}

impl UntilTrue {
    /// Creates options polling the given method with defaults.
    #[must_use]
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the poll arguments.
    #[inline]
    #[must_use]
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Sets the overall deadline.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the poll interval.
    #[inline]
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Parameters for [`wait_for_request_interception`].
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Bound on the correlation wait.
    pub timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl WaitOptions {
    /// Creates the default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the wait bound.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ============================================================================
// Calls
// ============================================================================

/// Calls a worker method, giving up locally after `deadline`.
///
/// The worker may still complete the call; its late response is discarded by
/// the router.
///
/// # Errors
///
/// - [`Error::Timeout`] naming the method on deadline expiry
/// - the call's own error otherwise
pub async fn run_in_worker(
    bridge: &Bridge,
    method: &str,
    args: Vec<CallArg>,
    deadline: Duration,
) -> Result<Value> {
    match timeout(deadline, bridge.call(method, args)).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(method, deadline.as_millis() as u64)),
    }
}

/// Polls a worker method until it returns `true`.
///
/// Any value other than `true` (including non-booleans) keeps polling. A
/// failing poll call aborts the wait and surfaces the call's error.
///
/// # Errors
///
/// - [`Error::Timeout`] naming the method when the deadline passes without a
///   `true`
/// - the first failing poll's error otherwise
pub async fn run_in_worker_until_true(bridge: &Bridge, options: UntilTrue) -> Result<()> {
    let poll = async {
        loop {
            let args = options.args.iter().cloned().map(CallArg::Value).collect();
            let result = bridge.call(&options.method, args).await?;
            if result == Value::Bool(true) {
                return Ok(());
            }
            sleep(options.interval).await;
        }
    };

    match timeout(options.timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(
            &options.method,
            options.timeout.as_millis() as u64,
        )),
    }
}

// ============================================================================
// Interception Correlation
// ============================================================================

/// Awaits the intercepted record published under `identifier`.
///
/// Subscribes one-shot to the worker's notification stream, filtered on the
/// intercepted-request kind and the identifier; resolves with the record
/// payload and unsubscribes on the first match.
///
/// # Errors
///
/// Returns [`Error::Timeout`] naming the identifier if no matching record
/// arrives within `options.timeout`.
pub async fn wait_for_request_interception(
    bridge: &Bridge,
    identifier: &str,
    options: WaitOptions,
) -> Result<Value> {
    let (matched_tx, matched_rx) = oneshot::channel();
    let matched_tx = Mutex::new(Some(matched_tx));
    let wanted = identifier.to_owned();

    let listener_id = bridge.add_event_listener(
        WORKER_EVENT,
        Arc::new(move |payload| {
            let kind = payload.get("event").and_then(Value::as_str);
            if kind != Some(REQUEST_RESPONSE_EVENT) {
                return;
            }
            let record = payload.get("payload");
            let ident = record
                .and_then(|r| r.get("identifier"))
                .and_then(Value::as_str);
            if ident != Some(wanted.as_str()) {
                return;
            }
            if let Some(tx) = matched_tx.lock().take() {
                let _ = tx.send(record.cloned().unwrap_or(Value::Null));
            }
        }),
    );

    debug!(identifier, "waiting for intercepted request");
    let outcome = match timeout(options.timeout, matched_rx).await {
        Ok(Ok(record)) => Ok(record),
        Ok(Err(_)) => Err(Error::ConnectionClosed),
        Err(_) => Err(Error::timeout(
            format!("waitForRequestInterception:{identifier}"),
            options.timeout.as_millis() as u64,
        )),
    };

    bridge.remove_event_listener(listener_id);
    outcome
}

// ============================================================================
// Retry
// ============================================================================

/// Runs `op` up to `attempts` times, sleeping `delay` between failures.
///
/// `should_retry` is consulted on every failure; a `false` is unconditionally
/// terminal and surfaces that error immediately, regardless of remaining
/// attempts.
///
/// # Errors
///
/// Returns the last error once attempts are exhausted, or the first error
/// `should_retry` rejects.
pub async fn retry<T, F, Fut, P>(
    attempts: u32,
    delay: Duration,
    should_retry: P,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    P: Fn(&Error) -> bool,
{
    debug_assert!(attempts > 0);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts || !should_retry(&e) => return Err(e),
            Err(e) => {
                warn!(attempt, error = %e, "operation failed, retrying");
                sleep(delay).await;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
