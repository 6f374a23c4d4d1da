//! Paired contexts demonstration.
//!
//! Demonstrates:
//! - Opening a pilot/worker pair over the in-memory transport
//! - Serving methods on the worker side
//! - Calls with plain and callback arguments
//! - Events in both directions
//! - Condition polling with a timeout
//!
//! Usage:
//!   cargo run --example paired_contexts

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;

use context_bridge::pilot::{self, UntilTrue};
use context_bridge::transport::{ChannelTransport, Transport};
use context_bridge::{Bridge, CallArg, HandshakeConfig, ServedArg};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // The two halves of an in-process "window pair".
    let (pilot_side, worker_side) = ChannelTransport::pair();

    let worker_task = tokio::spawn(Bridge::open_worker(
        Arc::new(worker_side) as Arc<dyn Transport>
    ));
    let pilot = Bridge::open_pilot(
        Arc::new(pilot_side) as Arc<dyn Transport>,
        HandshakeConfig::default(),
    )
    .await?;
    let worker = worker_task.await.expect("worker task")?;
    println!("[OK] handshake established ({})", pilot.session_id());

    // ------------------------------------------------------------------------
    // Serve methods on the worker side
    // ------------------------------------------------------------------------

    worker.set_method("pageTitle", |_args| async { Ok(json!("Billing Portal")) });

    worker.set_method("countDown", |args: Vec<ServedArg>| async move {
        let from = args[0].as_value().and_then(|v| v.as_u64()).unwrap_or(3);
        let tick = args[1].as_callback().expect("tick callback").clone();
        for n in (1..=from).rev() {
            tick.invoke(vec![json!(n)])?;
        }
        Ok(json!("done"))
    });

    let ready = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let ready_flag = Arc::clone(&ready);
    worker.set_method("isReady", move |_args| {
        let ready = Arc::clone(&ready_flag);
        async move { Ok(json!(ready.load(std::sync::atomic::Ordering::SeqCst))) }
    });

    // ------------------------------------------------------------------------
    // Call with a plain argument
    // ------------------------------------------------------------------------

    let title = pilot::run_in_worker(&pilot, "pageTitle", vec![], Duration::from_secs(5)).await?;
    println!("[OK] pageTitle -> {title}");

    // ------------------------------------------------------------------------
    // Call with a callback argument
    // ------------------------------------------------------------------------

    let result = pilot
        .call(
            "countDown",
            vec![
                json!(3).into(),
                CallArg::callback(|args| println!("     tick: {}", args[0])),
            ],
        )
        .await?;
    println!("[OK] countDown -> {result}");

    // ------------------------------------------------------------------------
    // Events and condition polling
    // ------------------------------------------------------------------------

    worker.add_event_listener(
        "pilotEvent",
        Arc::new(|payload| println!("     worker saw event: {payload}")),
    );
    pilot.emit("pilotEvent", json!({"kind": "greeting"}))?;

    tokio::spawn(async move {
        sleep(Duration::from_millis(150)).await;
        ready.store(true, std::sync::atomic::Ordering::SeqCst);
    });
    pilot::run_in_worker_until_true(
        &pilot,
        UntilTrue::new("isReady")
            .with_timeout(Duration::from_secs(2))
            .with_interval(Duration::from_millis(25)),
    )
    .await?;
    println!("[OK] worker reported ready");

    pilot.close();
    worker.close();
    Ok(())
}
