//! Request interception demonstration.
//!
//! Demonstrates:
//! - A worker-side request gateway with a stub issuer
//! - Watch descriptors (substring and exact matching, serialization modes)
//! - Installing and restoring the interceptor
//! - Relaying intercepted records to the pilot as events
//! - Awaiting a record by logical identifier
//!
//! Usage:
//!   cargo run --example request_interception

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use context_bridge::intercept::spawn_intercept_relay;
use context_bridge::pilot::{self, WaitOptions};
use context_bridge::transport::{ChannelTransport, Transport};
use context_bridge::{
    Bridge, EventedRequest, HandshakeConfig, HttpIssuer, HttpRequest, HttpResponse, Interceptor,
    RequestGateway, Result, Serialization, WatchDescriptor,
};

// ============================================================================
// Stub Issuer
// ============================================================================

/// Stands in for the worker context's real request primitive.
struct StubIssuer;

#[async_trait]
impl HttpIssuer for StubIssuer {
    async fn issue(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = if request.url.contains("/api/token") {
            HttpResponse::new(200, r#"{"token":"tok-8842","expiresIn":3600}"#)
                .with_header("content-type", "application/json")
        } else {
            HttpResponse::new(200, "<html>portal</html>").with_header("content-type", "text/html")
        };
        Ok(response)
    }
}

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
    let (pilot_side, worker_side) = ChannelTransport::pair();
    let worker_task = tokio::spawn(Bridge::open_worker(
        Arc::new(worker_side) as Arc<dyn Transport>
    ));
    let pilot = Bridge::open_pilot(
        Arc::new(pilot_side) as Arc<dyn Transport>,
        HandshakeConfig::default(),
    )
    .await?;
    let worker = Arc::new(worker_task.await.expect("worker task")?);

    // ------------------------------------------------------------------------
    // Worker side: gateway, watch-list, interceptor, relay
    // ------------------------------------------------------------------------

    let gateway = RequestGateway::new(Arc::new(StubIssuer));
    let interceptor = Interceptor::new(
        Arc::clone(&gateway),
        vec![
            WatchDescriptor::new("token", "/api/token", "POST")
                .with_serialization(Serialization::Json),
            WatchDescriptor::new("portal", "https://portal.example/home", "GET")
                .with_exact(true)
                .with_serialization(Serialization::Text),
        ],
    );
    interceptor.init();
    let relay = spawn_intercept_relay(Arc::clone(&worker), &interceptor);

    // ------------------------------------------------------------------------
    // Pilot awaits the token request while the worker makes it
    // ------------------------------------------------------------------------

    let worker_traffic = tokio::spawn({
        let gateway = Arc::clone(&gateway);
        async move {
            // Unwatched request: matches no descriptor, nothing is published.
            gateway
                .issue(HttpRequest::new("GET", "https://portal.example/assets/app.js"))
                .await?;

            // The watched one, made through the event-driven primitive.
            let mut request = EventedRequest::new(gateway);
            request.open("POST", "https://portal.example/api/token?grant=password");
            request.set_request_header("Accept", "application/json");
            request.on_complete(|response| {
                println!("[OK] worker saw status {}", response.status);
            });
            request.send(Some("user=jo".into())).await?;
            Ok::<(), context_bridge::Error>(())
        }
    });

    let record = pilot::wait_for_request_interception(
        &pilot,
        "token",
        WaitOptions::new().with_timeout(Duration::from_secs(5)),
    )
    .await?;
    println!("[OK] intercepted '{}' from {}", record["identifier"], record["url"]);
    println!("     token = {}", record["response"]["token"]);

    worker_traffic.await.expect("worker traffic")?;

    // ------------------------------------------------------------------------
    // Restore: the gateway issues unobserved again
    // ------------------------------------------------------------------------

    interceptor.restore();
    relay.abort();
    println!("[OK] interception removed");

    pilot.close();
    worker.close();
    Ok(())
}
