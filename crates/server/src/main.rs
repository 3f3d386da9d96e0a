// crates/server/src/main.rs
//! Quotient server binary.
//!
//! Validates the routing table, opens the job store, spawns the scheduler
//! loop, and serves the HTTP API. Backends execute asynchronously; the
//! server process owns only orchestration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use quotient_db::Database;
use quotient_server::dispatch::Dispatcher;
use quotient_server::notify::LogNotifier;
use quotient_server::scheduler::Scheduler;
use quotient_server::tier_provider::{StaticTierProvider, TierProvider};
use quotient_server::{create_app, init_metrics, AppState};

/// Default port for the server.
const DEFAULT_PORT: u16 = 8643;

/// Default scheduler poll interval.
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Get the server port from environment or use default.
fn get_port() -> u16 {
    std::env::var("QUOTIENT_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

/// Get the job-store path override, if any.
fn get_db_path() -> Option<PathBuf> {
    std::env::var("QUOTIENT_DB").ok().map(PathBuf::from)
}

/// Get the scheduler poll interval from environment or use default.
fn get_poll_interval() -> Duration {
    let ms = std::env::var("QUOTIENT_POLL_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
    Duration::from_millis(ms)
}

/// Build the tier provider.
///
/// `QUOTIENT_TIERS` may point at a JSON file of user → tier assignments;
/// users without an assignment land on the basic tier.
fn get_tier_provider() -> Result<Arc<dyn TierProvider>> {
    match std::env::var("QUOTIENT_TIERS").ok() {
        Some(path) => {
            let provider = StaticTierProvider::from_file(std::path::Path::new(&path), "basic")?;
            Ok(Arc::new(provider))
        }
        None => Ok(Arc::new(StaticTierProvider::all_default("basic"))),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    // Initialize Prometheus metrics
    init_metrics();

    // Step 1: Fail fast on routing-table defects — an unroutable job type
    // must never reach the scheduler.
    quotient_core::validate_routing_table()
        .map_err(|e| anyhow::anyhow!("routing table invalid: {e}"))?;

    // Step 2: Open the job store
    let db = match get_db_path() {
        Some(path) => Database::new(&path).await?,
        None => Database::open_default().await?,
    };

    // Step 3: Wire up collaborators and shared state
    let tiers = get_tier_provider()?;
    let dispatcher = Arc::new(Dispatcher::in_process_defaults());

    // Every routed kind must have a registered executor.
    let registered = dispatcher.registered_kinds();
    for descriptor in quotient_core::ROUTING_TABLE {
        anyhow::ensure!(
            registered.contains(&descriptor.kind),
            "no executor registered for backend kind {}",
            descriptor.kind
        );
    }

    let state = AppState::new(db.clone(), tiers, dispatcher.clone(), Arc::new(LogNotifier));

    // Step 4: Spawn the scheduler loop
    let scheduler = Arc::new(Scheduler::new(
        db,
        dispatcher,
        state.tracker.clone(),
        state.scheduler_nudge.clone(),
        get_poll_interval(),
    ));
    scheduler.spawn();

    // Step 5: Serve the HTTP API
    let app = create_app(state);
    let port = get_port();
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(port, "quotient v{} listening", env!("CARGO_PKG_VERSION"));

    axum::serve(listener, app).await?;

    Ok(())
}
