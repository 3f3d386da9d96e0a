// crates/server/src/lib.rs
//! Quotient server library.
//!
//! This crate provides the Axum-based HTTP server for the quotient
//! background-job orchestration service, plus the orchestration components
//! themselves: admission controller, scheduler, backend dispatcher, status
//! tracker, and retry manager.

pub mod admission;
pub mod backends;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod retry;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod tier_provider;
pub mod tracker;

pub use error::*;
pub use metrics::init_metrics;
pub use routes::api_routes;
pub use state::AppState;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes (health, background-jobs, metrics)
/// - CORS for development (allows any origin)
/// - Request tracing
pub fn create_app(state: std::sync::Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Integration Tests
// ============================================================================
