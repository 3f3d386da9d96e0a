//! API route handlers for the quotient server.

pub mod health;
pub mod jobs;
pub mod metrics;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET    /api/health - Health check
/// - POST   /api/background-jobs - Submit an analytical job
/// - GET    /api/background-jobs - List the caller's jobs
/// - GET    /api/background-jobs/{id}/status - Job status and progress
/// - DELETE /api/background-jobs/{id} - Cancel a queued or running job
/// - GET    /api/background-jobs/stream - SSE stream of the caller's job events
/// - GET    /api/metrics - Prometheus exposition
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", jobs::router())
        .nest("/api", metrics::router())
        .with_state(state)
}
