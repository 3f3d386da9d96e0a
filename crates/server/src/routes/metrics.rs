// crates/server/src/routes/metrics.rs
//! Prometheus metrics exposition endpoint.

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::metrics::render_metrics;
use crate::state::AppState;

/// GET /api/metrics - Render current metrics in Prometheus format.
async fn metrics_exposition() -> String {
    render_metrics()
}

/// Create the metrics router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/metrics", get(metrics_exposition))
}
