//! API route handlers for the paperpress server.

pub mod convert;
pub mod download;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod progress;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - POST /api/convert - Upload an EPUB and start a conversion job
/// - GET  /api/progress/{job_id} - SSE stream of one job's progress
/// - GET  /api/download/{filename} - Download a converted PDF
/// - GET  /api/health - Health check (includes cached tool status)
/// - GET|POST /api/tool/refresh - Re-probe the conversion tool
/// - GET  /api/jobs - List running jobs
/// - GET  /metrics - Prometheus metrics (no /api prefix)
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", convert::router())
        .nest("/api", progress::router())
        .nest("/api", download::router())
        .nest("/api", health::router())
        .nest("/api", jobs::router())
        .merge(metrics::router())
        .with_state(state)
}
