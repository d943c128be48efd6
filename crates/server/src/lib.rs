// crates/server/src/lib.rs
//! Paperpress server library.
//!
//! This crate provides the Axum-based HTTP service that accepts EPUB uploads,
//! converts them to PDF in the background with Calibre's `ebook-convert`,
//! streams per-job progress over SSE and serves the results.

pub mod config;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::*;
pub use jobs::{spawn_eviction_task, JobRunner, JobStore};
pub use metrics::{init_metrics, render_metrics};
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

/// Slack above the file size limit for multipart framing and other fields.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes (convert, progress, download, health, jobs, metrics)
/// - Static frontend files from `config.static_dir`, if set
/// - CORS (allows any origin)
/// - Upload size limit
/// - Request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);
    let static_dir = state.config.static_dir.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new().merge(api_routes(state));

    if let Some(dir) = static_dir {
        let index = dir.join("index.html");
        app = app.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)));
    }

    app.layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Integration Tests
// ============================================================================
