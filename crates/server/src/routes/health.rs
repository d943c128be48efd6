// crates/server/src/routes/health.rs
//! Health check and conversion tool status endpoints.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Response for the health check endpoint.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub tool_installed: bool,
}

/// Response for the tool refresh endpoint.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ToolStatusResponse {
    pub status: String,
    pub tool_installed: bool,
    pub tool_path: Option<String>,
    pub message: String,
}

/// GET /api/health - Health check endpoint.
///
/// Returns server status, version, uptime and whether the conversion tool
/// is installed (cached probe).
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        tool_installed: state.tool.is_available(true).await,
    })
}

/// GET|POST /api/tool/refresh - Drop the cached probe and look again.
///
/// Lets a user who just installed Calibre continue without a restart.
pub async fn refresh_tool(State(state): State<Arc<AppState>>) -> Json<ToolStatusResponse> {
    state.tool.invalidate().await;
    let resolved = state.tool.resolved().await;

    let response = match resolved {
        Some(tool) => ToolStatusResponse {
            status: "success".to_string(),
            tool_installed: true,
            message: format!("Calibre detected at {tool}"),
            tool_path: Some(tool.to_string()),
        },
        None => ToolStatusResponse {
            status: "success".to_string(),
            tool_installed: false,
            tool_path: None,
            message: format!("Calibre not found. {}", crate::error::TOOL_INSTALL_HINT),
        },
    };
    Json(response)
}

/// Create the health routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/tool/refresh", get(refresh_tool).post(refresh_tool))
}
