// crates/server/src/routes/jobs.rs
//! API routes for conversion job inspection.
//!
//! - `GET /api/jobs` - list running conversion jobs

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

use crate::jobs::JobSnapshot;
use crate::state::AppState;

/// GET /api/jobs - List all running jobs, oldest first.
async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobSnapshot>> {
    Json(state.jobs.active())
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/jobs", get(list_jobs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use paperpress_core::ToolLocator;
    use tower::ServiceExt;

    async fn list(state: Arc<AppState>) -> Vec<serde_json::Value> {
        let app = router().with_state(state);
        let response = app
            .oneshot(Request::builder().uri("/jobs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_list_jobs_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = crate::state::test_state(dir.path(), ToolLocator::new(Vec::new()));
        assert!(list(state).await.is_empty());
    }

    #[tokio::test]
    async fn test_list_jobs_skips_finished() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = crate::state::test_state(dir.path(), ToolLocator::new(Vec::new()));
        state.jobs.create("running");
        state.jobs.set_progress("running", 42, "Converting... (16s)");
        state.jobs.create("done");
        state.jobs.complete("done", "done_a.pdf", "a.pdf");

        let jobs = list(state).await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0]["jobId"], "running");
        assert_eq!(jobs[0]["progress"], 42);
        assert_eq!(jobs[0]["status"], "running");
    }
}
