// crates/server/src/routes/progress.rs
//! Per-job progress stream.
//!
//! - `GET /api/progress/{job_id}` - SSE stream of progress events
//!
//! The stream polls the job store instead of subscribing to the runner, so a
//! client may connect at any time (including after the job finished) and
//! always starts from the current state.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::header::{self, HeaderName};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::jobs::{Job, JobStatus, ProgressEvent};
use crate::state::AppState;

/// Delay between two reads of the job store.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Comment frames sent while nothing changes, so proxies keep the
/// connection open.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// What one poll of the store turns into.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamStep {
    /// Send `data`; close the stream afterwards when `done`.
    Emit { data: String, done: bool },
    /// Nothing changed since the last event.
    Wait,
}

/// Remembers the last emitted `(status, progress)` pair so unchanged polls
/// produce nothing.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last: Option<(JobStatus, u8)>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&mut self, job: Option<&Job>) -> StreamStep {
        let Some(job) = job else {
            return StreamStep::Emit {
                data: serde_json::json!({ "error": "Job not found" }).to_string(),
                done: true,
            };
        };

        let current = (job.status, job.progress);
        if self.last == Some(current) {
            return StreamStep::Wait;
        }
        self.last = Some(current);

        let event = ProgressEvent::from(job);
        StreamStep::Emit {
            data: serde_json::to_string(&event).unwrap_or_default(),
            done: job.status.is_terminal(),
        }
    }
}

/// Build the progress router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/progress/{job_id}", get(progress_stream))
}

/// GET /api/progress/{job_id} - stream progress until the job ends.
///
/// Every event is a bare `data:` frame carrying a JSON object. The final
/// event adds `filename`, `originalFilename` and `error`. An unknown id gets
/// a single `{"error": "Job not found"}` event.
async fn progress_stream(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let jobs = Arc::clone(&state.jobs);

    let stream = async_stream::stream! {
        let mut tracker = ProgressTracker::new();
        loop {
            match tracker.step(jobs.get(&job_id).as_ref()) {
                StreamStep::Emit { data, done } => {
                    yield Ok::<_, Infallible>(Event::default().data(data));
                    if done {
                        tracing::debug!(job_id = %job_id, "progress stream finished");
                        break;
                    }
                }
                StreamStep::Wait => {}
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    };

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)),
    )
}
