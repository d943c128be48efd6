// crates/server/src/jobs/runner.rs
//! Background execution of conversion jobs.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use paperpress_core::converter::{self, ConversionProcess};
use paperpress_core::{
    ConversionOptions, ConvertError, FilenameRegistry, ProgressEstimator, ToolLocator,
    UpdateThrottle,
};

use super::store::JobStore;
use super::types::JobId;
use crate::metrics;

/// Output lines kept for the failure message.
const TAIL_LINES: usize = 10;

/// Maximum characters of tool output in a failure message.
const FAILURE_OUTPUT_CHARS: usize = 100;

/// Tunables for every conversion the runner starts.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Hard limit on one conversion, measured from job creation.
    pub max_duration: Duration,
    pub line_interval: Duration,
    pub idle_interval: Duration,
    pub options: ConversionOptions,
    pub estimator: ProgressEstimator,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            max_duration: crate::config::DEFAULT_CONVERSION_TIMEOUT,
            line_interval: UpdateThrottle::DEFAULT_LINE_INTERVAL,
            idle_interval: UpdateThrottle::DEFAULT_IDLE_INTERVAL,
            options: ConversionOptions::default(),
            estimator: ProgressEstimator::default(),
        }
    }
}

/// Everything the background task needs to know about one upload.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub job_id: JobId,
    /// Saved upload; deleted when the job ends either way.
    pub input_path: PathBuf,
    /// Where the tool writes the PDF; deleted on failure.
    pub output_path: PathBuf,
    /// Name of `output_path` inside the output directory.
    pub storage_filename: String,
    /// Name the client gets on download.
    pub original_filename: String,
}

/// Starts conversions in the background and reports them into the
/// [`JobStore`].
///
/// Cheap to clone; every clone shares the same store, registry and tool
/// cache.
#[derive(Clone)]
pub struct JobRunner {
    store: Arc<JobStore>,
    registry: Arc<FilenameRegistry>,
    tool: Arc<ToolLocator>,
    settings: Arc<RunnerSettings>,
}

impl JobRunner {
    pub fn new(
        store: Arc<JobStore>,
        registry: Arc<FilenameRegistry>,
        tool: Arc<ToolLocator>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            store,
            registry,
            tool,
            settings: Arc::new(settings),
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Register the job and start converting it. Returns immediately; the
    /// job is already visible in the store when this returns.
    pub fn submit(&self, request: ConversionRequest) -> JobId {
        let job = self.store.create(request.job_id.clone());
        metrics::record_conversion_started();
        tracing::info!(
            job_id = %job.id,
            input = %request.input_path.display(),
            "conversion job submitted"
        );

        let runner = self.clone();
        let started_at = job.started_at;
        tokio::spawn(async move { runner.run(request, started_at).await });
        job.id
    }

    async fn run(self, request: ConversionRequest, started_at: Instant) {
        // The conversion runs in its own task so a panic there still ends
        // the job instead of leaving it running forever.
        let worker = {
            let runner = self.clone();
            let request = request.clone();
            tokio::spawn(async move { runner.convert(&request, started_at).await })
        };
        let result = match worker.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err((e.kind(), e.to_string())),
            Err(e) => {
                tracing::error!(job_id = %request.job_id, error = %e, "conversion task aborted");
                Err(("failed", format!("Conversion error: {e}")))
            }
        };

        let elapsed = started_at.elapsed();
        match result {
            Ok(()) => {
                // Files and registry settle before the terminal state is
                // visible to progress streams.
                remove_if_exists(&request.input_path).await;
                self.registry
                    .put(&request.storage_filename, &request.original_filename)
                    .await;
                self.store.complete(
                    &request.job_id,
                    &request.storage_filename,
                    &request.original_filename,
                );
                metrics::record_conversion_finished("completed", elapsed);
                tracing::info!(
                    job_id = %request.job_id,
                    filename = %request.storage_filename,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "conversion completed"
                );
            }
            Err((outcome, message)) => {
                tracing::warn!(
                    job_id = %request.job_id,
                    outcome,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "conversion failed: {message}"
                );
                remove_if_exists(&request.output_path).await;
                remove_if_exists(&request.input_path).await;
                self.store.fail(&request.job_id, message);
                metrics::record_conversion_finished(outcome, elapsed);
            }
        }
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
        started_at: Instant,
    ) -> Result<(), ConvertError> {
        let job_id = request.job_id.as_str();
        self.store
            .set_progress(job_id, 10, "Parsing EPUB structure...");

        let tool = self.tool.resolved().await.ok_or(ConvertError::ToolNotFound)?;
        let mut process = converter::invoke(
            &tool,
            &request.input_path,
            &request.output_path,
            &self.settings.options,
        )?;
        tracing::debug!(job_id, pid = ?process.id(), "conversion process started");

        let deadline = started_at + self.settings.max_duration;
        let mut throttle = UpdateThrottle::new(
            started_at,
            self.settings.line_interval,
            self.settings.idle_interval,
        );
        let mut tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);

        loop {
            let now = Instant::now();
            let remaining = deadline.saturating_duration_since(now);
            if remaining.is_zero() {
                return Err(self.time_out(job_id, &mut process).await);
            }

            match tokio::time::timeout(remaining.min(throttle.idle_interval()), process.next_line())
                .await
            {
                Ok(Some(Ok(line))) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if tail.len() == TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line.to_string());

                    let now = Instant::now();
                    if throttle.line_due(now) {
                        let estimate = self
                            .settings
                            .estimator
                            .on_output(now.saturating_duration_since(started_at), line);
                        self.store
                            .set_progress(job_id, estimate.progress, estimate.message);
                        throttle.mark(now);
                    }
                }
                Ok(Some(Err(e))) => {
                    if let Err(kill_err) = process.kill().await {
                        tracing::warn!(job_id, error = %kill_err, "failed to kill conversion process");
                    }
                    return Err(ConvertError::Io(e));
                }
                Ok(None) => break,
                Err(_) => {
                    let now = Instant::now();
                    if throttle.idle_due(now) {
                        let estimate = self
                            .settings
                            .estimator
                            .on_idle(now.saturating_duration_since(started_at));
                        self.store
                            .set_progress(job_id, estimate.progress, estimate.message);
                        throttle.mark(now);
                    }
                }
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let status = match tokio::time::timeout(remaining, process.wait()).await {
            Ok(status) => status?,
            Err(_) => return Err(self.time_out(job_id, &mut process).await),
        };
        tracing::debug!(job_id, exit_code = ?status.code(), "conversion process exited");

        if !status.success() {
            return Err(ConvertError::ToolFailed {
                code: status.code(),
                output: failure_output(&tail),
            });
        }
        if !tokio::fs::try_exists(&request.output_path).await? {
            return Err(ConvertError::ToolFailed {
                code: status.code(),
                output: "the tool produced no output file".to_string(),
            });
        }
        Ok(())
    }

    async fn time_out(&self, job_id: &str, process: &mut ConversionProcess) -> ConvertError {
        if let Err(e) = process.kill().await {
            tracing::warn!(job_id, error = %e, "failed to kill timed out conversion");
        }
        ConvertError::Timeout {
            secs: self.settings.max_duration.as_secs(),
        }
    }
}

/// Last output lines joined and cut to [`FAILURE_OUTPUT_CHARS`].
fn failure_output(tail: &VecDeque<String>) -> String {
    let joined = tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n");
    if joined.is_empty() {
        return "unknown error".to_string();
    }
    joined.chars().take(FAILURE_OUTPUT_CHARS).collect()
}

async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove file"),
    }
}
