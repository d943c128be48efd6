// crates/server/src/jobs/types.rs
//! Types for the conversion job system.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Unique identifier for a conversion job (uuid v4, hyphenated).
pub type JobId = String;

/// Status of a conversion job. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One conversion attempt as held in the job store.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    /// When execution began; drives estimation and the timeout.
    pub started_at: Instant,
    /// Wall-clock twin of `started_at`, for display.
    pub started_at_utc: DateTime<Utc>,
    /// When the job reached a terminal status.
    pub finished_at: Option<Instant>,
    /// Storage filename of the produced PDF (success only).
    pub filename: Option<String>,
    /// Name presented on download (success only).
    pub original_filename: Option<String>,
}

impl Job {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Running,
            progress: 0,
            message: "Preparing conversion...".to_string(),
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
            finished_at: None,
            filename: None,
            original_filename: None,
        }
    }

    pub fn apply(&mut self, update: JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
            if status.is_terminal() {
                self.finished_at = Some(Instant::now());
            }
        }
        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        if let Some(message) = update.message {
            self.message = message;
        }
        if let Some(filename) = update.filename {
            self.filename = Some(filename);
        }
        if let Some(original) = update.original_filename {
            self.original_filename = Some(original);
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            started_at: self.started_at_utc.to_rfc3339(),
        }
    }
}

/// Partial update to a job. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub filename: Option<String>,
    pub original_filename: Option<String>,
}

impl JobUpdate {
    pub fn progress(progress: u8, message: impl Into<String>) -> Self {
        Self {
            progress: Some(progress),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn completed(filename: impl Into<String>, original_filename: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            message: Some("Conversion complete!".to_string()),
            filename: Some(filename.into()),
            original_filename: Some(original_filename.into()),
        }
    }

    /// Progress is deliberately left at its last value.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Job summary returned by the job listing endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub started_at: String,
}

/// One event on the progress stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(flatten)]
    pub outcome: Option<JobOutcome>,
}

/// Fields only present on the final event of a stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub filename: Option<String>,
    pub original_filename: Option<String>,
    pub error: Option<String>,
}

impl From<&Job> for ProgressEvent {
    fn from(job: &Job) -> Self {
        let outcome = job.status.is_terminal().then(|| JobOutcome {
            filename: job.filename.clone(),
            original_filename: job.original_filename.clone(),
            error: (job.status == JobStatus::Failed).then(|| job.message.clone()),
        });
        Self {
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_strings() {
        assert_eq!(JobStatus::Running.as_str(), "running");
        assert_eq!(JobStatus::Completed.as_str(), "completed");
        assert_eq!(JobStatus::Failed.as_str(), "failed");
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_failed_update_keeps_progress() {
        let mut job = Job::new("j1".to_string());
        job.apply(JobUpdate::progress(42, "Converting... (12s)"));
        job.apply(JobUpdate::failed("Conversion failed: boom"));
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 42);
        assert_eq!(job.message, "Conversion failed: boom");
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_completed_update_sets_everything() {
        let mut job = Job::new("j1".to_string());
        job.apply(JobUpdate::completed("j1_book.pdf", "Book.pdf"));
        assert_eq!(job.progress, 100);
        assert_eq!(job.filename.as_deref(), Some("j1_book.pdf"));
        assert_eq!(job.original_filename.as_deref(), Some("Book.pdf"));
    }

    #[test]
    fn test_running_event_has_no_outcome_fields() {
        let mut job = Job::new("j1".to_string());
        job.apply(JobUpdate::progress(20, "Processing cover..."));
        let json = serde_json::to_value(ProgressEvent::from(&job)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "running",
                "progress": 20,
                "message": "Processing cover...",
            })
        );
    }

    #[test]
    fn test_completed_event_serialize() {
        let mut job = Job::new("j1".to_string());
        job.apply(JobUpdate::completed("j1_book.pdf", "Book.pdf"));
        let json = serde_json::to_value(ProgressEvent::from(&job)).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["progress"], 100);
        assert_eq!(json["filename"], "j1_book.pdf");
        assert_eq!(json["originalFilename"], "Book.pdf");
        assert!(json["error"].is_null());
    }

    #[test]
    fn test_failed_event_serialize() {
        let mut job = Job::new("j1".to_string());
        job.apply(JobUpdate::failed("Conversion failed: boom"));
        let json = serde_json::to_value(ProgressEvent::from(&job)).unwrap();
        assert_eq!(json["status"], "failed");
        assert!(json["filename"].is_null());
        assert!(json["originalFilename"].is_null());
        assert_eq!(json["error"], "Conversion failed: boom");
    }

    #[test]
    fn test_snapshot_serialize() {
        let job = Job::new("j1".to_string());
        let json = serde_json::to_string(&job.snapshot()).unwrap();
        assert!(json.contains("\"jobId\":\"j1\""));
        assert!(json.contains("\"status\":\"running\""));
        assert!(json.contains("\"startedAt\""));
    }
}
