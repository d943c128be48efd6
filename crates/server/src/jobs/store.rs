// crates/server/src/jobs/store.rs
//! In-memory table of conversion jobs.
//!
//! Each job has exactly one writer (its runner task) and any number of
//! readers (progress streams, the download path). Writes replace the whole
//! record under the write lock and reads clone it, so a reader never sees a
//! half-applied update.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::types::{Job, JobId, JobSnapshot, JobStatus, JobUpdate};

/// How often the eviction sweeper runs.
pub const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh running job, replacing nothing: ids are unique.
    pub fn create(&self, id: impl Into<JobId>) -> Job {
        let job = Job::new(id.into());
        match self.jobs.write() {
            Ok(mut jobs) => {
                jobs.insert(job.id.clone(), job.clone());
            }
            Err(e) => tracing::error!("RwLock poisoned writing jobs map: {e}"),
        }
        crate::metrics::record_jobs_tracked(self.len());
        job
    }

    /// Apply `update` to job `id`. Returns false when the job is unknown or
    /// already terminal; terminal jobs never change again.
    pub fn update(&self, id: &str, update: JobUpdate) -> bool {
        let mut jobs = match self.jobs.write() {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!("RwLock poisoned writing jobs map: {e}");
                return false;
            }
        };
        let Some(job) = jobs.get_mut(id) else {
            tracing::warn!(job_id = id, "update for unknown job ignored");
            return false;
        };
        if job.status.is_terminal() {
            tracing::warn!(
                job_id = id,
                status = job.status.as_str(),
                "update for finished job ignored"
            );
            return false;
        }

        let mut next = job.clone();
        next.apply(update);
        *job = next;
        true
    }

    /// Progress-only update.
    pub fn set_progress(&self, id: &str, progress: u8, message: impl Into<String>) -> bool {
        self.update(id, JobUpdate::progress(progress, message))
    }

    pub fn complete(&self, id: &str, filename: &str, original_filename: &str) -> bool {
        self.update(id, JobUpdate::completed(filename, original_filename))
    }

    pub fn fail(&self, id: &str, message: impl Into<String>) -> bool {
        self.update(id, JobUpdate::failed(message))
    }

    /// Snapshot of job `id`.
    pub fn get(&self, id: &str) -> Option<Job> {
        match self.jobs.read() {
            Ok(jobs) => jobs.get(id).cloned(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs map: {e}");
                None
            }
        }
    }

    /// Original filename of the completed job that produced `storage_filename`.
    pub fn find_original_filename(&self, storage_filename: &str) -> Option<String> {
        match self.jobs.read() {
            Ok(jobs) => jobs
                .values()
                .find(|job| job.filename.as_deref() == Some(storage_filename))
                .and_then(|job| job.original_filename.clone()),
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs map: {e}");
                None
            }
        }
    }

    /// All jobs that are still running, oldest first.
    pub fn active(&self) -> Vec<JobSnapshot> {
        match self.jobs.read() {
            Ok(jobs) => {
                let mut running: Vec<&Job> = jobs
                    .values()
                    .filter(|job| job.status == JobStatus::Running)
                    .collect();
                running.sort_by_key(|job| job.started_at);
                running.into_iter().map(Job::snapshot).collect()
            }
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs: {e}");
                Vec::new()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop jobs that finished more than `ttl` ago. Running jobs are never
    /// evicted. Returns how many were removed.
    pub fn evict_finished(&self, ttl: Duration) -> usize {
        self.evict_finished_at(Instant::now(), ttl)
    }

    fn evict_finished_at(&self, now: Instant, ttl: Duration) -> usize {
        let removed = match self.jobs.write() {
            Ok(mut jobs) => {
                let before = jobs.len();
                jobs.retain(|_, job| match job.finished_at {
                    Some(finished) => now.saturating_duration_since(finished) < ttl,
                    None => true,
                });
                before - jobs.len()
            }
            Err(e) => {
                tracing::error!("RwLock poisoned writing jobs map: {e}");
                0
            }
        };
        crate::metrics::record_jobs_tracked(self.len());
        removed
    }
}

/// Periodically evict finished jobs older than `ttl`.
pub fn spawn_eviction_task(store: Arc<JobStore>, ttl: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            interval.tick().await;
            let removed = store.evict_finished(ttl);
            if removed > 0 {
                tracing::debug!(removed, remaining = store.len(), "evicted finished jobs");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get() {
        let store = JobStore::new();
        let job = store.create("j1");
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.progress, 0);

        let fetched = store.get("j1").unwrap();
        assert_eq!(fetched.id, "j1");
        assert!(store.get("nope").is_none());
    }

    #[test]
    fn test_update_progress() {
        let store = JobStore::new();
        store.create("j1");
        assert!(store.set_progress("j1", 35, "Processing images and content... (12s)"));

        let job = store.get("j1").unwrap();
        assert_eq!(job.progress, 35);
        assert_eq!(job.message, "Processing images and content... (12s)");
    }

    #[test]
    fn test_update_unknown_job_is_ignored() {
        let store = JobStore::new();
        assert!(!store.set_progress("ghost", 10, "x"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_terminal_state_is_immutable() {
        let store = JobStore::new();
        store.create("j1");
        store.set_progress("j1", 60, "Converting...");
        assert!(store.complete("j1", "j1_book.pdf", "Book.pdf"));

        assert!(!store.fail("j1", "late failure"));
        assert!(!store.set_progress("j1", 10, "late progress"));
        assert!(!store.complete("j1", "other.pdf", "Other.pdf"));

        let job = store.get("j1").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.filename.as_deref(), Some("j1_book.pdf"));
    }

    #[test]
    fn test_failure_keeps_last_progress() {
        let store = JobStore::new();
        store.create("j1");
        store.set_progress("j1", 47, "Converting...");
        store.fail("j1", "Conversion failed: bad input");

        let job = store.get("j1").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 47);
    }

    #[test]
    fn test_jobs_are_isolated() {
        let store = JobStore::new();
        store.create("a");
        store.create("b");
        store.set_progress("a", 20, "Processing cover...");
        store.set_progress("b", 74, "Generating PDF... (20s)");

        let a = store.get("a").unwrap();
        let b = store.get("b").unwrap();
        assert_eq!((a.progress, a.message.as_str()), (20, "Processing cover..."));
        assert_eq!((b.progress, b.message.as_str()), (74, "Generating PDF... (20s)"));
    }

    #[test]
    fn test_concurrent_writers_do_not_cross_contaminate() {
        let store = Arc::new(JobStore::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let id = format!("job-{i}");
                    store.create(id.clone());
                    for p in 0..=50u8 {
                        store.set_progress(&id, p, format!("job {i} at {p}"));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        for i in 0..8 {
            let job = store.get(&format!("job-{i}")).unwrap();
            assert_eq!(job.progress, 50);
            assert_eq!(job.message, format!("job {i} at 50"));
        }
    }

    #[test]
    fn test_find_original_filename() {
        let store = JobStore::new();
        store.create("j1");
        store.complete("j1", "j1_book.pdf", "My Book.pdf");
        assert_eq!(
            store.find_original_filename("j1_book.pdf").as_deref(),
            Some("My Book.pdf")
        );
        assert!(store.find_original_filename("j2_book.pdf").is_none());
    }

    #[test]
    fn test_active_lists_only_running_jobs() {
        let store = JobStore::new();
        store.create("a");
        store.create("b");
        store.fail("b", "nope");
        let active = store.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].job_id, "a");
    }

    #[test]
    fn test_eviction_only_removes_old_finished_jobs() {
        let store = JobStore::new();
        store.create("running");
        store.create("done");
        store.complete("done", "done_x.pdf", "x.pdf");

        // Not old enough yet.
        assert_eq!(store.evict_finished(Duration::from_secs(60)), 0);

        let later = Instant::now() + Duration::from_secs(120);
        assert_eq!(store.evict_finished_at(later, Duration::from_secs(60)), 1);
        assert!(store.get("done").is_none());
        assert!(store.get("running").is_some());
    }
}
