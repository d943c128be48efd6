// crates/server/src/jobs/mod.rs
//! Conversion job system.
//!
//! Provides:
//! - `JobStore` - in-memory job table, one writer per job and many readers
//! - `JobRunner` - spawns conversions and reports into the store
//! - `Job` / `ProgressEvent` - records and the events streamed to clients

pub mod runner;
pub mod store;
pub mod types;

pub use runner::{ConversionRequest, JobRunner, RunnerSettings};
pub use store::{spawn_eviction_task, JobStore};
pub use types::{Job, JobId, JobOutcome, JobSnapshot, JobStatus, JobUpdate, ProgressEvent};
