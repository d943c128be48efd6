// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use paperpress_core::{FilenameRegistry, ToolLocator};

use crate::config::ServerConfig;
use crate::jobs::{JobRunner, JobStore, RunnerSettings};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    pub config: ServerConfig,
    /// In-memory job table, shared with the runner.
    pub jobs: Arc<JobStore>,
    /// Starts conversions in the background.
    pub runner: JobRunner,
    /// Durable storage-name to download-name table.
    pub registry: Arc<FilenameRegistry>,
    /// Cached conversion tool lookup.
    pub tool: Arc<ToolLocator>,
}

impl AppState {
    /// Build state from config, locating the tool with the standard
    /// candidates (plus the configured override, probed first).
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let tool = match &config.tool_override {
            Some(preferred) => ToolLocator::with_preferred(preferred.clone()),
            None => ToolLocator::default(),
        };
        Self::with_tool(config, tool)
    }

    /// Build state with an explicit tool locator (for testing).
    pub fn with_tool(config: ServerConfig, tool: ToolLocator) -> Arc<Self> {
        let jobs = Arc::new(JobStore::new());
        let registry = Arc::new(FilenameRegistry::new(config.registry_path.clone()));
        let tool = Arc::new(tool);
        let settings = RunnerSettings {
            max_duration: config.conversion_timeout,
            ..RunnerSettings::default()
        };
        let runner = JobRunner::new(
            Arc::clone(&jobs),
            Arc::clone(&registry),
            Arc::clone(&tool),
            settings,
        );

        Arc::new(Self {
            start_time: Instant::now(),
            config,
            jobs,
            runner,
            registry,
            tool,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// State rooted in `dir`, with uploads, outputs and the registry inside it.
#[cfg(test)]
pub(crate) fn test_state(dir: &std::path::Path, tool: ToolLocator) -> Arc<AppState> {
    let upload_dir = dir.join("uploads");
    let output_dir = dir.join("outputs");
    std::fs::create_dir_all(&upload_dir).unwrap();
    std::fs::create_dir_all(&output_dir).unwrap();
    let config = ServerConfig {
        upload_dir,
        output_dir,
        registry_path: dir.join("filename_mapping.json"),
        static_dir: None,
        ..ServerConfig::default()
    };
    AppState::with_tool(config, tool)
}
