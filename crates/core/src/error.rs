// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while running one conversion.
///
/// The `Display` text is what ends up in the job record, so every variant
/// renders as a sentence a user can read.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Conversion tool not found; install Calibre or set PAPERPRESS_TOOL")]
    ToolNotFound,

    #[error("Failed to start the conversion tool: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Error while reading conversion output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Conversion failed: {output}")]
    ToolFailed { code: Option<i32>, output: String },

    #[error("Conversion timed out after {secs} seconds; the file may be too large or too complex")]
    Timeout { secs: u64 },
}

impl ConvertError {
    /// Outcome label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            _ => "failed",
        }
    }
}

/// Errors from the durable filename registry. Callers of the public
/// registry API never see these; they are logged and swallowed.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("IO error on registry file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed registry file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
