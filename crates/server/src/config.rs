// crates/server/src/config.rs
//! Server configuration, read from the environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use paperpress_core::ToolCommand;

/// Default port for the server.
pub const DEFAULT_PORT: u16 = 8080;

/// Default upload limit in megabytes.
pub const DEFAULT_MAX_UPLOAD_MB: usize = 100;

/// Default hard limit on one conversion.
pub const DEFAULT_CONVERSION_TIMEOUT: Duration = Duration::from_secs(600);

/// Default retention of finished jobs in memory.
pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Uploaded inputs, deleted once their job ends.
    pub upload_dir: PathBuf,
    /// Converted outputs served for download.
    pub output_dir: PathBuf,
    /// JSON file backing the filename registry.
    pub registry_path: PathBuf,
    /// Tool probed before the standard install locations.
    pub tool_override: Option<ToolCommand>,
    pub max_upload_bytes: usize,
    pub conversion_timeout: Duration,
    /// How long finished jobs stay queryable; `None` keeps them forever.
    pub job_ttl: Option<Duration>,
    /// Frontend files served at `/`, if any.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("outputs"),
            registry_path: PathBuf::from("filename_mapping.json"),
            tool_override: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            conversion_timeout: DEFAULT_CONVERSION_TIMEOUT,
            job_ttl: Some(DEFAULT_JOB_TTL),
            static_dir: None,
        }
    }
}

impl ServerConfig {
    /// Build from `PAPERPRESS_*` variables, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse_u64 = |key: &str| get(key).and_then(|v| v.trim().parse::<u64>().ok());

        let port = get("PAPERPRESS_PORT")
            .or_else(|| get("PORT"))
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(defaults.port);

        let job_ttl = match parse_u64("PAPERPRESS_JOB_TTL_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.job_ttl,
        };

        Self {
            host: get("PAPERPRESS_HOST")
                .and_then(|h| h.trim().parse().ok())
                .unwrap_or(defaults.host),
            port,
            upload_dir: get("PAPERPRESS_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            output_dir: get("PAPERPRESS_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            registry_path: get("PAPERPRESS_REGISTRY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.registry_path),
            tool_override: get("PAPERPRESS_TOOL").and_then(|t| ToolCommand::parse(&t)),
            max_upload_bytes: parse_u64("PAPERPRESS_MAX_UPLOAD_MB")
                .map(|mb| {
                    usize::try_from(mb)
                        .unwrap_or(usize::MAX)
                        .saturating_mul(1024 * 1024)
                })
                .unwrap_or(defaults.max_upload_bytes),
            conversion_timeout: parse_u64("PAPERPRESS_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.conversion_timeout),
            job_ttl,
            static_dir: get_static_dir(get("STATIC_DIR")),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Priority:
/// 1. STATIC_DIR environment variable (explicit override)
/// 2. ./static directory (if it exists)
/// 3. None (API-only mode)
fn get_static_dir(explicit: Option<String>) -> Option<PathBuf> {
    explicit.map(PathBuf::from).or_else(|| {
        let dir = PathBuf::from("static");
        dir.exists().then_some(dir)
    })
}
