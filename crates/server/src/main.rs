// crates/server/src/main.rs
//! Paperpress server binary.
//!
//! Reads configuration from the environment, prepares the storage
//! directories, checks for the conversion tool and serves the API.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use paperpress_server::{create_app, init_metrics, spawn_eviction_task, AppState, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,paperpress_server=info,paperpress_core=info".into()),
        )
        .init();

    init_metrics();

    let config = ServerConfig::from_env();
    for dir in [&config.upload_dir, &config.output_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }

    let addr = config.addr();
    let job_ttl = config.job_ttl;
    let state = AppState::new(config);

    if !state.tool.is_available(false).await {
        tracing::warn!(
            "ebook-convert not found; uploads will be rejected until Calibre is installed \
             (macOS: brew install calibre, or https://calibre-ebook.com/download) \
             or PAPERPRESS_TOOL is set"
        );
    }

    if let Some(ttl) = job_ttl {
        spawn_eviction_task(state.jobs.clone(), ttl);
    }

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "paperpress listening on http://{addr}"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
