// crates/server/src/routes/download.rs
//! Download of converted files.
//!
//! - `GET /api/download/{filename}` - the PDF as an attachment

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use paperpress_core::naming;
use tokio_util::io::ReaderStream;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Build the download router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/download/{filename}", get(download))
}

/// GET /api/download/{filename} - stream a converted file.
///
/// The download name comes from, in order: the filename registry, the
/// in-memory job that produced the file, the storage name with its id
/// prefix removed, and finally `converted.pdf`.
async fn download(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    if !is_plain_filename(&filename) {
        return Err(ApiError::FileNotFound(filename));
    }

    let path = state.config.output_dir.join(&filename);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::FileNotFound(filename));
        }
        Err(e) => return Err(ApiError::Internal(format!("open {}: {e}", path.display()))),
    };
    let metadata = file
        .metadata()
        .await
        .map_err(|e| ApiError::Internal(format!("stat {}: {e}", path.display())))?;
    if !metadata.is_file() {
        return Err(ApiError::FileNotFound(filename));
    }

    let download_name = resolve_download_name(&state, &filename).await;
    tracing::info!(
        filename = %filename,
        download_name = %download_name,
        bytes = metadata.len(),
        "serving download"
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_LENGTH, metadata.len().to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&download_name)),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

async fn resolve_download_name(state: &AppState, storage_filename: &str) -> String {
    if let Some(name) = state.registry.get(storage_filename).await {
        return name;
    }
    if let Some(name) = state.jobs.find_original_filename(storage_filename) {
        return name;
    }
    naming::name_from_storage_filename(storage_filename)
}

/// A single path component that cannot leave the output directory.
fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
}

/// `attachment` header with an ASCII fallback plus the RFC 5987 UTF-8 name.
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(name)
    )
}
