// crates/server/src/routes/convert.rs
//! Upload endpoint that starts a conversion.
//!
//! - `POST /api/convert` - multipart upload (field `file`), returns the job id

use std::path::Path;
use std::sync::Arc;

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use paperpress_core::naming;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::{ApiError, ApiResult};
use crate::jobs::ConversionRequest;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ConvertResponse {
    pub job_id: String,
    pub message: String,
}

/// Build the convert router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/convert", post(convert))
}

/// POST /api/convert - validate the upload, save it and start the job.
///
/// Rejections happen before any job exists: missing or unnamed file (400),
/// wrong extension (400), conversion tool missing on a fresh probe (503),
/// upload not storable (500).
async fn convert(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<ConvertResponse>> {
    let mut field = loop {
        match multipart.next_field().await.map_err(multipart_error)? {
            Some(field) if field.name() == Some("file") => break field,
            Some(_) => continue,
            None => return Err(ApiError::BadRequest("No file uploaded".to_string())),
        }
    };

    let upload_name = field
        .file_name()
        .map(base_name)
        .unwrap_or_default()
        .to_string();
    if upload_name.is_empty() {
        return Err(ApiError::BadRequest("No file selected".to_string()));
    }
    if !naming::is_allowed_upload(&upload_name) {
        return Err(ApiError::UnsupportedFile(upload_name));
    }

    // Fresh probe: the user may have just installed or removed Calibre.
    if !state.tool.is_available(false).await {
        return Err(ApiError::ToolUnavailable);
    }

    let job_id = uuid::Uuid::new_v4().to_string();
    let input_name = naming::storage_filename(&job_id, &naming::sanitize_filename(&upload_name));
    let input_path = state.config.upload_dir.join(&input_name);

    let original_filename = naming::output_original_name(&upload_name);
    let storage_filename =
        naming::storage_filename(&job_id, &naming::sanitize_filename(&original_filename));
    let output_path = state.config.output_dir.join(&storage_filename);

    save_field(&mut field, &input_path).await?;
    tracing::debug!(
        job_id = %job_id,
        path = %input_path.display(),
        "upload saved"
    );

    let job_id = state.runner.submit(ConversionRequest {
        job_id,
        input_path,
        output_path,
        storage_filename,
        original_filename,
    });

    Ok(Json(ConvertResponse {
        job_id,
        message: "File uploaded, starting conversion...".to_string(),
    }))
}

/// Last path component; browsers normally send only that anyway.
fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name).trim()
}

/// Stream the field to `path`. A partial file is removed on error.
async fn save_field(field: &mut Field<'_>, path: &Path) -> ApiResult<()> {
    let result = async {
        let mut file = tokio::fs::File::create(path).await?;
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok::<(), ApiError>(())
    }
    .await;

    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove partial upload");
            }
        }
    }
    result
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(format!("Invalid upload: {}", e.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use paperpress_core::{ToolCommand, ToolLocator};
    use tower::ServiceExt;

    const BOUNDARY: &str = "paperpress-test-boundary";

    fn multipart_request(field_name: &str, filename: &str, content: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field_name}\"; filename=\"{filename}\"\r\nContent-Type: application/epub+zip\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/convert")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(state: Arc<AppState>, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let app = router().with_state(state);
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn missing_tool() -> ToolLocator {
        ToolLocator::new(vec![ToolCommand::new("/definitely/not/installed/ebook-convert")])
    }

    fn upload_count(dir: &Path) -> usize {
        std::fs::read_dir(dir.join("uploads")).unwrap().count()
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("book.epub"), "book.epub");
        assert_eq!(base_name("C:\\Users\\me\\book.epub"), "book.epub");
        assert_eq!(base_name("../../book.epub"), "book.epub");
    }

    #[tokio::test]
    async fn test_missing_file_field_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = crate::state::test_state(dir.path(), missing_tool());
        let (status, json) = send(state, multipart_request("other", "book.epub", b"x")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No file uploaded");
    }

    #[tokio::test]
    async fn test_empty_filename_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = crate::state::test_state(dir.path(), missing_tool());
        let (status, json) = send(state, multipart_request("file", "", b"x")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No file selected");
    }

    #[tokio::test]
    async fn test_wrong_extension_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = crate::state::test_state(dir.path(), missing_tool());
        let (status, json) = send(state, multipart_request("file", "notes.txt", b"x")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("EPUB"));
        assert_eq!(upload_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_tool_is_rejected_without_creating_a_job() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = crate::state::test_state(dir.path(), missing_tool());
        let (status, json) = send(
            Arc::clone(&state),
            multipart_request("file", "book.epub", b"x"),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"], "Calibre is not installed");
        assert!(state.jobs.is_empty());
        assert_eq!(upload_count(dir.path()), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_accepted_upload_creates_job() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("fake-convert.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then exit 0; fi\nsleep 1\necho pdf > \"$2\"\n",
        )
        .unwrap();
        let tool = ToolCommand::new("sh").arg(script.to_string_lossy().into_owned());
        let state = crate::state::test_state(dir.path(), ToolLocator::new(vec![tool]));

        let (status, json) = send(
            Arc::clone(&state),
            multipart_request("file", "My Book.epub", b"epub bytes"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let job_id = json["jobId"].as_str().unwrap();
        assert_eq!(job_id.len(), 36);
        assert!(state.jobs.get(job_id).is_some());

        let saved = dir
            .path()
            .join("uploads")
            .join(format!("{job_id}_My_Book.epub"));
        assert!(saved.exists() || state.jobs.get(job_id).unwrap().status.is_terminal());
    }
}
