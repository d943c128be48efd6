// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes.
///
/// These cover requests rejected before a job exists. Failures during a
/// conversion never surface here; they land in the job record.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unsupported file: {0}")]
    UnsupportedFile(String),

    #[error("Upload exceeds the size limit")]
    PayloadTooLarge,

    #[error("Conversion tool unavailable")]
    ToolUnavailable,

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Advice shown when the conversion tool is missing.
pub const TOOL_INSTALL_HINT: &str = "Install Calibre (macOS: brew install calibre, \
     or https://calibre-ebook.com/download), then refresh the tool status or restart the server.";

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, ErrorResponse::new(msg.clone()))
            }
            ApiError::UnsupportedFile(name) => {
                tracing::warn!(filename = %name, "Unsupported upload");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details(
                        "Unsupported file format, please upload an EPUB file",
                        format!("Filename: {name}"),
                    ),
                )
            }
            ApiError::PayloadTooLarge => {
                tracing::warn!("Upload rejected: body limit exceeded");
                (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    ErrorResponse::new("File too large"),
                )
            }
            ApiError::ToolUnavailable => {
                tracing::warn!("Upload rejected: conversion tool not installed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorResponse::with_details("Calibre is not installed", TOOL_INSTALL_HINT),
                )
            }
            ApiError::FileNotFound(name) => {
                tracing::warn!(filename = %name, "File not found");
                (StatusCode::NOT_FOUND, ErrorResponse::new("File not found"))
            }
            ApiError::Storage(err) => {
                tracing::error!(error = %err, "Failed to store upload");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Failed to save file", err.to_string()),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
