// Error types for the shellcache coordinator
// Author: kelexine (https://github.com/kelexine)

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Manifest fetch failed for {path}: {reason}")]
    ManifestFetchFailed { path: String, reason: String },

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Cache write failed for {bucket}: {reason}")]
    CacheWriteFailure { bucket: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No coordinator registered for origin {0}")]
    NotRegistered(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// Short machine-readable kind, used in error bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinatorError::ManifestFetchFailed { .. } => "manifest_fetch_failed",
            CoordinatorError::NetworkUnavailable(_) => "network_unavailable",
            CoordinatorError::CacheWriteFailure { .. } => "cache_write_failure",
            CoordinatorError::Config(_) | CoordinatorError::ConfigParsing(_) => "configuration_error",
            CoordinatorError::InvalidRequest(_) => "invalid_request_error",
            CoordinatorError::NotRegistered(_) => "not_registered",
            _ => "internal_error",
        }
    }
}

// Convert CoordinatorError to HTTP responses for Axum
impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let status = match &self {
            CoordinatorError::NetworkUnavailable(_) => StatusCode::GATEWAY_TIMEOUT,
            CoordinatorError::ManifestFetchFailed { .. } | CoordinatorError::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
            CoordinatorError::InvalidRequest(_) | CoordinatorError::Json(_) => StatusCode::BAD_REQUEST,
            CoordinatorError::NotRegistered(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = json!({
            "type": "error",
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
