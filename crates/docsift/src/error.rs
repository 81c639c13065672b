//! Error types for docsift
//!
//! Two layers live here:
//! - [`Error`]: crate-level failures (configuration, database, I/O, control requests)
//! - [`PipelineError`]: the closed per-item taxonomy recorded on failed queue items

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::processing::{ControlAction, RunState};

/// Result type alias for docsift operations
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// A control request that the current run state does not allow
    #[error("Cannot {action} while {state}")]
    InvalidTransition { state: RunState, action: ControlAction },

    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed API request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::Config(_) => (StatusCode::BAD_REQUEST, "config_error"),
            Error::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            Error::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            Error::Json(_) => (StatusCode::BAD_REQUEST, "json_error"),
            Error::Toml(_) => (StatusCode::BAD_REQUEST, "toml_error"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "http_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Kinds of per-item pipeline failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedKind,
    ReadFailure,
    OcrFailure,
    ClassificationFailure,
    DescriptionFailure,
    AdapterUnreachable,
    AdapterTimeout,
    PersistenceFailure,
    UnexpectedError,
}

impl ErrorKind {
    /// Stable code stored on failed queue items
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedKind => "unsupported_kind",
            ErrorKind::ReadFailure => "read_failure",
            ErrorKind::OcrFailure => "ocr_failure",
            ErrorKind::ClassificationFailure => "classification_failure",
            ErrorKind::DescriptionFailure => "description_failure",
            ErrorKind::AdapterUnreachable => "adapter_unreachable",
            ErrorKind::AdapterTimeout => "adapter_timeout",
            ErrorKind::PersistenceFailure => "persistence_failure",
            ErrorKind::UnexpectedError => "unexpected_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A typed failure of one queue item
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Wrap anything that escaped the typed taxonomy
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::UnexpectedError,
            format!("processing error: {}", message.into()),
        )
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PersistenceFailure, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_snake_case() {
        assert_eq!(ErrorKind::AdapterUnreachable.code(), "adapter_unreachable");
        assert_eq!(
            serde_json::to_string(&ErrorKind::PersistenceFailure).unwrap(),
            "\"persistence_failure\""
        );
    }

    #[test]
    fn test_unexpected_wraps_message() {
        let err = PipelineError::unexpected("index out of bounds");
        assert_eq!(err.kind, ErrorKind::UnexpectedError);
        assert_eq!(err.message, "processing error: index out of bounds");
        assert_eq!(
            err.to_string(),
            "unexpected_error: processing error: index out of bounds"
        );
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = Error::InvalidTransition {
            state: RunState::Idle,
            action: ControlAction::Pause,
        };
        assert_eq!(err.to_string(), "Cannot pause while idle");
    }
}
