//! Error taxonomy of the file access service.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use impview_common::ErrorBody;
use std::io;
use tracing::error;

/// Result type alias
pub type Result<T> = std::result::Result<T, AccessError>;

/// Why a file or image request failed.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// A required query parameter is absent or empty.
    #[error("{0} parameter is required")]
    MissingParameter(&'static str),

    /// The query string does not parse, e.g. a parameter given twice.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The resolved path escapes every allowed root.
    #[error("Access denied")]
    AccessDenied {
        /// Path as requested.
        path: String,
    },

    /// Nothing readable exists at the resolved path.
    #[error("Not found: {path}")]
    NotFound {
        /// Path as requested.
        path: String,
    },

    /// The file is not a JSON array of log records.
    #[error("Malformed log file {path}: {detail}")]
    MalformedContent {
        /// Path as requested.
        path: String,
        /// Parser message with a preview around the failure.
        detail: String,
    },

    /// Any other read failure.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path as requested.
        path: String,
        /// Underlying failure; logged, never sent to the client.
        #[source]
        source: io::Error,
    },
}

impl AccessError {
    /// Classify an I/O error for `path`.
    pub fn from_io(path: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            AccessError::NotFound {
                path: path.to_string(),
            }
        } else {
            AccessError::Io {
                path: path.to_string(),
                source,
            }
        }
    }

    /// HTTP status sent for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AccessError::MissingParameter(_) | AccessError::InvalidQuery(_) => {
                StatusCode::BAD_REQUEST
            }
            AccessError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            AccessError::NotFound { .. } => StatusCode::NOT_FOUND,
            AccessError::MalformedContent { .. } | AccessError::Io { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AccessError::Io { path, .. } => {
                error!(error = %self, "I/O failure while serving request");
                format!("Failed to read {path}")
            }
            _ => self.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
