//! JSON bodies exchanged between the file access service and its clients.

use serde::{Deserialize, Serialize};

use crate::record::LogRecord;

/// Body of `GET /api/logs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsResponse {
    /// Records newest first.
    pub records: Vec<LogRecord>,
    /// Freshness marker of the file the records were read from.
    pub last_modified: u64,
}

/// Body of `GET /api/logs/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Modification time of the file in milliseconds since the epoch.
    pub last_modified: u64,
}

/// Body of every non-2xx JSON response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason.
    pub error: String,
}

/// Query string of the log routes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileQuery {
    /// Log file, relative to the log root or absolute.
    pub file: Option<String>,
}

/// Query string of the image route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageQuery {
    /// Image reference as written in a record.
    pub path: Option<String>,
}
