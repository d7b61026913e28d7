//! Shared types and utilities for impview
//!
//! This crate contains the log record model and the HTTP wire types used by
//! both the `impview-server` file access service and the `impview` client.

pub mod logging;
pub mod record;
pub mod wire;

use std::fs::Metadata;
use std::time::UNIX_EPOCH;

// Re-export commonly used types
pub use record::{ApiCall, Event, LogRecord, Mood, Problem};
pub use wire::{ErrorBody, FileQuery, ImageQuery, LogsResponse, StatusResponse};

/// Default port of the file access service.
pub const DEFAULT_PORT: u16 = 3001;

/// Default host the service binds to and the client connects to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Route serving a parsed log file.
pub const LOGS_ROUTE: &str = "/api/logs";

/// Route serving only the freshness marker of a log file.
pub const STATUS_ROUTE: &str = "/api/logs/status";

/// Route serving image bytes referenced by records.
pub const IMAGE_ROUTE: &str = "/api/image";

/// Liveness route.
pub const HEALTH_ROUTE: &str = "/health";

/// Freshness marker of a file: modification time in milliseconds since the
/// Unix epoch.
///
/// Filesystems with coarse timestamps make two writes inside one resolution
/// unit indistinguishable.
pub fn modified_millis(metadata: &Metadata) -> Result<u64, String> {
    let modified = metadata
        .modified()
        .map_err(|e| format!("Modification time unavailable: {e}"))?;
    let since_epoch = modified
        .duration_since(UNIX_EPOCH)
        .map_err(|e| format!("Modification time before Unix epoch: {e}"))?;
    Ok(since_epoch.as_millis() as u64)
}
