//! Tracing setup shared by the impview binaries.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Environment variable controlling the log filter.
pub const LOG_ENV: &str = "IMPVIEW_LOG";

/// Crates whose events a plain level such as `debug` applies to.
const WORKSPACE_CRATES: &[&str] = &["impview", "impview_server", "impview_common"];

/// Install a stderr fmt subscriber.
///
/// `IMPVIEW_LOG` controls the filter: "trace", "debug", "info", "warn",
/// "error", or a full tracing filter spec like "impview=debug,axum=warn".
pub fn init_tracing() {
    let filter = filter_spec(std::env::var(LOG_ENV).ok().as_deref());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(EnvFilter::new(filter));

    if tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        eprintln!("Warning: tracing subscriber already initialized");
    }
}

fn filter_spec(value: Option<&str>) -> String {
    match value {
        Some(level) if is_plain_level(level) => scoped(&level.to_ascii_lowercase()),
        Some(spec) if !spec.trim().is_empty() => spec.to_string(),
        _ => scoped("info"),
    }
}

fn scoped(level: &str) -> String {
    WORKSPACE_CRATES
        .iter()
        .map(|name| format!("{name}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn is_plain_level(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    )
}
