//! Terminal presentation of log records.

use chrono::{Local, TimeZone, Utc};
use console::Style;
use impview_common::record::{API_CALL, ERROR, MOOD, WARNING};
use impview_common::{ApiCall, Event, LogRecord, Mood, Problem};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt::Write;
use url::Url;

use crate::client::image_url;
use crate::watcher::WatchState;

/// Characters of an API call prompt shown before truncation.
pub const PROMPT_LIMIT: usize = 200;
/// Characters of an API call response shown before truncation.
pub const RESPONSE_LIMIT: usize = 300;
const FIELD_LIMIT: usize = 200;
const MOOD_CELLS: usize = 10;

/// How records are laid out.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Show long text in full.
    pub expand: bool,
    /// Show only the newest N records.
    pub limit: Option<usize>,
    /// Server to point image links at; images are shown as plain paths
    /// without one.
    pub image_base: Option<Url>,
}

/// Whole screen for a watcher state.
pub fn render_state(state: &WatchState, options: &RenderOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}",
        Style::new().bold().apply_to("Impostor Log Viewer:"),
        state.file
    );
    out.push_str(&render_view(
        &state.records,
        state.error.as_deref(),
        state.is_loaded(),
        options,
    ));
    out
}

/// Error banner, summary line and records.
pub fn render_view(
    records: &[LogRecord],
    error: Option<&str>,
    loaded: bool,
    options: &RenderOptions,
) -> String {
    let mut out = String::new();
    if let Some(error) = error {
        let _ = writeln!(out, "{} {error}", Style::new().red().bold().apply_to("Error:"));
    }

    if records.is_empty() {
        let text = match (loaded, error) {
            (false, _) => "Loading logs...",
            (true, Some(_)) => "Failed to load logs",
            (true, None) => "No log entries found",
        };
        let _ = writeln!(out, "{}", Style::new().dim().apply_to(text));
        return out;
    }

    let shown = options.limit.map_or(records.len(), |n| n.min(records.len()));
    if shown < records.len() {
        let _ = writeln!(
            out,
            "Showing {shown} of {} log entries (newest first)",
            records.len()
        );
    } else {
        let _ = writeln!(out, "Showing {} log entries", records.len());
    }

    for record in &records[..shown] {
        out.push('\n');
        out.push_str(&render_record(record, options));
    }
    out
}

/// One record: a header line followed by indented detail lines.
pub fn render_record(record: &LogRecord, options: &RenderOptions) -> String {
    let mut out = String::new();
    let label = match (&record.event, record.kind()) {
        (Event::Bare(_), _) => "value",
        (_, "") => "untyped",
        (_, kind) => kind,
    };
    let when = record
        .timestamp_secs()
        .map_or_else(|| "no timestamp".to_string(), format_timestamp);
    let _ = write!(
        out,
        "{} {}",
        kind_style(label).apply_to(format!("[{label}]")),
        Style::new().dim().apply_to(when)
    );
    if let Some(run_id) = &record.run_id {
        let _ = write!(out, "  run {}", Style::new().dim().apply_to(run_id));
    }
    out.push('\n');

    let mut lines = Lines::default();
    match &record.event {
        Event::ApiCall(call) => api_call_lines(&mut lines, call, options.expand),
        Event::Mood(mood) => mood_lines(&mut lines, mood, options.expand),
        Event::Error(problem) | Event::Warning(problem) => {
            problem_lines(&mut lines, problem, options.expand);
        }
        Event::Bare(value) => {
            lines.field("Value", &truncate(&value.to_string(), FIELD_LIMIT, options.expand));
        }
        Event::Other { .. } | Event::Untyped => {}
    }
    for (key, value) in &record.extra {
        if key == "image_path" {
            continue;
        }
        if let Some(text) = scalar_text(value) {
            lines.field(key, &truncate(&text, FIELD_LIMIT, options.expand));
        }
    }
    if let Some(reference) = record.image_ref() {
        let target = match &options.image_base {
            Some(base) => image_url(base, reference).to_string(),
            None => reference.to_string(),
        };
        lines.field("Image", &target);
    }

    out.push_str(&lines.0);
    out
}

#[derive(Default)]
struct Lines(String);

impl Lines {
    fn field(&mut self, label: &str, value: &str) {
        let _ = writeln!(self.0, "  {}: {value}", Style::new().bold().apply_to(label));
    }

    fn opt(&mut self, label: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.field(label, value);
        }
    }
}

fn api_call_lines(lines: &mut Lines, call: &ApiCall, expand: bool) {
    if let Some(prompt) = &call.prompt {
        lines.field("Prompt", &truncate(prompt, PROMPT_LIMIT, expand));
    }
    if let Some(response) = &call.response {
        lines.field("Response", &truncate(response, RESPONSE_LIMIT, expand));
    }

    let mut meta = Vec::new();
    if let Some(model) = &call.model {
        meta.push(format!("Model: {model}"));
    }
    match call.success {
        Some(true) => meta.push(Style::new().green().apply_to("Success").to_string()),
        Some(false) => meta.push(Style::new().red().apply_to("Failed").to_string()),
        None => {}
    }
    if let Some(length) = call.full_response_length {
        meta.push(format!("Response Length: {length}"));
    }
    if !meta.is_empty() {
        let _ = writeln!(lines.0, "  {}", meta.join(" | "));
    }
    lines.opt("Error", call.error_message.as_deref());
}

fn mood_lines(lines: &mut Lines, mood: &Mood, expand: bool) {
    if let Some(score) = mood.score() {
        lines.field("Mood Score", &mood_bar(score));
    }
    if let Some(note) = &mood.note {
        lines.field("Note", &truncate(note, FIELD_LIMIT, expand));
    }
    if let Some(evaluation) = &mood.evaluation {
        lines.field("Evaluation", &truncate(evaluation, FIELD_LIMIT, expand));
    }
    if let Some(changes) = mood.changes.as_ref().filter(|c| !c.is_empty()) {
        lines.field("Changes", &changes.join(", "));
    }
    lines.opt("Caption", mood.caption.as_deref());
}

fn problem_lines(lines: &mut Lines, problem: &Problem, expand: bool) {
    if let Some(message) = &problem.message {
        lines.field("Message", &truncate(message, FIELD_LIMIT, expand));
    }
    lines.opt("Error", problem.error_message.as_deref());
}

/// Text for a field value; `None` for nulls.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
            Some(value.to_string())
        }
    }
}

fn kind_style(kind: &str) -> Style {
    match kind {
        API_CALL => Style::new().blue().bold(),
        MOOD => Style::new().magenta().bold(),
        ERROR => Style::new().red().bold(),
        WARNING => Style::new().yellow().bold(),
        _ => Style::new().bold(),
    }
}

/// Cut `text` to `limit` characters, marking the cut with `...`.
pub fn truncate(text: &str, limit: usize, expand: bool) -> Cow<'_, str> {
    if expand {
        return Cow::Borrowed(text);
    }
    match text.char_indices().nth(limit) {
        Some((end, _)) => Cow::Owned(format!("{}...", &text[..end])),
        None => Cow::Borrowed(text),
    }
}

/// Ten-cell bar for a 0..1 score, followed by the score.
pub fn mood_bar(score: f64) -> String {
    let clamped = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
    let filled = (clamped * MOOD_CELLS as f64).round() as usize;
    format!(
        "[{}{}] {score:.2}",
        "#".repeat(filled),
        "-".repeat(MOOD_CELLS - filled)
    )
}

/// Local time for fractional Unix seconds.
pub fn format_timestamp(secs: f64) -> String {
    let millis = (secs * 1000.0) as i64;
    match Utc.timestamp_millis_opt(millis).single() {
        Some(utc) => utc
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => "????-??-?? ??:??:??".to_string(),
    }
}
