//! Log record model.
//!
//! Every record shares a small envelope (`timestamp`, `type`, and the
//! optional `iso_timestamp` and `run_id`). The rest of the fields depend on
//! `type`: known types get a typed payload, anything else lands in
//! [`Event::Other`]. Fields the payload does not consume are kept in
//! [`LogRecord::extra`] and written back unchanged.
//!
//! No field is mandatory. A record without a numeric `timestamp` or a string
//! `type` is still a record, and an array element that is not an object is
//! kept as [`Event::Bare`].

use serde::de::{DeserializeOwned, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

// ============================================================================
// Record type tags
// ============================================================================

/// A call to the model API.
pub const API_CALL: &str = "ollama_api_call";
/// A mood evaluation.
pub const MOOD: &str = "mood";
/// An error report.
pub const ERROR: &str = "error";
/// A warning report.
pub const WARNING: &str = "warning";

/// Payload of an `ollama_api_call` record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiCall {
    /// Prompt sent to the model, possibly shortened by the producer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Length of the prompt before shortening.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_prompt_length: Option<u64>,
    /// Model name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Image sent along with the prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    /// Whether an image was attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_image: Option<bool>,
    /// Model answer, possibly shortened by the producer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Length of the answer before shortening.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_response_length: Option<u64>,
    /// Whether the call succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Request timeout in seconds, exactly as written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Number>,
    /// Endpoint the call went to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
}

/// Payload of a `mood` record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mood {
    /// Score in `0.0..=1.0`, exactly as written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<Number>,
    /// Free-form remark.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// What changed since the previous evaluation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<String>>,
    /// Longer assessment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<String>,
    /// Caption of the evaluated image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl Mood {
    /// The score as a float, if present.
    pub fn score(&self) -> Option<f64> {
        self.mood.as_ref().and_then(Number::as_f64)
    }
}

/// Payload of `error` and `warning` records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    /// What went wrong.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Underlying error text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Type-specific part of a record, keyed by its `type` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// `ollama_api_call`.
    ApiCall(ApiCall),
    /// `mood`.
    Mood(Mood),
    /// `error`.
    Error(Problem),
    /// `warning`.
    Warning(Problem),
    /// Unrecognised tag, or a known tag whose fields did not fit its payload.
    Other {
        /// The `type` tag as written.
        kind: String,
    },
    /// An object without a string `type`.
    Untyped,
    /// An array element that is not a JSON object, kept as written.
    Bare(Value),
}

impl Event {
    /// The `type` tag this event serializes with; empty when there is none.
    pub fn kind(&self) -> &str {
        match self {
            Event::ApiCall(_) => API_CALL,
            Event::Mood(_) => MOOD,
            Event::Error(_) => ERROR,
            Event::Warning(_) => WARNING,
            Event::Other { kind } => kind.as_str(),
            Event::Untyped | Event::Bare(_) => "",
        }
    }

    /// Build the event for `kind`, moving consumed fields out of `fields`.
    fn from_fields(kind: &str, fields: &mut Map<String, Value>) -> Self {
        let event = match kind {
            API_CALL => take_payload(fields).map(Event::ApiCall),
            MOOD => take_payload(fields).map(Event::Mood),
            ERROR => take_payload(fields).map(Event::Error),
            WARNING => take_payload(fields).map(Event::Warning),
            _ => None,
        };
        event.unwrap_or_else(|| Event::Other {
            kind: kind.to_string(),
        })
    }

    fn payload_fields(&self) -> Map<String, Value> {
        let value = match self {
            Event::ApiCall(p) => serde_json::to_value(p),
            Event::Mood(p) => serde_json::to_value(p),
            Event::Error(p) | Event::Warning(p) => serde_json::to_value(p),
            Event::Other { .. } | Event::Untyped | Event::Bare(_) => return Map::new(),
        };
        match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Deserialize a typed payload from the loose field map and remove the keys
/// it consumed. Returns `None` (leaving `fields` intact) on a type mismatch.
fn take_payload<T: DeserializeOwned + Serialize>(fields: &mut Map<String, Value>) -> Option<T> {
    let payload: T = serde_json::from_value(Value::Object(fields.clone())).ok()?;
    if let Ok(Value::Object(consumed)) = serde_json::to_value(&payload) {
        for key in consumed.keys() {
            fields.remove(key);
        }
    }
    Some(payload)
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(_)) => match fields.remove(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        },
        _ => None,
    }
}

fn take_number(fields: &mut Map<String, Value>, key: &str) -> Option<Number> {
    match fields.get(key) {
        Some(Value::Number(_)) => match fields.remove(key) {
            Some(Value::Number(n)) => Some(n),
            _ => None,
        },
        _ => None,
    }
}

/// One entry of a log file.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Seconds since the Unix epoch, as written by the producer. A
    /// non-numeric `timestamp` stays in [`LogRecord::extra`].
    pub timestamp: Option<Number>,
    /// Human-readable form of `timestamp`, when the producer wrote one.
    pub iso_timestamp: Option<String>,
    /// Identifier of the producer run.
    pub run_id: Option<String>,
    /// Type-specific payload.
    pub event: Event,
    /// Fields not consumed by the envelope or the typed payload.
    pub extra: Map<String, Value>,
}

impl LogRecord {
    /// A record with the given envelope and no extra fields.
    pub fn new(timestamp: impl Into<Number>, event: Event) -> Self {
        Self {
            timestamp: Some(timestamp.into()),
            iso_timestamp: None,
            run_id: None,
            event,
            extra: Map::new(),
        }
    }

    /// The record's `type` tag; empty when it has none.
    pub fn kind(&self) -> &str {
        self.event.kind()
    }

    /// Timestamp as fractional seconds.
    pub fn timestamp_secs(&self) -> Option<f64> {
        self.timestamp.as_ref().and_then(Number::as_f64)
    }

    /// Image reference carried by the record, if any.
    pub fn image_ref(&self) -> Option<&str> {
        match &self.event {
            Event::ApiCall(call) => call.image_path.as_deref(),
            _ => self.extra.get("image_path").and_then(Value::as_str),
        }
    }

    /// The record as JSON, envelope first.
    pub fn to_value(&self) -> Value {
        if let Event::Bare(value) = &self.event {
            return value.clone();
        }
        let mut map = Map::new();
        if let Some(timestamp) = &self.timestamp {
            map.insert("timestamp".to_string(), Value::Number(timestamp.clone()));
        }
        if !matches!(self.event, Event::Untyped) {
            map.insert("type".to_string(), Value::String(self.kind().to_string()));
        }
        if let Some(iso) = &self.iso_timestamp {
            map.insert("iso_timestamp".to_string(), Value::String(iso.clone()));
        }
        if let Some(run_id) = &self.run_id {
            map.insert("run_id".to_string(), Value::String(run_id.clone()));
        }
        map.extend(self.event.payload_fields());
        for (key, value) in &self.extra {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(map)
    }
}

impl From<Value> for LogRecord {
    fn from(value: Value) -> Self {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Self {
                    timestamp: None,
                    iso_timestamp: None,
                    run_id: None,
                    event: Event::Bare(other),
                    extra: Map::new(),
                };
            }
        };

        let timestamp = take_number(&mut fields, "timestamp");
        let kind = take_string(&mut fields, "type");
        let iso_timestamp = take_string(&mut fields, "iso_timestamp");
        let run_id = take_string(&mut fields, "run_id");
        let event = match kind {
            Some(kind) => Event::from_fields(&kind, &mut fields),
            None => Event::Untyped,
        };

        Self {
            timestamp,
            iso_timestamp,
            run_id,
            event,
            extra: fields,
        }
    }
}

impl Serialize for LogRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LogRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(LogRecord::from)
    }
}
