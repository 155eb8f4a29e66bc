//! Result envelope codec.
//!
//! An agent reports exactly one structured result per run by printing it between two
//! marker lines on stdout:
//!
//! ```text
//! <<<LEGION_JSON_START>>>
//! {"status": "success", "data": {...}, "meta": {"ts": "..."}}
//! <<<LEGION_JSON_END>>>
//! ```
//!
//! Anything outside the markers (banners, progress text) is ignored by [`decode`].
//! Producers that print nothing but the JSON body may omit the markers entirely.

use std::sync::LazyLock;

use chrono::{SecondsFormat, Utc};
use jsonschema::Validator;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const START_MARKER: &str = "<<<LEGION_JSON_START>>>";
pub const END_MARKER: &str = "<<<LEGION_JSON_END>>>";

const ENVELOPE_SCHEMA: &str = include_str!("../../schemas/envelope.schema.json");

static ENVELOPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        "(?s){}(.*?){}",
        regex::escape(START_MARKER),
        regex::escape(END_MARKER)
    );
    Regex::new(&pattern).expect("envelope marker pattern should be valid")
});

static ENVELOPE_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(ENVELOPE_SCHEMA).expect("bundled envelope schema should be json");
    jsonschema::validator_for(&schema).expect("bundled envelope schema should compile")
});

/// Envelope metadata. Only `ts` is defined; producers may omit the block entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

impl Meta {
    fn now() -> Self {
        Self {
            ts: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

/// One agent result, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Envelope {
    /// The agent ran and produced a payload.
    Success {
        #[serde(default)]
        data: Value,
        #[serde(default)]
        meta: Meta,
    },
    /// The agent ran but reports a handled failure (e.g. unreachable target).
    Error {
        error: String,
        #[serde(default = "empty_object")]
        details: Value,
        #[serde(default)]
        meta: Meta,
    },
}

impl Envelope {
    pub fn success(data: Value) -> Self {
        Self::Success {
            data,
            meta: Meta::now(),
        }
    }

    pub fn error(message: impl Into<String>, details: Value) -> Self {
        Self::Error {
            error: message.into(),
            details,
            meta: Meta::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Why a captured stdout did not yield an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// A marker pair was present but its body is not a valid envelope.
    #[error("malformed envelope between markers: {reason}")]
    MalformedEnvelope { reason: String },
    /// No marker pair, and the whole output is not a valid envelope either.
    #[error("no envelope found in agent output: {reason}")]
    NoEnvelopeFound { reason: String },
}

/// Render an envelope as the marker-delimited block printed to stdout.
pub fn encode(envelope: &Envelope) -> serde_json::Result<String> {
    let body = serde_json::to_string_pretty(envelope)?;
    Ok(format!("\n{START_MARKER}\n{body}\n{END_MARKER}\n"))
}

/// Extract the envelope from an agent's captured stdout.
///
/// The first non-greedy marker pair wins. Without markers, the entire trimmed output
/// must itself be an envelope.
pub fn decode(stdout: &str) -> Result<Envelope, EnvelopeError> {
    if let Some(caps) = ENVELOPE_RE.captures(stdout) {
        let body = caps.get(1).map_or("", |m| m.as_str());
        return parse_envelope(body.trim())
            .map_err(|reason| EnvelopeError::MalformedEnvelope { reason });
    }

    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(EnvelopeError::NoEnvelopeFound {
            reason: "output is empty".to_string(),
        });
    }
    parse_envelope(trimmed).map_err(|reason| EnvelopeError::NoEnvelopeFound { reason })
}

fn parse_envelope(body: &str) -> Result<Envelope, String> {
    let value: Value = serde_json::from_str(body).map_err(|err| format!("invalid json: {err}"))?;
    let violations: Vec<String> = ENVELOPE_VALIDATOR
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !violations.is_empty() {
        return Err(format!("schema violation: {}", violations.join("; ")));
    }
    serde_json::from_value(value).map_err(|err| format!("invalid envelope: {err}"))
}
