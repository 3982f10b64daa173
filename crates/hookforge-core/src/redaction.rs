//! Redaction metadata produced by the truncator and consumed by the analyzer.

use serde::{Deserialize, Serialize};

/// Appended to every truncated string.
pub const TRUNCATION_SENTINEL: &str = "...[TRUNCATED]";

/// Heuristic guess of what a truncated string originally held.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RedactTag {
    Base64,
    Json,
    Text,
}

impl RedactTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedactTag::Base64 => "base64",
            RedactTag::Json => "json",
            RedactTag::Text => "text",
        }
    }
}

/// One redacted field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redaction {
    /// Dot-and-bracket path of the string that was truncated.
    pub path: String,
    pub original_length: usize,
    pub redacted_length: usize,
    pub tag: RedactTag,
}

/// The set of redactions applied to one payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionReport {
    pub redactions: Vec<Redaction>,
}

impl RedactionReport {
    pub fn is_empty(&self) -> bool {
        self.redactions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.redactions.len()
    }

    pub fn get(&self, path: &str) -> Option<&Redaction> {
        self.redactions.iter().find(|r| r.path == path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn push(&mut self, redaction: Redaction) {
        self.redactions.push(redaction);
    }
}
