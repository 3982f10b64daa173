//! Event-kind classification.
//!
//! Assigns every payload a stable kind string by running an ordered cascade
//! of rules and stopping at the first success:
//!
//! 1. Z-API-like provider shape (headers or `type`+`instanceId` pair)
//! 2. Meta Cloud-like provider shape (`object` envelope)
//! 3. Direct tag fields (`eventType`, `body.eventType`, `body.data.type`)
//! 4. Structural shape catalog (ordered; order is part of the contract)
//! 5. Keyword scan over the joined nested key set
//! 6. Generic provider fallback from headers
//! 7. `Unknown`
//!
//! The classifier always sees the payload before redaction. All string
//! comparisons are case-insensitive.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use hookforge_common::sanitize_kind;
use hookforge_config::VendorConfig;

mod keywords;
mod meta;
mod priority;
mod provider;
mod shapes;
mod tags;
mod zapi;

pub use priority::{priority_for, DEFAULT_PRIORITY, MAX_PRIORITY, MIN_PRIORITY};
pub use shapes::{ShapeRule, SHAPE_CATALOG};

/// Request headers as captured at ingress.
pub type Headers = HashMap<String, String>;

/// Kind emitted when no rule matches.
pub const UNKNOWN_KIND: &str = "Unknown";

/// Case-insensitive header lookup.
pub(crate) fn header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Non-empty string field at the top level of an object payload.
pub(crate) fn str_field<'a>(payload: &'a Value, name: &str) -> Option<&'a str> {
    payload
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

pub struct Classifier {
    vendor: VendorConfig,
}

impl Classifier {
    pub fn new(vendor: VendorConfig) -> Self {
        Self { vendor }
    }

    /// Classify a payload into an event kind. Never fails: ambiguity falls
    /// through to [`UNKNOWN_KIND`].
    pub fn classify(&self, payload: &Value, headers: &Headers) -> String {
        let kind = zapi::classify(payload, headers, &self.vendor)
            .or_else(|| meta::classify(payload))
            .or_else(|| tags::classify(payload))
            .or_else(|| shapes::classify(payload))
            .or_else(|| keywords::classify(payload))
            .or_else(|| provider::classify(payload, headers))
            .unwrap_or_else(|| UNKNOWN_KIND.to_string());

        let sanitized = sanitize_kind(&kind);
        debug!(kind = %sanitized, "payload classified");
        sanitized
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(VendorConfig::default())
    }
}

/// Lowercased canonical rendering of a payload, used for token scans.
pub(crate) fn lowered_body(payload: &Value) -> String {
    hookforge_core::canonical_string(payload).to_lowercase()
}

/// All nested object keys, lowercased, joined with commas.
pub(crate) fn joined_keys(payload: &Value) -> String {
    let mut keys = Vec::new();
    collect_keys(payload, &mut keys);
    keys.join(",")
}

fn collect_keys(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                out.push(k.to_lowercase());
                collect_keys(v, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_keys(item, out);
            }
        }
        _ => {}
    }
}
