//! Generic provider fallback.
//!
//! When nothing shape-specific matched, derive a provider name from the
//! request headers and a coarse type from the payload's keys, yielding
//! `<provider>/<type>` or `<provider>/webhook`.

use serde_json::Value;

use crate::{header, joined_keys, Headers};

/// User-agent fragments mapped to provider names.
const USER_AGENT_TABLE: &[(&str, &str)] = &[
    ("twilio", "twilio"),
    ("whatsapp", "whatsapp"),
    ("telegram", "telegram"),
    ("slack", "slack"),
    ("github", "github"),
    ("stripe", "stripe"),
    ("facebook", "facebook"),
];

/// Custom headers that carry an explicit provider name.
const PROVIDER_HEADERS: &[&str] =
    &["x-provider", "x-webhook-source", "x-vendor"];

/// Structural keywords probed for the coarse type, in order.
const TYPE_KEYWORDS: &[&str] = &[
    "message", "status", "presence", "receipt", "contact", "group", "event",
];

pub(crate) fn classify(payload: &Value, headers: &Headers) -> Option<String> {
    let provider = provider_from_headers(headers)?;
    let keys = joined_keys(payload);
    let kind_type = TYPE_KEYWORDS
        .iter()
        .find(|kw| keys.contains(**kw))
        .copied()
        .unwrap_or("webhook");
    Some(format!("{provider}/{kind_type}"))
}

fn provider_from_headers(headers: &Headers) -> Option<String> {
    if let Some(ua) = header(headers, "user-agent") {
        let lowered = ua.to_lowercase();
        if let Some((_, provider)) = USER_AGENT_TABLE
            .iter()
            .find(|(fragment, _)| lowered.contains(fragment))
        {
            return Some(provider.to_string());
        }
    }

    for name in PROVIDER_HEADERS {
        if let Some(value) = header(headers, name) {
            let trimmed = value.trim().to_lowercase();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
    }

    if let Some(origin) =
        header(headers, "origin").or_else(|| header(headers, "referer"))
    {
        if let Some(host) = host_label(origin) {
            return Some(host);
        }
    }

    None
}

/// First meaningful label of the origin host: `https://api.acme.io` -> `acme`
/// when the leading label is generic, else the leading label itself.
fn host_label(origin: &str) -> Option<String> {
    let rest = origin
        .split("://")
        .nth(1)
        .unwrap_or(origin);
    let host = rest.split(['/', ':']).next()?.to_lowercase();
    if host.is_empty() {
        return None;
    }
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    let first = *labels.first()?;
    let label = if matches!(first, "www" | "api" | "webhooks" | "hooks")
        && labels.len() > 1
    {
        labels[1]
    } else {
        first
    };
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}
