//! Z-API-like provider shape rule.
//!
//! Fires when the request carries the vendor's headers, or when the payload
//! has the vendor's `type` + `instanceId` envelope with a recognized
//! callback type. Produces kinds of the form
//! `z_api/<type-minus-callback>[/<sub-type>]`.

use serde_json::Value;

use hookforge_config::VendorConfig;

use crate::{header, str_field, Headers};

const KIND_PREFIX: &str = "z_api";

/// Callback types the envelope rule recognizes (case-insensitive).
const KNOWN_CALLBACK_TYPES: &[&str] = &[
    "ReceivedCallback",
    "SentCallback",
    "DeliveryCallback",
    "MessageStatusCallback",
    "PresenceChatCallback",
    "ConnectedCallback",
    "DisconnectedCallback",
];

/// Content keys probed for the message sub-type, in precedence order.
const CONTENT_KEYS: &[&str] = &[
    "text", "image", "sticker", "audio", "video", "document", "location",
    "contact", "poll", "reaction", "order", "payment", "buttons", "list",
];

pub(crate) fn classify(
    payload: &Value,
    headers: &Headers,
    vendor: &VendorConfig,
) -> Option<String> {
    let by_header = has_vendor_marker(headers, vendor);
    let by_envelope = has_vendor_envelope(payload);
    if !by_header && !by_envelope {
        return None;
    }

    let callback_type = str_field(payload, "type")?;
    let base = callback_type
        .to_lowercase()
        .trim_end_matches("callback")
        .to_string();
    if base.is_empty() {
        return None;
    }

    match sub_type(payload, &base) {
        Some(sub) => Some(format!("{KIND_PREFIX}/{base}/{sub}")),
        None => Some(format!("{KIND_PREFIX}/{base}")),
    }
}

fn has_vendor_marker(headers: &Headers, vendor: &VendorConfig) -> bool {
    if let Some(server) = header(headers, "server") {
        if server.eq_ignore_ascii_case(&vendor.server_token) {
            return true;
        }
    }
    if let Some(origin) = header(headers, "origin") {
        if origin
            .to_lowercase()
            .contains(&vendor.origin_host.to_lowercase())
        {
            return true;
        }
    }
    false
}

fn has_vendor_envelope(payload: &Value) -> bool {
    let Some(t) = str_field(payload, "type") else {
        return false;
    };
    if str_field(payload, "instanceId").is_none() {
        return false;
    }
    KNOWN_CALLBACK_TYPES
        .iter()
        .any(|known| known.eq_ignore_ascii_case(t))
}

/// Sub-type for the kind's third segment.
///
/// Status callbacks report the status value (group-prefixed when the chat is
/// a group); everything else probes the content keys.
fn sub_type(payload: &Value, base: &str) -> Option<String> {
    if base.contains("status") {
        let status = str_field(payload, "status")?.to_lowercase();
        let is_group =
            payload.get("isGroup").and_then(Value::as_bool).unwrap_or(false);
        return Some(if is_group {
            format!("group_{status}")
        } else {
            status
        });
    }

    CONTENT_KEYS
        .iter()
        .find(|key| payload.get(**key).is_some())
        .map(|key| key.to_string())
}
