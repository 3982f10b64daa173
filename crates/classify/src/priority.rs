//! Job priority computation.
//!
//! Priority shapes dequeue latency only; it never affects correctness. It is
//! computed from the raw payload's own type labels (not from the classified
//! kind), with a keyword fallback for unlabeled events.

use serde_json::Value;

use crate::{joined_keys, str_field};

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 15;
pub const DEFAULT_PRIORITY: u8 = 5;

/// Well-known type names, matched case-insensitively against the payload's
/// `type` / `event` / `eventType` field.
const TYPE_PRIORITIES: &[(&str, u8)] = &[
    ("qr", 15),
    ("pairsuccess", 14),
    ("connectedcallback", 14),
    ("connected", 14),
    ("loggedout", 14),
    ("disconnectedcallback", 13),
    ("disconnected", 13),
    ("receivedcallback", 12),
    ("message", 12),
    ("sentcallback", 9),
    ("messagestatuscallback", 8),
    ("deliverycallback", 8),
    ("receipt", 8),
    ("status", 7),
    ("presencechatcallback", 4),
    ("presence", 4),
    ("chatpresence", 3),
    ("historysync", 2),
];

/// Keyword fallback over the joined key set, probed in order.
const KEYWORD_PRIORITIES: &[(&str, u8)] = &[
    ("message", 10),
    ("receipt", 8),
    ("status", 7),
    ("presence", 3),
];

/// Compute the enqueue priority for a payload. Always in
/// `[MIN_PRIORITY, MAX_PRIORITY]`.
pub fn priority_for(payload: &Value) -> u8 {
    let label = str_field(payload, "type")
        .or_else(|| str_field(payload, "event"))
        .or_else(|| str_field(payload, "eventType"));

    if let Some(label) = label {
        let lowered = label.to_lowercase();
        if let Some((_, p)) = TYPE_PRIORITIES
            .iter()
            .find(|(name, _)| *name == lowered)
        {
            return clamp(*p);
        }
    }

    let keys = joined_keys(payload);
    if let Some((_, p)) = KEYWORD_PRIORITIES
        .iter()
        .find(|(kw, _)| keys.contains(kw))
    {
        return clamp(*p);
    }

    DEFAULT_PRIORITY
}

fn clamp(p: u8) -> u8 {
    p.clamp(MIN_PRIORITY, MAX_PRIORITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_types_map_directly() {
        assert_eq!(priority_for(&json!({ "type": "QR" })), 15);
        assert_eq!(
            priority_for(&json!({ "type": "ReceivedCallback" })),
            12
        );
        assert_eq!(priority_for(&json!({ "type": "HistorySync" })), 2);
    }

    #[test]
    fn alternate_label_fields_are_probed() {
        assert_eq!(priority_for(&json!({ "event": "Connected" })), 14);
        assert_eq!(priority_for(&json!({ "eventType": "Receipt" })), 8);
    }

    #[test]
    fn unknown_type_falls_back_to_keywords() {
        let payload = json!({
            "type": "SomethingNew",
            "message": { "text": "hi" }
        });
        assert_eq!(priority_for(&payload), 10);
    }

    #[test]
    fn unlabeled_unmatched_payload_gets_default() {
        assert_eq!(priority_for(&json!({ "x": 1 })), DEFAULT_PRIORITY);
    }

    #[test]
    fn all_table_entries_are_in_range() {
        for (_, p) in TYPE_PRIORITIES.iter().chain(KEYWORD_PRIORITIES) {
            assert!(*p >= MIN_PRIORITY && *p <= MAX_PRIORITY);
        }
    }
}
