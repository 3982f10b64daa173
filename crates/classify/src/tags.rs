//! Direct tag-field rule.
//!
//! Some senders already label their events; the first non-empty string among
//! `eventType`, `body.eventType`, and `body.data.type` becomes the kind,
//! normalized to a pascal-case identifier.

use serde_json::Value;

use hookforge_common::pascal_case;

const TAG_PATHS: &[&[&str]] = &[
    &["eventType"],
    &["body", "eventType"],
    &["body", "data", "type"],
];

pub(crate) fn classify(payload: &Value) -> Option<String> {
    for path in TAG_PATHS {
        let mut cursor = payload;
        let mut found = true;
        for segment in *path {
            match cursor.get(segment) {
                Some(next) => cursor = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if !found {
            continue;
        }
        if let Some(tag) = cursor.as_str().filter(|s| !s.is_empty()) {
            let kind = pascal_case(tag);
            if !kind.is_empty() {
                return Some(kind);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn top_level_event_type_wins() {
        let payload = json!({
            "eventType": "Ping",
            "body": { "eventType": "Other" }
        });
        assert_eq!(classify(&payload).unwrap(), "Ping");
    }

    #[test]
    fn nested_paths_probe_in_order() {
        assert_eq!(
            classify(&json!({"body": {"eventType": "order.created"}}))
                .unwrap(),
            "OrderCreated"
        );
        assert_eq!(
            classify(&json!({"body": {"data": {"type": "refund-issued"}}}))
                .unwrap(),
            "RefundIssued"
        );
    }

    #[test]
    fn empty_and_non_string_tags_are_skipped() {
        assert_eq!(classify(&json!({"eventType": ""})), None);
        assert_eq!(classify(&json!({"eventType": 42})), None);
        assert_eq!(classify(&json!({"other": true})), None);
    }
}
