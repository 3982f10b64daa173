//! Keyword-scan rule.
//!
//! Joins every nested key into one lowercase comma-string and matches it
//! against a small ordered table. All keywords of an entry must appear for
//! the entry to fire.

use serde_json::Value;

use crate::joined_keys;

struct KeywordRule {
    kind: &'static str,
    keywords: &'static [&'static str],
}

const KEYWORD_TABLE: &[KeywordRule] = &[
    KeywordRule { kind: "Message", keywords: &["message", "conversation"] },
    KeywordRule { kind: "Message", keywords: &["message", "sender"] },
    KeywordRule { kind: "Receipt", keywords: &["receipt"] },
    KeywordRule { kind: "Presence", keywords: &["presence"] },
    KeywordRule { kind: "Call", keywords: &["call", "offer"] },
    KeywordRule { kind: "Contact", keywords: &["vcard"] },
    KeywordRule { kind: "Group", keywords: &["group", "participants"] },
    KeywordRule { kind: "Status", keywords: &["status", "recipient"] },
];

pub(crate) fn classify(payload: &Value) -> Option<String> {
    let keys = joined_keys(payload);
    if keys.is_empty() {
        return None;
    }

    KEYWORD_TABLE
        .iter()
        .find(|rule| rule.keywords.iter().all(|kw| keys.contains(kw)))
        .map(|rule| rule.kind.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn all_keywords_must_appear() {
        let payload = json!({
            "envelope": { "message": { "conversation": "hi" } }
        });
        assert_eq!(classify(&payload).unwrap(), "Message");

        // "message" alone is not enough for either Message entry
        assert_eq!(classify(&json!({ "message": 1 })), None);
    }

    #[test]
    fn earlier_entries_win() {
        let payload = json!({
            "message": {}, "conversation": {}, "receipt": {}
        });
        assert_eq!(classify(&payload).unwrap(), "Message");
    }

    #[test]
    fn keys_only_values_ignored() {
        // "presence" appears as a value, not a key
        assert_eq!(classify(&json!({ "x": "presence" })), None);
        assert_eq!(classify(&json!({ "presence": {} })).unwrap(), "Presence");
    }
}
