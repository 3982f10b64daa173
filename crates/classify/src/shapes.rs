//! Structural shape catalog.
//!
//! An ordered ruleset matching combinations of top-level keys (and, for a
//! few rules, tokens in the lowered body) against a closed catalog of event
//! shapes from socket-style WhatsApp bridges. The catalog order is part of
//! the system contract: a payload matching several rules takes the earliest,
//! and reordering is a breaking change.

use serde_json::Value;

use crate::lowered_body;

/// One catalog entry: the payload must contain every key in `keys`
/// (case-insensitive, top level) and every token in `tokens` (substring of
/// the lowered canonical body).
pub struct ShapeRule {
    pub kind: &'static str,
    pub keys: &'static [&'static str],
    pub tokens: &'static [&'static str],
}

/// The closed, ordered catalog.
pub const SHAPE_CATALOG: &[ShapeRule] = &[
    ShapeRule { kind: "QR", keys: &["codes"], tokens: &[] },
    ShapeRule {
        kind: "PairSuccess",
        keys: &["id", "businessname", "platform"],
        tokens: &[],
    },
    ShapeRule {
        kind: "LoggedOut",
        keys: &["onconnect", "reason"],
        tokens: &[],
    },
    ShapeRule {
        kind: "KeepAliveTimeout",
        keys: &["errorcount", "lastsuccess"],
        tokens: &[],
    },
    ShapeRule { kind: "Message", keys: &["info", "message"], tokens: &[] },
    ShapeRule {
        kind: "Receipt",
        keys: &["messageids", "type"],
        tokens: &[],
    },
    ShapeRule {
        kind: "Presence",
        keys: &["from", "unavailable"],
        tokens: &[],
    },
    ShapeRule {
        kind: "ChatPresence",
        keys: &["chat", "state"],
        tokens: &[],
    },
    ShapeRule {
        kind: "Picture",
        keys: &["jid", "author"],
        tokens: &["picture"],
    },
    ShapeRule {
        kind: "MediaRetry",
        keys: &["ciphertext", "iv"],
        tokens: &[],
    },
    ShapeRule {
        kind: "HistorySync",
        keys: &["data"],
        tokens: &["historysync"],
    },
    ShapeRule { kind: "Blocklist", keys: &["blocklist"], tokens: &[] },
    ShapeRule {
        kind: "NewsletterJoin",
        keys: &["id", "threadmetadata"],
        tokens: &["newsletter"],
    },
    ShapeRule {
        kind: "NewsletterLeave",
        keys: &["id", "role"],
        tokens: &["newsletter"],
    },
    ShapeRule {
        kind: "NewsletterMuteChange",
        keys: &["id", "mute"],
        tokens: &[],
    },
    ShapeRule {
        kind: "NewsletterLiveUpdate",
        keys: &["jid", "time", "messages"],
        tokens: &[],
    },
    ShapeRule { kind: "Connected", keys: &["connected"], tokens: &[] },
];

pub(crate) fn classify(payload: &Value) -> Option<String> {
    let obj = payload.as_object()?;
    let keys: Vec<String> = obj.keys().map(|k| k.to_lowercase()).collect();

    // The lowered body is only rendered when some rule needs tokens.
    let mut body: Option<String> = None;

    for rule in SHAPE_CATALOG {
        let keys_match = rule
            .keys
            .iter()
            .all(|want| keys.iter().any(|k| k == want));
        if !keys_match {
            continue;
        }

        if !rule.tokens.is_empty() {
            let body =
                body.get_or_insert_with(|| lowered_body(payload));
            if !rule.tokens.iter().all(|t| body.contains(t)) {
                continue;
            }
        }

        return Some(rule.kind.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_shape_matches_case_insensitively() {
        let payload = json!({
            "Info": { "Chat": "123@s.whatsapp.net" },
            "Message": { "conversation": "hi" }
        });
        assert_eq!(classify(&payload).unwrap(), "Message");
    }

    #[test]
    fn qr_wins_over_later_rules() {
        // Carries both QR's key and Connected's key; QR is earlier.
        let payload = json!({ "codes": ["abc"], "connected": true });
        assert_eq!(classify(&payload).unwrap(), "QR");
    }

    #[test]
    fn message_wins_over_receipt_on_overlap() {
        let payload = json!({
            "info": {}, "message": {},
            "messageids": ["a"], "type": "read"
        });
        assert_eq!(classify(&payload).unwrap(), "Message");
    }

    #[test]
    fn receipt_needs_both_keys() {
        assert_eq!(
            classify(&json!({ "messageids": ["a"], "type": "read" }))
                .unwrap(),
            "Receipt"
        );
        assert_eq!(classify(&json!({ "messageids": ["a"] })), None);
    }

    #[test]
    fn token_rules_require_body_match() {
        let sync = json!({ "data": { "historySyncType": "FULL" } });
        assert_eq!(classify(&sync).unwrap(), "HistorySync");

        // Same key without the token stays unmatched by that rule.
        assert_eq!(classify(&json!({ "data": { "x": 1 } })), None);
    }

    #[test]
    fn newsletter_rules_disambiguate_by_keys() {
        let join = json!({
            "id": "123@newsletter",
            "threadmetadata": { "name": "x" }
        });
        assert_eq!(classify(&join).unwrap(), "NewsletterJoin");

        let leave = json!({ "id": "123@newsletter", "role": "guest" });
        assert_eq!(classify(&leave).unwrap(), "NewsletterLeave");

        let mute = json!({ "id": "123", "mute": "on" });
        assert_eq!(classify(&mute).unwrap(), "NewsletterMuteChange");
    }

    #[test]
    fn non_object_payloads_never_match() {
        assert_eq!(classify(&json!([1, 2, 3])), None);
        assert_eq!(classify(&json!("codes")), None);
    }
}
