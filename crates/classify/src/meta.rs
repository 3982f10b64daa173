//! Meta Cloud-like provider shape rule.
//!
//! Recognizes the `whatsapp_business_account` envelope and derives the kind
//! from the change's `field`, refined by the first message's `type` when the
//! field is `messages`.

use serde_json::Value;

use crate::str_field;

const ROOT_OBJECT: &str = "whatsapp_business_account";
const DEFAULT_MESSAGE_TYPE: &str = "text";

pub(crate) fn classify(payload: &Value) -> Option<String> {
    let object = str_field(payload, "object")?;
    if !object.eq_ignore_ascii_case(ROOT_OBJECT) {
        return None;
    }

    let change = payload
        .get("entry")?
        .get(0)?
        .get("changes")?
        .get(0)?;
    let value = change.get("value")?;

    let product = value
        .get("messaging_product")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())?;
    if !product.eq_ignore_ascii_case("whatsapp") {
        return None;
    }

    let field = str_field(change, "field")?.to_lowercase();

    if field == "messages" {
        let sub = value
            .get("messages")
            .and_then(|m| m.get(0))
            .and_then(|m| m.get("type"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_MESSAGE_TYPE)
            .to_lowercase();
        Some(format!("{ROOT_OBJECT}/{field}_{sub}"))
    } else {
        Some(format!("{ROOT_OBJECT}/{field}"))
    }
}
