//! JSON value classification.
//!
//! `serde_json` rejects NaN and infinities at parse time, so every `Number`
//! reaching this function is finite.

use serde_json::Value;

use crate::tree::TypeKind;

/// Classify a JSON value into the closed kind set.
///
/// `null` is a kind of its own, distinct from field absence (absence never
/// reaches this function; it is only representable as optionality on the
/// tree).
pub fn value_kind(value: &Value) -> TypeKind {
    match value {
        Value::Null => TypeKind::Null,
        Value::Bool(_) => TypeKind::Boolean,
        Value::Number(_) => TypeKind::Number,
        Value::String(_) => TypeKind::String,
        Value::Array(_) => TypeKind::Array,
        Value::Object(_) => TypeKind::Object,
    }
}
