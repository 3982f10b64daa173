//! Fingerprint generation.
//!
//! Two SHA-256 fingerprints make drift observable:
//!
//! - the **structure fingerprint** hashes the shape of a [`TypeTree`]
//!   (kinds, optionality, field names) and ignores everything that changes
//!   per observation (examples, paths, redaction marks);
//! - the **payload fingerprint** hashes a canonical rendering of the payload
//!   itself, with oversize strings collapsed to a sentinel so near-duplicate
//!   events carrying different blobs still fingerprint identically.

use sha2::{Digest, Sha256};
use serde_json::Value;

use crate::tree::TypeTree;

/// Strings longer than this are replaced by a sentinel before payload
/// hashing.
pub const LARGE_STRING_BOUND: usize = 10_000;

const LARGE_STRING_SENTINEL: &str = "<large-string>";

/// Stable fingerprint of a tree's structure, hex-encoded SHA-256.
///
/// Two trees with equal fingerprints are structurally indistinguishable:
/// same kinds, same field names, same optionality, same nesting. Examples,
/// paths, and redaction marks do not participate.
pub fn structure_fingerprint(tree: &TypeTree) -> String {
    let mut hasher = Sha256::new();
    hash_structure(tree, &mut hasher);
    hex::encode(hasher.finalize())
}

fn hash_structure(tree: &TypeTree, hasher: &mut Sha256) {
    hasher.update(tree.kind.as_str().as_bytes());
    hasher.update([tree.optional as u8]);

    if !tree.children.is_empty() {
        hasher.update(b"{");
        // BTreeMap iterates keys in lexicographic order
        for (name, child) in &tree.children {
            hasher.update(name.as_bytes());
            hasher.update(b":");
            hash_structure(child, hasher);
            hasher.update(b",");
        }
        hasher.update(b"}");
    }

    match tree.item_type.as_deref() {
        Some(item) => {
            hasher.update(b"[");
            hash_structure(item, hasher);
            hasher.update(b"]");
        }
        None => hasher.update(b"?"),
    }
}

/// First `len` characters of a fingerprint, for display and file names.
pub fn short_id(fingerprint: &str, len: usize) -> String {
    fingerprint.chars().take(len).collect()
}

/// Canonical JSON-equivalent rendering: object keys sorted lexicographically
/// at every level, oversize strings replaced by a sentinel.
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            let effective = if s.chars().count() > LARGE_STRING_BOUND {
                LARGE_STRING_SENTINEL
            } else {
                s.as_str()
            };
            // serde_json string escaping keeps the rendering parseable
            out.push_str(&Value::String(effective.to_string()).to_string());
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
    }
}

/// Fingerprint of a payload's canonical rendering, hex-encoded SHA-256.
pub fn payload_fingerprint(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_string(value).as_bytes());
    hex::encode(hasher.finalize())
}

/// Diagnostic similarity between two hex digests: the fraction of matching
/// positions. Returns 1.0 iff equal, 0.0 for digests of different lengths.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return if a == b && !a.is_empty() { 1.0 } else { 0.0 };
    }
    let matching = a
        .bytes()
        .zip(b.bytes())
        .filter(|(x, y)| x == y)
        .count();
    matching as f64 / a.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TypeKind;
    use serde_json::json;

    fn obj_tree(fields: &[(&str, TypeKind)]) -> TypeTree {
        let mut root = TypeTree::leaf("", TypeKind::Object);
        for (name, kind) in fields {
            root.children
                .insert(name.to_string(), TypeTree::leaf(*name, *kind));
        }
        root
    }

    #[test]
    fn fingerprint_is_stable() {
        let tree = obj_tree(&[("id", TypeKind::Number)]);
        assert_eq!(structure_fingerprint(&tree), structure_fingerprint(&tree));
    }

    #[test]
    fn fingerprint_ignores_examples_and_paths() {
        let mut a = obj_tree(&[("id", TypeKind::Number)]);
        let mut b = a.clone();
        a.push_example(json!({"id": 1}), 10);
        b.children.get_mut("id").unwrap().path = "elsewhere".into();

        assert_eq!(structure_fingerprint(&a), structure_fingerprint(&b));
    }

    #[test]
    fn fingerprint_ignores_redaction_marks() {
        let a = obj_tree(&[("image", TypeKind::String)]);
        let mut b = a.clone();
        let img = b.children.get_mut("image").unwrap();
        img.redacted = true;
        img.redacted_original_kind = Some(crate::RedactTag::Base64);

        assert_eq!(structure_fingerprint(&a), structure_fingerprint(&b));
    }

    #[test]
    fn fingerprint_sees_optionality() {
        let a = obj_tree(&[("ts", TypeKind::Number)]);
        let mut b = a.clone();
        b.children.get_mut("ts").unwrap().optional = true;

        assert_ne!(structure_fingerprint(&a), structure_fingerprint(&b));
    }

    #[test]
    fn fingerprint_distinguishes_kinds_and_names() {
        let a = obj_tree(&[("v", TypeKind::Number)]);
        let b = obj_tree(&[("v", TypeKind::String)]);
        let c = obj_tree(&[("w", TypeKind::Number)]);

        assert_ne!(structure_fingerprint(&a), structure_fingerprint(&b));
        assert_ne!(structure_fingerprint(&a), structure_fingerprint(&c));
    }

    #[test]
    fn canonical_sorts_keys_at_every_level() {
        let v = json!({"b": {"d": 1, "c": 2}, "a": 3});
        assert_eq!(
            canonical_string(&v),
            r#"{"a":3,"b":{"c":2,"d":1}}"#
        );
    }

    #[test]
    fn canonical_collapses_large_strings() {
        let blob = "A".repeat(LARGE_STRING_BOUND + 1);
        let other = "B".repeat(LARGE_STRING_BOUND + 500);
        let a = json!({ "data": blob });
        let b = json!({ "data": other });

        assert_eq!(payload_fingerprint(&a), payload_fingerprint(&b));
    }

    #[test]
    fn canonical_keeps_strings_at_the_bound() {
        let exact = "A".repeat(LARGE_STRING_BOUND);
        let a = json!({ "data": exact });
        let b = json!({ "data": "A" });

        assert_ne!(payload_fingerprint(&a), payload_fingerprint(&b));
    }

    #[test]
    fn similarity_bounds() {
        let fp = structure_fingerprint(&obj_tree(&[("a", TypeKind::Null)]));
        assert_eq!(similarity(&fp, &fp), 1.0);
        assert_eq!(similarity(&fp, "abc"), 0.0);

        let other =
            structure_fingerprint(&obj_tree(&[("b", TypeKind::Null)]));
        let s = similarity(&fp, &other);
        assert!(s < 1.0 && s >= 0.0);
    }
}
