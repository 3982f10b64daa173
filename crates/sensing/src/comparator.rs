//! Tree merging and difference enumeration.
//!
//! `merge` is the schema-drift engine: it folds fresh evidence into the
//! persisted tree. The result is associative and commutative up to example
//! ordering, which the structure fingerprint ignores, and idempotent on
//! identical inputs.

use std::collections::BTreeSet;

use serde_json::Value;

use hookforge_core::{
    canonical_string, RedactTag, TypeKind, TypeTree,
};

/// Merge prior tree `a` with freshly analyzed tree `b`.
///
/// `example_cap` bounds the per-node example list during the merge; the
/// caller trims further before persisting.
pub fn merge(a: &TypeTree, b: &TypeTree, example_cap: usize) -> TypeTree {
    if a.kind == b.kind && a.kind != TypeKind::Union {
        return merge_same_kind(a, b, example_cap);
    }
    merge_unions(&to_union(a), &to_union(b), example_cap)
}

fn merge_same_kind(
    a: &TypeTree,
    b: &TypeTree,
    example_cap: usize,
) -> TypeTree {
    let mut out = TypeTree::leaf(a.path.clone(), a.kind);
    out.optional = a.optional || b.optional;
    out.examples = merged_examples(&a.examples, &b.examples, example_cap);
    merge_redaction(&mut out, a, b);

    // Children rule: union of keys; a key seen on only one side is optional.
    let keys: BTreeSet<&String> =
        a.children.keys().chain(b.children.keys()).collect();
    for key in keys {
        let merged_child = match (a.children.get(key), b.children.get(key)) {
            (Some(ca), Some(cb)) => merge(ca, cb, example_cap),
            (Some(ca), None) => optional_copy(ca),
            (None, Some(cb)) => optional_copy(cb),
            (None, None) => unreachable!(),
        };
        out.children.insert(key.clone(), merged_child);
    }

    // Array item rule.
    out.item_type = match (a.item_type.as_deref(), b.item_type.as_deref()) {
        (Some(ia), Some(ib)) => Some(Box::new(merge(ia, ib, example_cap))),
        (Some(ia), None) => Some(Box::new(ia.clone())),
        (None, Some(ib)) => Some(Box::new(ib.clone())),
        (None, None) => None,
    };

    out
}

/// Merge two union nodes: variants pair up by kind tag. A variant observed
/// on one side only is carried as-is; variant membership is not optionality.
fn merge_unions(
    a: &TypeTree,
    b: &TypeTree,
    example_cap: usize,
) -> TypeTree {
    let mut out = TypeTree::leaf(a.path.clone(), TypeKind::Union);
    out.optional = a.optional || b.optional;
    out.examples = merged_examples(&a.examples, &b.examples, example_cap);
    merge_redaction(&mut out, a, b);

    let tags: BTreeSet<&String> =
        a.children.keys().chain(b.children.keys()).collect();
    for tag in tags {
        let merged_variant = match (a.children.get(tag), b.children.get(tag)) {
            (Some(va), Some(vb)) => merge(va, vb, example_cap),
            (Some(va), None) => va.clone(),
            (None, Some(vb)) => vb.clone(),
            (None, None) => unreachable!(),
        };
        out.children.insert(tag.clone(), merged_variant);
    }

    out
}

/// Lift a non-union node into a single-variant union keyed by its kind tag.
fn to_union(t: &TypeTree) -> TypeTree {
    if t.kind == TypeKind::Union {
        return t.clone();
    }
    let mut wrapper = TypeTree::leaf(t.path.clone(), TypeKind::Union);
    wrapper.optional = t.optional;
    wrapper.redacted = t.redacted;
    wrapper.redacted_original_kind = t.redacted_original_kind;
    wrapper.examples = t.examples.clone();

    let mut variant = t.clone();
    variant.optional = false;
    wrapper
        .children
        .insert(t.kind.as_str().to_string(), variant);
    wrapper
}

fn optional_copy(t: &TypeTree) -> TypeTree {
    let mut copy = t.clone();
    copy.optional = true;
    copy
}

fn merge_redaction(out: &mut TypeTree, a: &TypeTree, b: &TypeTree) {
    out.redacted = a.redacted || b.redacted;
    out.redacted_original_kind =
        match (a.redacted_original_kind, b.redacted_original_kind) {
            (Some(ta), Some(tb)) if ta != tb => {
                // Older evidence wins unless the newer is base64, which is
                // strictly more informative.
                if tb == RedactTag::Base64 {
                    Some(tb)
                } else {
                    Some(ta)
                }
            }
            (Some(ta), _) => Some(ta),
            (None, tb) => tb,
        };
}

/// Concatenate example lists, dropping JSON-equal duplicates; the most
/// recent occurrence wins and the newest `cap` entries are retained.
fn merged_examples(a: &[Value], b: &[Value], cap: usize) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(a.len() + b.len());
    for value in a.iter().chain(b.iter()) {
        let canon = canonical_string(value);
        out.retain(|existing| canonical_string(existing) != canon);
        out.push(value.clone());
    }
    let len = out.len();
    if len > cap {
        out.drain(0..len - cap);
    }
    out
}

/// One structural difference between two trees.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Difference {
    TypeChange {
        path: String,
        old: TypeKind,
        new: TypeKind,
    },
    OptionalChange {
        path: String,
        was: bool,
        is: bool,
    },
    FieldAdded {
        path: String,
        field: String,
    },
    FieldRemoved {
        path: String,
        field: String,
    },
}

/// Enumerate differences between prior tree `a` and new tree `b`.
///
/// Operator-facing only; the merge never consults this.
pub fn diff(a: &TypeTree, b: &TypeTree) -> Vec<Difference> {
    let mut out = Vec::new();
    diff_inner(a, b, &mut out);
    out
}

fn diff_inner(a: &TypeTree, b: &TypeTree, out: &mut Vec<Difference>) {
    if a.kind != b.kind {
        out.push(Difference::TypeChange {
            path: a.path.clone(),
            old: a.kind,
            new: b.kind,
        });
    }
    if a.optional != b.optional {
        out.push(Difference::OptionalChange {
            path: a.path.clone(),
            was: a.optional,
            is: b.optional,
        });
    }

    let keys: BTreeSet<&String> =
        a.children.keys().chain(b.children.keys()).collect();
    for key in keys {
        match (a.children.get(key), b.children.get(key)) {
            (Some(ca), Some(cb)) => diff_inner(ca, cb, out),
            (Some(_), None) => out.push(Difference::FieldRemoved {
                path: a.path.clone(),
                field: key.to_string(),
            }),
            (None, Some(_)) => out.push(Difference::FieldAdded {
                path: a.path.clone(),
                field: key.to_string(),
            }),
            (None, None) => unreachable!(),
        }
    }

    match (a.item_type.as_deref(), b.item_type.as_deref()) {
        (Some(ia), Some(ib)) => diff_inner(ia, ib, out),
        (Some(_), None) => out.push(Difference::FieldRemoved {
            path: a.path.clone(),
            field: "[]".to_string(),
        }),
        (None, Some(_)) => out.push(Difference::FieldAdded {
            path: a.path.clone(),
            field: "[]".to_string(),
        }),
        (None, None) => {}
    }
}

/// Short human-readable summary of a difference set.
pub fn describe_differences(diffs: &[Difference]) -> String {
    if diffs.is_empty() {
        return "no structural change".to_string();
    }
    let parts: Vec<String> = diffs
        .iter()
        .take(4)
        .map(|d| match d {
            Difference::TypeChange { path, old, new } => {
                format!("{path}: {old} -> {new}")
            }
            Difference::OptionalChange { path, is, .. } => {
                if *is {
                    format!("{path} became optional")
                } else {
                    format!("{path} became required")
                }
            }
            Difference::FieldAdded { path, field } => {
                if path.is_empty() {
                    format!("+{field}")
                } else {
                    format!("+{path}.{field}")
                }
            }
            Difference::FieldRemoved { path, field } => {
                if path.is_empty() {
                    format!("-{field}")
                } else {
                    format!("-{path}.{field}")
                }
            }
        })
        .collect();
    let mut text = parts.join(", ");
    if diffs.len() > 4 {
        text.push_str(&format!(" (+{} more)", diffs.len() - 4));
    }
    text
}

/// Diagnostic subset check: every required child of `sub` exists in `sup`
/// with a compatible kind, and `sup` is nowhere more optional than `sub`.
/// A union is compatible with any kind.
pub fn is_subset(sub: &TypeTree, sup: &TypeTree) -> bool {
    let kinds_compatible = sub.kind == sup.kind
        || sub.kind == TypeKind::Union
        || sup.kind == TypeKind::Union;
    if !kinds_compatible {
        return false;
    }
    if sup.optional && !sub.optional {
        return false;
    }

    for (key, sub_child) in &sub.children {
        if sub_child.optional {
            continue;
        }
        match sup.children.get(key) {
            Some(sup_child) => {
                if !is_subset(sub_child, sup_child) {
                    return false;
                }
            }
            None => return false,
        }
    }

    match (sub.item_type.as_deref(), sup.item_type.as_deref()) {
        (Some(si), Some(pi)) => is_subset(si, pi),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use hookforge_core::{
        structure_fingerprint, RedactionReport,
    };
    use serde_json::json;

    const CAP: usize = 20;

    fn tree_of(payload: serde_json::Value) -> TypeTree {
        analyze(&payload, &RedactionReport::default())
    }

    #[test]
    fn merge_is_idempotent_on_identical_trees() {
        let t = tree_of(json!({"a": 1, "b": {"c": [true]}}));
        let merged = merge(&t, &t, CAP);
        assert_eq!(
            structure_fingerprint(&merged),
            structure_fingerprint(&t)
        );
    }

    #[test]
    fn merge_is_commutative_up_to_examples() {
        let a = tree_of(json!({"a": 1, "only_a": "x"}));
        let b = tree_of(json!({"a": "one", "only_b": true}));
        assert_eq!(
            structure_fingerprint(&merge(&a, &b, CAP)),
            structure_fingerprint(&merge(&b, &a, CAP))
        );
    }

    #[test]
    fn merge_is_associative_on_fingerprints() {
        let a = tree_of(json!({"v": 1}));
        let b = tree_of(json!({"v": "one", "w": true}));
        let c = tree_of(json!({"v": [1], "x": null}));

        let left = merge(&merge(&a, &b, CAP), &c, CAP);
        let right = merge(&a, &merge(&b, &c, CAP), CAP);
        assert_eq!(
            structure_fingerprint(&left),
            structure_fingerprint(&right)
        );
    }

    #[test]
    fn missing_field_becomes_optional_and_stays_optional() {
        let full = tree_of(json!({"eventType": "Ping", "ts": 1}));
        let partial = tree_of(json!({"eventType": "Ping"}));

        let merged = merge(&full, &partial, CAP);
        assert!(merged.children["ts"].optional);
        assert!(!merged.children["eventType"].optional);

        // R2: a later payload carrying the field again does not un-set it
        let again = merge(&merged, &full, CAP);
        assert!(again.children["ts"].optional);
    }

    #[test]
    fn kind_conflict_produces_union_with_both_variants() {
        let a = tree_of(json!({"v": 1}));
        let b = tree_of(json!({"v": "one"}));

        let merged = merge(&a, &b, CAP);
        let v = &merged.children["v"];
        assert_eq!(v.kind, TypeKind::Union);
        assert!(v.children.contains_key("number"));
        assert!(v.children.contains_key("string"));
    }

    #[test]
    fn union_absorbs_further_shapes() {
        let a = tree_of(json!({"v": 1}));
        let b = tree_of(json!({"v": "one"}));
        let c = tree_of(json!({"v": true}));

        let merged = merge(&merge(&a, &b, CAP), &c, CAP);
        let v = &merged.children["v"];
        assert_eq!(v.kind, TypeKind::Union);
        assert_eq!(v.children.len(), 3);

        // Merging yet another already-seen shape stays a union (R3)
        let again = merge(&merged, &a, CAP);
        assert_eq!(again.children["v"].kind, TypeKind::Union);
        assert_eq!(again.children["v"].children.len(), 3);
    }

    #[test]
    fn examples_concatenate_dedupe_and_cap() {
        let mut a = TypeTree::leaf("", TypeKind::Number);
        let mut b = TypeTree::leaf("", TypeKind::Number);
        for i in 0..15 {
            a.push_example(json!(i), 20);
        }
        for i in 10..25 {
            b.push_example(json!(i), 20);
        }

        let merged = merge(&a, &b, 20);
        assert_eq!(merged.examples.len(), 20);
        // most recent wins: 5..24 retained, duplicates 10..14 kept once
        assert_eq!(merged.examples[0], json!(5));
        assert_eq!(merged.examples[19], json!(24));
    }

    #[test]
    fn redaction_merge_prefers_base64_over_older_tag() {
        use hookforge_core::RedactTag;

        let mut a = TypeTree::leaf("x", TypeKind::String);
        a.redacted = true;
        a.redacted_original_kind = Some(RedactTag::Text);
        let mut b = TypeTree::leaf("x", TypeKind::String);
        b.redacted = true;
        b.redacted_original_kind = Some(RedactTag::Base64);

        let ab = merge(&a, &b, CAP);
        assert_eq!(ab.redacted_original_kind, Some(RedactTag::Base64));

        // Older evidence wins for non-base64 disagreements
        let mut c = TypeTree::leaf("x", TypeKind::String);
        c.redacted = true;
        c.redacted_original_kind = Some(RedactTag::Json);
        let ac = merge(&a, &c, CAP);
        assert_eq!(ac.redacted_original_kind, Some(RedactTag::Text));

        // Plain node merged with a redacted one stays redacted
        let plain = TypeTree::leaf("x", TypeKind::String);
        let merged = merge(&plain, &b, CAP);
        assert!(merged.redacted);
    }

    #[test]
    fn item_types_merge_recursively() {
        let a = tree_of(json!({"list": [{"x": 1}]}));
        let b = tree_of(json!({"list": [{"x": 1, "y": "s"}]}));

        let merged = merge(&a, &b, CAP);
        let item =
            merged.children["list"].item_type.as_deref().unwrap();
        assert!(!item.children["x"].optional);
        assert!(item.children["y"].optional);
    }

    #[test]
    fn diff_enumerates_all_four_shapes() {
        let a = tree_of(json!({"v": 1, "gone": true, "list": []}));
        let mut b = tree_of(json!({"v": "one", "fresh": 1, "list": []}));
        b.children.get_mut("v").unwrap().optional = true;

        let diffs = diff(&a, &b);
        assert!(diffs.contains(&Difference::TypeChange {
            path: "v".into(),
            old: TypeKind::Number,
            new: TypeKind::String,
        }));
        assert!(diffs.contains(&Difference::OptionalChange {
            path: "v".into(),
            was: false,
            is: true,
        }));
        assert!(diffs.contains(&Difference::FieldAdded {
            path: "".into(),
            field: "fresh".into(),
        }));
        assert!(diffs.contains(&Difference::FieldRemoved {
            path: "".into(),
            field: "gone".into(),
        }));
    }

    #[test]
    fn diff_of_identical_trees_is_empty() {
        let t = tree_of(json!({"a": {"b": [1]}}));
        assert!(diff(&t, &t).is_empty());
    }

    #[test]
    fn describe_differences_summarizes() {
        let a = tree_of(json!({"v": 1}));
        let b = tree_of(json!({"v": "one", "w": 2}));
        let text = describe_differences(&diff(&a, &b));
        assert!(text.contains("v: number -> string"));
        assert!(text.contains("+w"));

        assert_eq!(describe_differences(&[]), "no structural change");
    }

    #[test]
    fn subset_accepts_equal_and_union_supersets() {
        let sub = tree_of(json!({"a": 1}));
        assert!(is_subset(&sub, &sub));

        let sup = merge(
            &tree_of(json!({"a": 1})),
            &tree_of(json!({"a": "one"})),
            CAP,
        );
        assert!(is_subset(&sub, &sup));
    }

    #[test]
    fn subset_rejects_missing_required_child() {
        let sub = tree_of(json!({"a": 1, "b": 2}));
        let sup = tree_of(json!({"a": 1}));
        assert!(!is_subset(&sub, &sup));
    }

    #[test]
    fn subset_rejects_extra_optionality_in_superset() {
        let sub = tree_of(json!({"a": 1}));
        let mut sup = tree_of(json!({"a": 1}));
        sup.children.get_mut("a").unwrap().optional = true;
        assert!(!is_subset(&sub, &sup));
    }
}
