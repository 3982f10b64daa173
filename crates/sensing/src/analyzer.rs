//! Payload analysis: one payload in, one type tree out.

use serde_json::Value;

use hookforge_core::{
    value_kind, RedactionReport, TypeKind, TypeTree,
    tree::PERSISTED_EXAMPLE_CAP,
};

/// Sample elements retained on a synthesized union item node.
pub const UNION_SAMPLE_CAP: usize = 5;

/// Build a type tree from a redacted payload and its redaction report.
///
/// Every node records its own subvalue as the first example and is marked
/// redacted when its path appears in the report. Optionality is never set
/// here; it only emerges from merging.
pub fn analyze(payload: &Value, report: &RedactionReport) -> TypeTree {
    build(payload, String::new(), report)
}

fn build(value: &Value, path: String, report: &RedactionReport) -> TypeTree {
    let mut node = TypeTree::leaf(path.clone(), value_kind(value));
    node.push_example(value.clone(), PERSISTED_EXAMPLE_CAP);

    if let Some(redaction) = report.get(&path) {
        node.redacted = true;
        node.redacted_original_kind = Some(redaction.tag);
    }

    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                node.children
                    .insert(key.clone(), build(child, child_path, report));
            }
        }
        Value::Array(items) if !items.is_empty() => {
            node.item_type = Some(Box::new(item_node(items, &path, report)));
        }
        _ => {}
    }

    node
}

/// Item type for a non-empty array.
///
/// With a single element kind the first element's tree stands in for all of
/// them; further evidence arrives through merging. With mixed kinds a
/// synthetic `[*]`-path union node carries one subtree per observed kind and
/// a handful of sample elements.
fn item_node(
    items: &[Value],
    path: &str,
    report: &RedactionReport,
) -> TypeTree {
    let first_kind = value_kind(&items[0]);
    let homogeneous =
        items.iter().all(|item| value_kind(item) == first_kind);

    if homogeneous {
        return build(&items[0], format!("{path}[0]"), report);
    }

    let union_path = format!("{path}[*]");
    let mut union = TypeTree::leaf(union_path.clone(), TypeKind::Union);
    for item in items.iter().take(UNION_SAMPLE_CAP) {
        union.push_example(item.clone(), UNION_SAMPLE_CAP);
    }

    for item in items {
        let tag = value_kind(item).as_str().to_string();
        if !union.children.contains_key(&tag) {
            union
                .children
                .insert(tag, build(item, union_path.clone(), report));
        }
    }

    union
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn analyze_plain(payload: &Value) -> TypeTree {
        analyze(payload, &RedactionReport::default())
    }

    #[test]
    fn root_example_is_the_payload() {
        let payload = json!({"eventType": "Ping", "ts": 1});
        let tree = analyze_plain(&payload);
        assert_eq!(tree.kind, TypeKind::Object);
        assert_eq!(tree.examples[0], payload);
    }

    #[test]
    fn paths_follow_dot_and_bracket_notation() {
        let payload = json!({"a": {"b": [ {"c": 1} ]}});
        let tree = analyze_plain(&payload);

        let a = &tree.children["a"];
        assert_eq!(a.path, "a");
        let b = &a.children["b"];
        assert_eq!(b.path, "a.b");
        let item = b.item_type.as_deref().unwrap();
        assert_eq!(item.path, "a.b[0]");
        assert_eq!(item.children["c"].path, "a.b[0].c");
    }

    #[test]
    fn nothing_is_optional_initially() {
        let tree = analyze_plain(&json!({"a": 1, "b": {"c": null}}));
        let mut any_optional = false;
        tree.walk(&mut |n| any_optional |= n.optional);
        assert!(!any_optional);
    }

    #[test]
    fn empty_containers_are_valid_leaves() {
        let obj = analyze_plain(&json!({}));
        assert_eq!(obj.kind, TypeKind::Object);
        assert!(obj.children.is_empty());

        let arr = analyze_plain(&json!([]));
        assert_eq!(arr.kind, TypeKind::Array);
        assert!(arr.item_type.is_none());
    }

    #[test]
    fn heterogeneous_array_synthesizes_union_item() {
        let tree = analyze_plain(&json!({"v": [1, "x", true]}));
        let v = &tree.children["v"];
        assert_eq!(v.kind, TypeKind::Array);

        let item = v.item_type.as_deref().unwrap();
        assert_eq!(item.kind, TypeKind::Union);
        assert_eq!(item.path, "v[*]");
        let tags: Vec<&str> =
            item.children.keys().map(String::as_str).collect();
        assert_eq!(tags, vec!["boolean", "number", "string"]);
        assert_eq!(item.examples.len(), 3);
    }

    #[test]
    fn union_samples_are_capped() {
        let mixed = json!([1, "a", true, 2, "b", false, 3, "c"]);
        let tree = analyze_plain(&mixed);
        let item = tree.item_type.as_deref().unwrap();
        assert!(item.examples.len() <= UNION_SAMPLE_CAP);
    }

    #[test]
    fn redaction_marks_are_linked_by_path() {
        use hookforge_core::{RedactTag, Redaction};

        let payload = json!({"media": {"image": "abc...[TRUNCATED]"}});
        let mut report = RedactionReport::default();
        report.push(Redaction {
            path: "media.image".into(),
            original_length: 9000,
            redacted_length: 114,
            tag: RedactTag::Base64,
        });

        let tree = analyze(&payload, &report);
        let image = &tree.children["media"].children["image"];
        assert!(image.redacted);
        assert_eq!(image.redacted_original_kind, Some(RedactTag::Base64));
        assert!(!tree.children["media"].redacted);
    }

    #[test]
    fn null_is_a_kind_of_its_own() {
        let tree = analyze_plain(&json!({"gone": null}));
        assert_eq!(tree.children["gone"].kind, TypeKind::Null);
    }
}
