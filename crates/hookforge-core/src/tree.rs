//! The inferred type tree.
//!
//! A `TypeTree` is the recursive structural description of every payload a
//! kind has ever carried. Object children live in a `BTreeMap` so that the
//! structural hash can walk keys in lexicographic order without sorting.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fingerprint::canonical_string;
use crate::redaction::RedactTag;

/// Closed set of node kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    String,
    Number,
    Boolean,
    Null,
    Object,
    Array,
    Union,
}

impl TypeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::String => "string",
            TypeKind::Number => "number",
            TypeKind::Boolean => "boolean",
            TypeKind::Null => "null",
            TypeKind::Object => "object",
            TypeKind::Array => "array",
            TypeKind::Union => "union",
        }
    }
}

impl std::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of the inferred structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeTree {
    /// Dot-and-bracket path from the root; `""` at the root itself.
    pub path: String,

    pub kind: TypeKind,

    /// Presence of this node is not guaranteed across observed payloads.
    /// Once set it never clears.
    #[serde(default)]
    pub optional: bool,

    /// For `object` nodes: field name to subtree. For `union` nodes: variant
    /// kind tag (`"string"`, `"object"`, ...) to the subtree observed under
    /// that tag.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, TypeTree>,

    /// For `array` nodes: the merged element type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<Box<TypeTree>>,

    /// Bounded set of distinct representative values, most recent last.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,

    /// Node was produced from a truncated source string.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub redacted: bool,

    /// Heuristic guess of what the original string held, when redacted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacted_original_kind: Option<RedactTag>,
}

/// Cap on examples in the persisted record.
pub const PERSISTED_EXAMPLE_CAP: usize = 10;

impl TypeTree {
    /// A childless node of the given kind.
    pub fn leaf(path: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            optional: false,
            children: BTreeMap::new(),
            item_type: None,
            examples: Vec::new(),
            redacted: false,
            redacted_original_kind: None,
        }
    }

    /// Record an example value, keeping at most `cap` distinct entries.
    ///
    /// Distinctness is JSON equality under canonical serialization; a
    /// re-observed value moves to the most-recent position.
    pub fn push_example(&mut self, value: Value, cap: usize) {
        if cap == 0 {
            return;
        }
        let canon = canonical_string(&value);
        self.examples
            .retain(|existing| canonical_string(existing) != canon);
        self.examples.push(value);
        let len = self.examples.len();
        if len > cap {
            self.examples.drain(0..len - cap);
        }
    }

    /// Recursively trim every node's examples to `cap`, dropping oldest.
    pub fn cap_examples(&mut self, cap: usize) {
        let len = self.examples.len();
        if len > cap {
            self.examples.drain(0..len - cap);
        }
        for child in self.children.values_mut() {
            child.cap_examples(cap);
        }
        if let Some(item) = self.item_type.as_mut() {
            item.cap_examples(cap);
        }
    }

    /// Visit every node in the tree, parents before children.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a TypeTree)) {
        visit(self);
        for child in self.children.values() {
            child.walk(visit);
        }
        if let Some(item) = self.item_type.as_deref() {
            item.walk(visit);
        }
    }

    /// Largest number of examples held by any single node.
    pub fn max_examples(&self) -> usize {
        let mut max = 0;
        self.walk(&mut |node| max = max.max(node.examples.len()));
        max
    }

    /// Total node count, for diagnostics.
    pub fn node_count(&self) -> usize {
        let mut n = 0;
        self.walk(&mut |_| n += 1);
        n
    }
}
