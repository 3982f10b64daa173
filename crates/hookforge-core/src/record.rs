//! Persisted per-kind state and the append-only event row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::structure_fingerprint;
use crate::tree::TypeTree;

/// Cap on retained structural variations per kind.
pub const MAX_VARIATIONS: usize = 10;

/// Disjoint censuses of dotted field paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSets {
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub redacted: Vec<String>,
}

impl FieldSets {
    /// Walk a tree and partition every non-root path by optionality, with
    /// redacted paths recorded separately (they also appear in one of the
    /// two primary sets).
    pub fn from_tree(tree: &TypeTree) -> Self {
        let mut sets = FieldSets::default();
        tree.walk(&mut |node| {
            if node.path.is_empty() {
                return;
            }
            if node.optional {
                sets.optional.push(node.path.clone());
            } else {
                sets.required.push(node.path.clone());
            }
            if node.redacted {
                sets.redacted.push(node.path.clone());
            }
        });
        sets.required.sort();
        sets.required.dedup();
        sets.optional.sort();
        sets.optional.dedup();
        sets.redacted.sort();
        sets.redacted.dedup();
        sets
    }
}

/// A historically-observed distinct structure for a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    pub tree_fingerprint: String,
    pub count: u64,
    pub description: String,
}

/// The persisted per-kind schema state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaRecord {
    pub kind: String,

    /// Monotonically increasing; bumped whenever a merge changes the
    /// structure fingerprint.
    pub version: u64,

    pub structure_fingerprint: String,

    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,

    pub total_received: u64,

    pub fields: FieldSets,

    /// Bounded, ordered by count descending.
    #[serde(default)]
    pub variations: Vec<Variation>,

    /// The full tree; sufficient to reconstruct state without any other
    /// artifact.
    pub saved_tree: TypeTree,
}

impl SchemaRecord {
    /// Build the version-1 record for a freshly observed kind.
    pub fn new(kind: impl Into<String>, tree: TypeTree, now: DateTime<Utc>) -> Self {
        let fingerprint = structure_fingerprint(&tree);
        let fields = FieldSets::from_tree(&tree);
        let mut record = Self {
            kind: kind.into(),
            version: 1,
            structure_fingerprint: fingerprint.clone(),
            first_seen: now,
            last_seen: now,
            last_modified: now,
            total_received: 1,
            fields,
            variations: Vec::new(),
            saved_tree: tree,
        };
        record.record_variation(fingerprint, "initial structure".to_string());
        record
    }

    /// Replace the tree after a structural change, refreshing the derived
    /// fields and bumping the version.
    pub fn apply_merged_tree(
        &mut self,
        tree: TypeTree,
        fingerprint: String,
        description: String,
        now: DateTime<Utc>,
    ) {
        self.version += 1;
        self.structure_fingerprint = fingerprint.clone();
        self.fields = FieldSets::from_tree(&tree);
        self.saved_tree = tree;
        self.last_modified = now;
        self.record_variation(fingerprint, description);
    }

    /// Count an observation that did not change the structure.
    pub fn record_observation(&mut self, now: DateTime<Utc>) {
        self.total_received += 1;
        self.last_seen = now;
        let fingerprint = self.structure_fingerprint.clone();
        self.bump_variation_count(&fingerprint);
    }

    fn bump_variation_count(&mut self, fingerprint: &str) {
        if let Some(v) = self
            .variations
            .iter_mut()
            .find(|v| v.tree_fingerprint == fingerprint)
        {
            v.count += 1;
        }
        self.variations.sort_by(|a, b| b.count.cmp(&a.count));
    }

    /// Track a structure fingerprint in the bounded variation set.
    pub fn record_variation(&mut self, fingerprint: String, description: String) {
        if let Some(v) = self
            .variations
            .iter_mut()
            .find(|v| v.tree_fingerprint == fingerprint)
        {
            v.count += 1;
        } else {
            self.variations.push(Variation {
                tree_fingerprint: fingerprint,
                count: 1,
                description,
            });
        }
        self.variations.sort_by(|a, b| b.count.cmp(&a.count));
        self.variations.truncate(MAX_VARIATIONS);
    }
}

/// One row appended to the event log per successfully processed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRow {
    pub kind: String,
    pub payload_fingerprint: String,
    pub size_original: u64,
    pub size_redacted: u64,
    pub redacted_field_count: u64,
    pub received_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub processing_duration_ms: u64,
}
