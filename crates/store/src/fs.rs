//! Filesystem schema store.
//!
//! One directory per kind (`/` in the kind nests a subdirectory). A save
//! rewrites every artifact through write-to-temp-then-rename under the
//! kind's writer lock, so readers either see the prior state or the new one,
//! never a torn update. A kind whose directory lost one of the required
//! artifacts (crash mid-save) is treated as absent and rebuilt from scratch
//! on the next payload.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use hookforge_common::{now_ms, sanitize_kind};
use hookforge_core::SchemaRecord;

use crate::errors::{StoreError, StoreResult};

/// Artifact file names that make a kind directory complete.
pub const REQUIRED_ARTIFACTS: [&str; 4] = [
    "metadata.json",
    "schema.validator.ts",
    "interface.ts",
    "examples.json",
];

const RAW_SAMPLES_DIR: &str = "raw-samples";

/// Disk usage summary for telemetry.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DiskCounters {
    pub kinds: usize,
    pub total_bytes: u64,
    pub bytes_by_section: HashMap<String, u64>,
}

pub struct FsSchemaStore {
    root: PathBuf,
    max_raw_samples: usize,
    locks: parking_lot::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl FsSchemaStore {
    pub async fn new(
        root: impl Into<PathBuf>,
        max_raw_samples: usize,
    ) -> StoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            max_raw_samples,
            locks: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    /// The per-kind writer lock. Workers hold this across
    /// load-merge-generate-save so writes for one kind serialize.
    pub fn kind_lock(&self, kind: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(kind.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn kind_dir(&self, kind: &str) -> StoreResult<PathBuf> {
        if kind.is_empty() {
            return Err(StoreError::InvalidKind(kind.to_string()));
        }
        let sanitized = sanitize_kind(kind);
        let mut dir = self.root.clone();
        for segment in sanitized.split('/') {
            dir.push(segment);
        }
        Ok(dir)
    }

    /// Load the persisted record for a kind, or `None` when the kind is
    /// unknown or its artifact set is incomplete.
    pub async fn load(&self, kind: &str) -> StoreResult<Option<SchemaRecord>> {
        let dir = self.kind_dir(kind)?;
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(None);
        }

        for name in REQUIRED_ARTIFACTS {
            if !tokio::fs::try_exists(dir.join(name)).await? {
                warn!(
                    kind = %kind,
                    missing = name,
                    "incomplete artifact set; treating kind as absent"
                );
                return Ok(None);
            }
        }

        let bytes = tokio::fs::read(dir.join("metadata.json")).await?;
        match serde_json::from_slice::<SchemaRecord>(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(
                    kind = %kind,
                    error = %e,
                    "unreadable metadata; treating kind as absent"
                );
                Ok(None)
            }
        }
    }

    /// Persist every artifact for a kind atomically with respect to readers.
    ///
    /// The raw sample is best-effort: its failure never fails the save.
    pub async fn save(
        &self,
        kind: &str,
        record: &SchemaRecord,
        validator_source: &str,
        interface_source: &str,
        examples_json: &str,
        raw_sample: Option<&Value>,
    ) -> StoreResult<()> {
        let dir = self.kind_dir(kind)?;
        tokio::fs::create_dir_all(&dir).await?;

        let metadata = serde_json::to_string_pretty(record)?;
        write_atomic(&dir.join("metadata.json"), metadata.as_bytes()).await?;
        write_atomic(
            &dir.join("schema.validator.ts"),
            validator_source.as_bytes(),
        )
        .await?;
        write_atomic(&dir.join("interface.ts"), interface_source.as_bytes())
            .await?;
        write_atomic(&dir.join("examples.json"), examples_json.as_bytes())
            .await?;

        if let Some(sample) = raw_sample {
            if let Err(e) = self.archive_raw_sample(&dir, sample).await {
                warn!(kind = %kind, error = %e, "raw sample archive failed");
            }
        }

        debug!(kind = %kind, version = record.version, "artifacts saved");
        Ok(())
    }

    /// Rewrite only `metadata.json`, leaving generated artifacts untouched.
    ///
    /// Used when a merge changed counters but not the structure: the
    /// validator and interface stay byte- and mtime-identical.
    pub async fn save_metadata(
        &self,
        kind: &str,
        record: &SchemaRecord,
    ) -> StoreResult<()> {
        let dir = self.kind_dir(kind)?;
        tokio::fs::create_dir_all(&dir).await?;
        let metadata = serde_json::to_string_pretty(record)?;
        write_atomic(&dir.join("metadata.json"), metadata.as_bytes()).await?;
        Ok(())
    }

    /// Archive one unredacted payload for a kind, best-effort.
    pub async fn archive_sample(
        &self,
        kind: &str,
        sample: &Value,
    ) -> StoreResult<()> {
        let dir = self.kind_dir(kind)?;
        self.archive_raw_sample(&dir, sample).await
    }

    async fn archive_raw_sample(
        &self,
        kind_dir: &Path,
        sample: &Value,
    ) -> StoreResult<()> {
        if self.max_raw_samples == 0 {
            return Ok(());
        }
        let samples_dir = kind_dir.join(RAW_SAMPLES_DIR);
        tokio::fs::create_dir_all(&samples_dir).await?;

        let path = samples_dir.join(format!("{}.json", now_ms()));
        let bytes = serde_json::to_vec_pretty(sample)?;
        write_atomic(&path, &bytes).await?;

        // Prune oldest until the cap holds. Names are unix-ms, so
        // lexicographic-by-length-then-value ordering equals age ordering;
        // sorting the numeric stems keeps it exact.
        let mut stems: Vec<i64> = Vec::new();
        let mut entries = tokio::fs::read_dir(&samples_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(stem) = name
                .to_str()
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<i64>().ok())
            {
                stems.push(stem);
            }
        }
        stems.sort_unstable();
        while stems.len() > self.max_raw_samples {
            let oldest = stems.remove(0);
            let victim = samples_dir.join(format!("{oldest}.json"));
            if let Err(e) = tokio::fs::remove_file(&victim).await {
                warn!(path = %victim.display(), error = %e, "sample prune failed");
                break;
            }
        }
        Ok(())
    }

    /// Enumerate every kind with a complete-enough directory (contains
    /// `metadata.json`), honoring `/` as the hierarchy separator.
    pub async fn list_kinds(&self) -> StoreResult<Vec<String>> {
        let mut kinds = Vec::new();
        let mut stack: Vec<(PathBuf, String)> =
            vec![(self.root.clone(), String::new())];

        while let Some((dir, prefix)) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let Some(name) = entry.file_name().to_str().map(String::from)
                else {
                    continue;
                };
                if name == RAW_SAMPLES_DIR {
                    continue;
                }
                let kind = if prefix.is_empty() {
                    name
                } else {
                    format!("{prefix}/{name}")
                };
                if tokio::fs::try_exists(path.join("metadata.json")).await? {
                    kinds.push(kind.clone());
                }
                stack.push((path, kind));
            }
        }

        kinds.sort();
        Ok(kinds)
    }

    /// Disk usage by artifact section, for the aggregates endpoint.
    pub async fn counters(&self) -> StoreResult<DiskCounters> {
        let mut counters = DiskCounters::default();
        let kinds = self.list_kinds().await?;
        counters.kinds = kinds.len();

        for kind in &kinds {
            let dir = self.kind_dir(kind)?;
            for name in REQUIRED_ARTIFACTS {
                if let Ok(meta) = tokio::fs::metadata(dir.join(name)).await {
                    let section = section_of(name);
                    *counters
                        .bytes_by_section
                        .entry(section.to_string())
                        .or_default() += meta.len();
                    counters.total_bytes += meta.len();
                }
            }
            let samples_dir = dir.join(RAW_SAMPLES_DIR);
            if let Ok(mut entries) = tokio::fs::read_dir(&samples_dir).await {
                while let Some(entry) = entries.next_entry().await? {
                    if let Ok(meta) = entry.metadata().await {
                        *counters
                            .bytes_by_section
                            .entry("raw_samples".to_string())
                            .or_default() += meta.len();
                        counters.total_bytes += meta.len();
                    }
                }
            }
        }
        Ok(counters)
    }
}

fn section_of(artifact: &str) -> &'static str {
    match artifact {
        "metadata.json" => "metadata",
        "schema.validator.ts" => "validators",
        "interface.ts" => "interfaces",
        "examples.json" => "examples",
        _ => "other",
    }
}

/// Write via a temp file in the same directory, then rename into place.
async fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let tmp = match (path.parent(), path.file_name().and_then(|n| n.to_str()))
    {
        (Some(parent), Some(name)) => parent.join(format!("{name}.tmp")),
        _ => return Err(StoreError::InvalidKind(path.display().to_string())),
    };
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hookforge_core::{TypeKind, TypeTree};
    use serde_json::json;

    fn record(kind: &str) -> SchemaRecord {
        let mut tree = TypeTree::leaf("", TypeKind::Object);
        tree.children
            .insert("id".into(), TypeTree::leaf("id", TypeKind::Number));
        SchemaRecord::new(kind, tree, Utc::now())
    }

    async fn store(max_samples: usize) -> (tempfile::TempDir, FsSchemaStore) {
        let dir = tempfile::tempdir().unwrap();
        let store =
            FsSchemaStore::new(dir.path().join("schemas"), max_samples)
                .await
                .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let (_tmp, store) = store(10).await;
        let rec = record("Ping");

        store
            .save("Ping", &rec, "// v", "// i", "[]", None)
            .await
            .unwrap();
        let loaded = store.load("Ping").await.unwrap().unwrap();
        assert_eq!(loaded, rec);
    }

    #[tokio::test]
    async fn unknown_kind_loads_as_none() {
        let (_tmp, store) = store(10).await;
        assert!(store.load("Nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hierarchical_kinds_nest_directories() {
        let (_tmp, store) = store(10).await;
        let kind = "whatsapp_business_account/messages_image";
        store
            .save(kind, &record(kind), "v", "i", "[]", None)
            .await
            .unwrap();

        let dir = store.kind_dir(kind).unwrap();
        assert!(dir.ends_with("whatsapp_business_account/messages_image"));
        assert!(dir.join("metadata.json").exists());

        assert_eq!(store.list_kinds().await.unwrap(), vec![kind.to_string()]);
    }

    #[tokio::test]
    async fn incomplete_artifact_set_reads_as_absent() {
        let (_tmp, store) = store(10).await;
        store
            .save("Ping", &record("Ping"), "v", "i", "[]", None)
            .await
            .unwrap();

        let dir = store.kind_dir("Ping").unwrap();
        tokio::fs::remove_file(dir.join("interface.ts")).await.unwrap();

        assert!(store.load("Ping").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn raw_samples_are_pruned_to_the_cap() {
        let (_tmp, store) = store(3).await;
        let rec = record("Pic");

        for i in 0..6 {
            store
                .save(
                    "Pic",
                    &rec,
                    "v",
                    "i",
                    "[]",
                    Some(&json!({ "n": i })),
                )
                .await
                .unwrap();
            // now_ms-named files need distinct timestamps
            tokio::time::sleep(std::time::Duration::from_millis(3)).await;
        }

        let samples_dir = store.kind_dir("Pic").unwrap().join(RAW_SAMPLES_DIR);
        let mut count = 0;
        let mut newest_payload = None;
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&samples_dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            count += 1;
            names.push(entry.file_name().to_str().unwrap().to_string());
        }
        names.sort();
        if let Some(newest) = names.last() {
            let bytes =
                tokio::fs::read(samples_dir.join(newest)).await.unwrap();
            newest_payload =
                Some(serde_json::from_slice::<Value>(&bytes).unwrap());
        }

        assert_eq!(count, 3);
        assert_eq!(newest_payload.unwrap(), json!({ "n": 5 }));
    }

    #[tokio::test]
    async fn list_kinds_skips_plain_and_sample_directories() {
        let (_tmp, store) = store(2).await;
        store
            .save(
                "Pic",
                &record("Pic"),
                "v",
                "i",
                "[]",
                Some(&json!({"x": 1})),
            )
            .await
            .unwrap();
        store
            .save("a/b", &record("a/b"), "v", "i", "[]", None)
            .await
            .unwrap();

        let kinds = store.list_kinds().await.unwrap();
        assert_eq!(kinds, vec!["Pic".to_string(), "a/b".to_string()]);
    }

    #[tokio::test]
    async fn counters_track_sections() {
        let (_tmp, store) = store(5).await;
        store
            .save(
                "Ping",
                &record("Ping"),
                "validator body",
                "interface body",
                "[]",
                Some(&json!({"raw": true})),
            )
            .await
            .unwrap();

        let counters = store.counters().await.unwrap();
        assert_eq!(counters.kinds, 1);
        assert!(counters.total_bytes > 0);
        assert!(counters.bytes_by_section["validators"] > 0);
        assert!(counters.bytes_by_section["raw_samples"] > 0);
    }

    #[tokio::test]
    async fn kind_lock_is_shared_per_kind() {
        let (_tmp, store) = store(1).await;
        let a = store.kind_lock("X");
        let b = store.kind_lock("X");
        let c = store.kind_lock("Y");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
