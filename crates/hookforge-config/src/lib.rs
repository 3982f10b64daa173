//! Configuration surface for hookforge.
//!
//! Loaded from a YAML file with `${ENV}` interpolation, then overridden by
//! a fixed set of well-known environment variables so deployments can tune
//! the service without editing the file.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory for per-kind schema artifacts.
    pub data_dir: PathBuf,

    /// SQLite database for the event log.
    pub event_db_path: PathBuf,

    /// SQLite database backing the durable job queue.
    pub queue_db_path: PathBuf,

    /// Address the HTTP API binds to.
    pub api_addr: String,

    /// Seconds allowed for in-flight jobs to finish on shutdown.
    pub shutdown_grace_secs: u64,

    pub truncate: TruncateConfig,
    pub samples: SampleConfig,
    pub queue: QueueConfig,
    pub vendor: VendorConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/schemas"),
            event_db_path: PathBuf::from("./data/hookforge.db"),
            queue_db_path: PathBuf::from("./data/queue.db"),
            api_addr: "0.0.0.0:8080".to_string(),
            shutdown_grace_secs: 10,
            truncate: TruncateConfig::default(),
            samples: SampleConfig::default(),
            queue: QueueConfig::default(),
            vendor: VendorConfig::default(),
        }
    }
}

/// Controls the size-bounded field redactor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncateConfig {
    /// Characters retained when a string is truncated.
    pub max_length: usize,

    /// Field-name substrings (matched case-insensitively against the final
    /// path segment) that always trigger truncation of long strings.
    pub fields: Vec<String>,
}

impl Default for TruncateConfig {
    fn default() -> Self {
        Self {
            max_length: 100,
            fields: default_truncate_fields(),
        }
    }
}

fn default_truncate_fields() -> Vec<String> {
    ["base64", "jpegthumbnail", "thumbnail", "data", "image"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Caps on retained sample material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleConfig {
    /// Unredacted payloads archived per kind.
    pub max_raw_samples: usize,

    /// Examples retained on a tree node while merging; the persisted record
    /// keeps at most half of this.
    pub max_examples_per_schema: usize,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            max_raw_samples: 10,
            max_examples_per_schema: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Worker pool size.
    pub concurrency: usize,

    /// Attempts before a job lands in the failed set.
    pub max_attempts: u32,

    /// Initial retry backoff in milliseconds; doubles per attempt.
    pub backoff_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_attempts: 3,
            backoff_delay_ms: 2000,
        }
    }
}

/// Vendor markers consulted by the classifier's provider-shape rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorConfig {
    /// Value of the `Server` header that identifies the Z-API-like provider.
    pub server_token: String,

    /// Host fragment in the `Origin` header for the same provider.
    pub origin_host: String,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            server_token: "Z-API".to_string(),
            origin_host: "z-api.io".to_string(),
        }
    }
}

/// Load configuration from a YAML file, expanding `${ENV}` references.
pub fn load_from_path(path: &str) -> Result<AppConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config {path}"))?;
    let with_env = shellexpand::env(&raw)
        .with_context(|| "expanding environment references")?
        .to_string();
    let mut cfg: AppConfig =
        serde_yaml::from_str(&with_env).with_context(|| "parsing yaml")?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Apply the documented environment-variable overrides.
///
/// Unparseable values are ignored rather than failing startup.
pub fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Some(v) = env_parse::<usize>("TRUNCATE_MAX_LENGTH") {
        cfg.truncate.max_length = v;
    }
    if let Ok(v) = std::env::var("TRUNCATE_FIELDS") {
        let fields: Vec<String> = v
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !fields.is_empty() {
            cfg.truncate.fields = fields;
        }
    }
    if let Some(v) = env_parse::<usize>("MAX_RAW_SAMPLES") {
        cfg.samples.max_raw_samples = v;
    }
    if let Some(v) = env_parse::<usize>("MAX_EXAMPLES_PER_SCHEMA") {
        cfg.samples.max_examples_per_schema = v;
    }
    if let Some(v) = env_parse::<usize>("QUEUE_CONCURRENCY") {
        cfg.queue.concurrency = v;
    }
    if let Some(v) = env_parse::<u32>("QUEUE_MAX_ATTEMPTS") {
        cfg.queue.max_attempts = v;
    }
    if let Some(v) = env_parse::<u64>("QUEUE_BACKOFF_DELAY_MS") {
        cfg.queue.backoff_delay_ms = v;
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
