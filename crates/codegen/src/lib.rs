//! Artifact generation.
//!
//! Pure functions from a [`TypeTree`] to the strings the store persists: a
//! Zod validator module, a TypeScript interface, the examples file, and the
//! metadata record. Emission degrades rather than fails: a tree the
//! pretty-printer cannot handle falls back to a minimally-indented form, and
//! the interface falls back to an any-shaped declaration as a last resort —
//! metadata and tree persistence always succeed.

use thiserror::Error;
use tracing::warn;

use hookforge_common::pascal_case;
use hookforge_core::{SchemaRecord, TypeTree};

mod interface;
mod validator;

pub use interface::interface_source;
pub use validator::validator_source;

/// Nesting depth beyond which emission gives up and degrades.
pub const MAX_EMIT_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("tree nesting exceeds emit depth {0}")]
    DepthExceeded(usize),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CodegenResult<T> = Result<T, CodegenError>;

/// File extension of both generated source artifacts.
pub const ARTIFACT_EXT: &str = "ts";

/// Everything the generator emits for one kind.
#[derive(Debug, Clone)]
pub struct GeneratedArtifacts {
    pub validator: String,
    pub interface: String,
    pub examples_json: String,
    /// At least one artifact fell back to a degraded form.
    pub degraded: bool,
}

/// Type identifier derived from the kind: split on `/`, pascal-case each
/// segment, concatenate.
pub fn type_identifier(kind: &str) -> String {
    let ident: String = kind.split('/').map(pascal_case).collect();
    if ident.is_empty() {
        "UnknownEvent".to_string()
    } else {
        ident
    }
}

/// Schema constant name for the validator module (`fooBarSchema`).
pub fn schema_const_name(kind: &str) -> String {
    let ident = type_identifier(kind);
    let mut chars = ident.chars();
    let lowered: String = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => ident,
    };
    format!("{lowered}Schema")
}

/// Generate every artifact for a kind, degrading instead of failing.
pub fn generate(kind: &str, tree: &TypeTree) -> GeneratedArtifacts {
    let mut degraded = false;

    let validator = match validator_source(kind, tree) {
        Ok(src) => src,
        Err(e) => {
            warn!(kind = %kind, error = %e, "validator emission degraded");
            degraded = true;
            validator::degenerate_validator(kind)
        }
    };

    let interface = match interface_source(kind, tree) {
        Ok(src) => src,
        Err(e) => {
            warn!(kind = %kind, error = %e, "interface emission degraded");
            degraded = true;
            interface::degenerate_interface(kind)
        }
    };

    let examples_json = examples_json(tree);

    GeneratedArtifacts {
        validator,
        interface,
        examples_json,
        degraded,
    }
}

/// The examples artifact: the root node's bounded example list.
pub fn examples_json(tree: &TypeTree) -> String {
    serde_json::to_string_pretty(&tree.examples)
        .unwrap_or_else(|_| "[]".to_string())
}

/// The metadata artifact: the full record, pretty when possible.
pub fn metadata_json(record: &SchemaRecord) -> CodegenResult<String> {
    match serde_json::to_string_pretty(record) {
        Ok(s) => Ok(s),
        Err(_) => Ok(serde_json::to_string(record)?),
    }
}

/// Quote a field name for emission unless it is already identifier-safe.
pub(crate) fn field_key(name: &str) -> String {
    let safe = !name.is_empty()
        && name
            .chars()
            .enumerate()
            .all(|(i, c)| {
                c == '_'
                    || c.is_ascii_alphabetic()
                    || (i > 0 && c.is_ascii_digit())
            });
    if safe {
        name.to_string()
    } else {
        format!("{:?}", name)
    }
}
