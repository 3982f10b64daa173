//! Core data model for hookforge.
//!
//! Everything the inference pipeline passes between stages lives here: the
//! tagged type tree inferred from payloads, the persisted per-kind schema
//! record, the redaction report produced by the truncator, and the two
//! fingerprint functions that make schema drift observable.

pub mod detect;
pub mod fingerprint;
pub mod record;
pub mod redaction;
pub mod tree;

pub use detect::value_kind;
pub use fingerprint::{
    canonical_string, payload_fingerprint, short_id, similarity,
    structure_fingerprint, LARGE_STRING_BOUND,
};
pub use record::{EventRow, FieldSets, SchemaRecord, Variation};
pub use redaction::{RedactTag, Redaction, RedactionReport, TRUNCATION_SENTINEL};
pub use tree::{TypeKind, TypeTree};
