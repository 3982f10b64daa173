//! Structural analysis and schema merging.
//!
//! [`analyze`] turns one (redacted) payload into a [`TypeTree`];
//! [`merge`] folds a freshly analyzed tree into the persisted one, making
//! optionality and unions emerge from accumulated evidence; [`diff`]
//! enumerates the structural differences for telemetry.

mod analyzer;
mod comparator;

pub use analyzer::{analyze, UNION_SAMPLE_CAP};
pub use comparator::{
    describe_differences, diff, is_subset, merge, Difference,
};
