//! Persistence for schema artifacts and the event log.
//!
//! The filesystem is the source of truth for per-kind schema state
//! ([`FsSchemaStore`]); SQLite carries the append-only event log and a
//! denormalized schema summary for the read-side ([`EventLog`]).

mod errors;
mod event_log;
mod fs;

pub use errors::{StoreError, StoreResult};
pub use event_log::{Aggregates, EventLog, StoredEvent, TimelineBucket};
pub use fs::{DiskCounters, FsSchemaStore, REQUIRED_ARTIFACTS};
