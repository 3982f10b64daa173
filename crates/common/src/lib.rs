//! Shared utilities for hookforge crates.
//!
//! This crate provides common functionality used across the hookforge
//! workspace:
//!
//! - **Backoff**: exponential backoff with jitter for the job queue
//! - **Identifiers**: event-kind sanitization and pascal-casing
//! - **Time**: Unix-millisecond helpers

pub mod backoff;
pub mod ident;
pub mod time;

pub use backoff::BackoffPolicy;
pub use ident::{pascal_case, sanitize_kind, sanitize_segment};
pub use time::now_ms;
