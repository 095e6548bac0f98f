//! Error taxonomy for the cardinality catalog core.
//!
//! Mirrors the propagation policy of the ingest/query boundary: invalid
//! arguments and not-found lookups are returned to the caller with no state
//! change, malformed records are recorded per-record and do not abort a
//! batch, and writes after `close()` are rejected.

use thiserror::Error;

/// Errors returned by [`crate::store::MemoryStore`] and the ingest pipeline.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A required argument was empty or otherwise invalid. No state changed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Lookup by name/key found no matching entity. No state changed.
    #[error("not found: {0}")]
    NotFound(String),

    /// A single OTLP record failed its structural walk (e.g. an unset
    /// metric data-point oneof). Sibling records in the same request are
    /// unaffected; the caller only sees an aggregate count.
    #[error("malformed record: {0}")]
    Malformed(String),

    /// The operation's cancellation token fired before completion.
    #[error("operation canceled")]
    Canceled,

    /// A write was attempted after [`crate::store::MemoryStore::close`].
    #[error("store is closed")]
    Closed,

    /// An internal invariant was violated or allocation failed; no partial
    /// writes are committed.
    #[error("fatal: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}
