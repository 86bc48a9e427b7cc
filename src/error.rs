//! Caller-facing error taxonomy.
//!
//! Failures of individual oracle calls and of the best-effort write-back are
//! recovered inside the enrichment pipeline and never reach this type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookupError {
    /// The request named zero identifiers, more than one, or an empty one.
    /// Raised before any store access.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No stored product matched the resolution predicate.
    #[error("no product found")]
    NotFound,

    /// The store could not be read.
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}
