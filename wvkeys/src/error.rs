//! Error types for license acquisition.

use thiserror::Error;

/// Errors surfaced by the license-acquisition client.
///
/// Transport timeouts and server-reported transient statuses are retried
/// internally and only surface once the retry budget is exhausted; every
/// other variant is non-retryable at the caller level.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Malformed caller input, or a crypto period index that has already
    /// been evicted from the rotation cache.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No key cached for the requested track or crypto period.
    #[error("key not found: {0}")]
    NotFound(String),

    /// Signing failure, or a license server payload that could not be
    /// decoded.
    #[error("internal error: {0}")]
    Internal(String),

    /// The license server reported a fatal status.
    #[error("license server error: {0}")]
    Server(String),

    /// The transport timed out for one attempt.
    #[error("request timed out: {0}")]
    TimeOut(String),

    /// Any other transport failure. Surfaced verbatim, never retried.
    #[error("network error: {0}")]
    Network(String),
}
