//! Error types for the resilient fetch pipeline.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the fetch pipeline.
///
/// `Clone` so that de-duplicated concurrent callers can each receive the
/// outcome of the single underlying fetch. Validation failures are not
/// errors; they are reported as data on
/// [`crate::fetch::consistency::ValidatedBatch`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Circuit breaker is open; the call was rejected without being issued.
    #[error("circuit breaker open, retry in {retry_after:?}")]
    BreakerOpen {
        /// Time remaining until the breaker will admit a recovery probe.
        retry_after: Duration,
    },
    /// The wrapped call exceeded its timeout.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    /// Transport-level failure reported by the collaborator.
    #[error("transport error: {0}")]
    Transport(String),
    /// The operation was cancelled or superseded; no state was mutated.
    #[error("operation cancelled")]
    Cancelled,
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
