//! Error taxonomy for rate resolution.

use crate::core::rate::CurrencyPair;
use thiserror::Error;

/// Errors surfaced by fetchers, stores, the resolver and the refresh scheduler.
///
/// Every variant carries owned strings so results can be shared between
/// concurrent waiters of the same in-flight lookup.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RateError {
    /// Provider unreachable, timed out or answered with a server error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Provider answered but the body did not have the expected shape.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// Refresh credential missing or wrong.
    #[error("Unauthorized")]
    Unauthorized,

    /// The provider answered but does not quote this pair, directly or via the pivot.
    #[error("No rate found for {0}")]
    NotFound(CurrencyPair),

    /// The provider could not be reached and no usable stored rate exists.
    #[error("Rate unavailable for {0}")]
    Unavailable(CurrencyPair),

    /// A non-positive rate or a torn direct/inverse write.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    /// The caller stopped waiting; any in-flight work keeps running.
    #[error("Timed out resolving {0}")]
    Timeout(CurrencyPair),

    #[error("Storage error: {0}")]
    Storage(String),

    /// A shared background task panicked or was aborted.
    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl RateError {
    /// Whether the failure came from talking to the provider, which makes a
    /// stale fallback (or a retry) acceptable.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            RateError::NetworkError(_) | RateError::InvalidResponse(_)
        )
    }

    /// Whether retrying the same provider call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RateError::NetworkError(_))
    }
}

impl From<fjall::Error> for RateError {
    fn from(err: fjall::Error) -> Self {
        RateError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RateError {
    fn from(err: serde_json::Error) -> Self {
        RateError::Storage(format!("record encoding: {err}"))
    }
}

/// Result type for rate operations.
pub type RateResult<T> = Result<T, RateError>;
