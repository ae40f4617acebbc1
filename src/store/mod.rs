//! Persistence boundary for rate records.
//!
//! Reads go through [`RateReader`], which pricing code holds with ordinary
//! access. Writes go through [`RateWriter`], a separate elevated handle since
//! rate records are shared across all accounts. Every write of a pair stores
//! the direct record and its inverse together.

pub mod disk;
pub mod memory;

use crate::core::error::RateResult;
use crate::core::rate::{CurrencyPair, RateRecord, RecordSource, validate_rate};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

pub use disk::DiskRateStore;
pub use memory::MemoryRateStore;

#[async_trait]
pub trait RateReader: Send + Sync {
    /// Looks up the record for `pair`, whatever its age.
    async fn get_cached(&self, pair: &CurrencyPair) -> RateResult<Option<RateRecord>>;

    /// Every stored record.
    async fn records(&self) -> RateResult<Vec<RateRecord>>;

    /// Stored pairs that are expired at `now` or flagged stale.
    async fn pairs_needing_refresh(&self, now: DateTime<Utc>) -> RateResult<Vec<CurrencyPair>> {
        let mut pairs: Vec<CurrencyPair> = self
            .records()
            .await?
            .into_iter()
            .filter(|r| r.source == RecordSource::Stale || now >= r.expires_at)
            .map(|r| r.pair)
            .collect();
        pairs.sort();
        Ok(pairs)
    }
}

#[async_trait]
pub trait RateWriter: Send + Sync {
    /// Writes `(from, to, rate)` and `(to, from, 1/rate)` as one unit.
    async fn put_pair(
        &self,
        pair: &CurrencyPair,
        rate: f64,
        source: RecordSource,
        fetched_at: DateTime<Utc>,
        ttl: Duration,
    ) -> RateResult<()>;

    /// Flags the records of each pair (both directions) for re-fetch without
    /// deleting them. Returns how many records were touched.
    async fn mark_stale(&self, pairs: &[CurrencyPair]) -> RateResult<usize>;
}

/// Full store: read and elevated write access.
pub trait RateStore: RateReader + RateWriter {}

impl<T: RateReader + RateWriter> RateStore for T {}

/// Builds the direct and inverse records for a pair write, rejecting anything
/// that must never be persisted.
pub(crate) fn build_pair(
    pair: &CurrencyPair,
    rate: f64,
    source: RecordSource,
    fetched_at: DateTime<Utc>,
    ttl: Duration,
) -> RateResult<(RateRecord, RateRecord)> {
    use crate::core::error::RateError;

    if pair.is_identity() {
        let err = RateError::InvariantViolation(format!("identity pair {pair} is never stored"));
        tracing::error!(pair = %pair, "Rejected identity pair write");
        return Err(err);
    }
    if let Err(err) = validate_rate(pair, rate) {
        tracing::error!(pair = %pair, rate, "Rejected invalid rate write");
        return Err(err);
    }
    let inverse_rate = 1.0 / rate;
    if let Err(err) = validate_rate(&pair.inverse(), inverse_rate) {
        tracing::error!(pair = %pair, rate, "Rejected rate with invalid inverse");
        return Err(err);
    }

    let expires_at = fetched_at + ttl;
    let direct = RateRecord {
        pair: pair.clone(),
        rate,
        source,
        fetched_at,
        expires_at,
    };
    let inverse = RateRecord {
        pair: pair.inverse(),
        rate: inverse_rate,
        source,
        fetched_at,
        expires_at,
    };
    Ok((direct, inverse))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RateError;

    fn pair(from: &str, to: &str) -> CurrencyPair {
        CurrencyPair::new(from.parse().unwrap(), to.parse().unwrap())
    }

    #[test]
    fn test_build_pair_computes_inverse_and_expiry() {
        let t = Utc::now();
        let (direct, inverse) =
            build_pair(&pair("USD", "EUR"), 0.85, RecordSource::Api, t, Duration::hours(24))
                .unwrap();

        assert_eq!(direct.pair, pair("USD", "EUR"));
        assert_eq!(inverse.pair, pair("EUR", "USD"));
        assert!((direct.rate * inverse.rate - 1.0).abs() < 1e-6);
        assert_eq!(direct.expires_at, t + Duration::hours(24));
        assert_eq!(inverse.expires_at, direct.expires_at);
        assert_eq!(inverse.fetched_at, t);
    }

    #[test]
    fn test_build_pair_rejects_identity_and_bad_rates() {
        let t = Utc::now();
        let ttl = Duration::hours(24);
        assert!(matches!(
            build_pair(&pair("USD", "USD"), 1.0, RecordSource::Api, t, ttl),
            Err(RateError::InvariantViolation(_))
        ));
        assert!(matches!(
            build_pair(&pair("USD", "EUR"), 0.0, RecordSource::Api, t, ttl),
            Err(RateError::InvariantViolation(_))
        ));
        assert!(matches!(
            build_pair(&pair("USD", "EUR"), -0.5, RecordSource::Api, t, ttl),
            Err(RateError::InvariantViolation(_))
        ));
        // Positive but so small that the inverse overflows.
        assert!(matches!(
            build_pair(&pair("USD", "EUR"), 1e-320, RecordSource::Api, t, ttl),
            Err(RateError::InvariantViolation(_))
        ));
    }
}
