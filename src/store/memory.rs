use super::{RateReader, RateWriter, build_pair};
use crate::core::error::RateResult;
use crate::core::rate::{CurrencyPair, RateRecord, RecordSource};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory rate store using a HashMap behind one async mutex.
///
/// Both records of a pair are inserted under a single lock acquisition, so a
/// reader never observes a direct record without its inverse.
#[derive(Clone, Default)]
pub struct MemoryRateStore {
    inner: Arc<Mutex<HashMap<CurrencyPair, RateRecord>>>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

#[async_trait]
impl RateReader for MemoryRateStore {
    async fn get_cached(&self, pair: &CurrencyPair) -> RateResult<Option<RateRecord>> {
        let records = self.inner.lock().await;
        let record = records.get(pair).cloned();
        if record.is_some() {
            debug!(pair = %pair, "Store HIT");
        } else {
            debug!(pair = %pair, "Store MISS");
        }
        Ok(record)
    }

    async fn records(&self) -> RateResult<Vec<RateRecord>> {
        let records = self.inner.lock().await;
        let mut all: Vec<RateRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| a.pair.cmp(&b.pair));
        Ok(all)
    }
}

#[async_trait]
impl RateWriter for MemoryRateStore {
    async fn put_pair(
        &self,
        pair: &CurrencyPair,
        rate: f64,
        source: RecordSource,
        fetched_at: DateTime<Utc>,
        ttl: Duration,
    ) -> RateResult<()> {
        let (direct, inverse) = build_pair(pair, rate, source, fetched_at, ttl)?;
        let mut records = self.inner.lock().await;
        records.insert(direct.pair.clone(), direct);
        records.insert(inverse.pair.clone(), inverse);
        debug!(pair = %pair, rate, "Store PUT pair");
        Ok(())
    }

    async fn mark_stale(&self, pairs: &[CurrencyPair]) -> RateResult<usize> {
        let mut records = self.inner.lock().await;
        let mut touched = 0;
        for pair in pairs {
            for key in [pair.clone(), pair.inverse()] {
                if let Some(record) = records.get_mut(&key) {
                    record.source = RecordSource::Stale;
                    touched += 1;
                }
            }
        }
        debug!(touched, "Store marked records stale");
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(from: &str, to: &str) -> CurrencyPair {
        CurrencyPair::new(from.parse().unwrap(), to.parse().unwrap())
    }

    #[tokio::test]
    async fn test_put_pair_writes_both_directions() {
        let store = MemoryRateStore::new();
        let t = Utc::now();

        assert!(store.get_cached(&pair("USD", "EUR")).await.unwrap().is_none());

        store
            .put_pair(&pair("USD", "EUR"), 0.85, RecordSource::Api, t, Duration::hours(24))
            .await
            .unwrap();

        let direct = store.get_cached(&pair("USD", "EUR")).await.unwrap().unwrap();
        let inverse = store.get_cached(&pair("EUR", "USD")).await.unwrap().unwrap();
        assert_eq!(direct.rate, 0.85);
        assert!((inverse.rate - 1.0 / 0.85).abs() < 1e-12);
        assert_eq!(direct.expires_at, t + Duration::hours(24));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_rejected_write_leaves_store_untouched() {
        let store = MemoryRateStore::new();
        let result = store
            .put_pair(&pair("USD", "EUR"), 0.0, RecordSource::Api, Utc::now(), Duration::hours(24))
            .await;
        assert!(result.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_mark_stale_keeps_records() {
        let store = MemoryRateStore::new();
        let t = Utc::now();
        store
            .put_pair(&pair("USD", "EUR"), 0.85, RecordSource::Api, t, Duration::hours(24))
            .await
            .unwrap();

        let touched = store
            .mark_stale(&[pair("USD", "EUR"), pair("USD", "GBP")])
            .await
            .unwrap();
        assert_eq!(touched, 2);

        let direct = store.get_cached(&pair("USD", "EUR")).await.unwrap().unwrap();
        assert_eq!(direct.source, RecordSource::Stale);
        assert_eq!(direct.rate, 0.85);
        let inverse = store.get_cached(&pair("EUR", "USD")).await.unwrap().unwrap();
        assert_eq!(inverse.source, RecordSource::Stale);
    }

    #[tokio::test]
    async fn test_pairs_needing_refresh() {
        let store = MemoryRateStore::new();
        let t = Utc::now();
        let ttl = Duration::hours(24);
        store
            .put_pair(&pair("USD", "EUR"), 0.85, RecordSource::Api, t, ttl)
            .await
            .unwrap();
        store
            .put_pair(&pair("USD", "GBP"), 0.75, RecordSource::Api, t - Duration::hours(30), ttl)
            .await
            .unwrap();

        let pairs = store.pairs_needing_refresh(t).await.unwrap();
        assert_eq!(pairs, vec![pair("GBP", "USD"), pair("USD", "GBP")]);

        store.mark_stale(&[pair("USD", "EUR")]).await.unwrap();
        let pairs = store.pairs_needing_refresh(t).await.unwrap();
        assert_eq!(pairs.len(), 4);
    }

    #[tokio::test]
    async fn test_concurrent_writers_never_tear_pairs() {
        let store = MemoryRateStore::new();
        let t = Utc::now();

        let writers = (1..=20).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .put_pair(
                        &pair("USD", "EUR"),
                        i as f64 / 10.0,
                        RecordSource::Api,
                        t,
                        Duration::hours(24),
                    )
                    .await
            })
        });
        for w in futures::future::join_all(writers).await {
            w.unwrap().unwrap();
        }

        let direct = store.get_cached(&pair("USD", "EUR")).await.unwrap().unwrap();
        let inverse = store.get_cached(&pair("EUR", "USD")).await.unwrap().unwrap();
        assert!((direct.rate * inverse.rate - 1.0).abs() < 1e-9);
    }
}
