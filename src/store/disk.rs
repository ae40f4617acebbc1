use super::{RateReader, RateWriter, build_pair};
use crate::core::error::{RateError, RateResult};
use crate::core::rate::{CurrencyPair, RateRecord, RecordSource};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

const PARTITION: &str = "rates";

/// Rate store persisted in a fjall keyspace, one JSON record per directed pair.
///
/// Pair writes go through a single write batch, so the direct and inverse
/// records become visible together. Writers are serialised so that
/// read-modify-write in `mark_stale` cannot interleave with `put_pair`.
pub struct DiskRateStore {
    keyspace: Keyspace,
    partition: PartitionHandle,
    write_lock: Mutex<()>,
}

impl DiskRateStore {
    pub fn open(path: &Path) -> RateResult<Self> {
        std::fs::create_dir_all(path).map_err(|e| {
            RateError::Storage(format!("Failed to create {}: {e}", path.display()))
        })?;
        let keyspace = Config::new(path).open()?;
        let partition = keyspace.open_partition(PARTITION, PartitionCreateOptions::default())?;
        debug!(path = %path.display(), "Opened rate store");
        Ok(Self {
            keyspace,
            partition,
            write_lock: Mutex::new(()),
        })
    }

    fn read(&self, key: &str) -> RateResult<Option<RateRecord>> {
        match self.partition.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RateReader for DiskRateStore {
    async fn get_cached(&self, pair: &CurrencyPair) -> RateResult<Option<RateRecord>> {
        let record = self.read(&pair.key())?;
        if record.is_some() {
            debug!(pair = %pair, "Store HIT");
        } else {
            debug!(pair = %pair, "Store MISS");
        }
        Ok(record)
    }

    async fn records(&self) -> RateResult<Vec<RateRecord>> {
        let mut all = Vec::new();
        for entry in self.partition.iter() {
            let (_, value) = entry?;
            all.push(serde_json::from_slice::<RateRecord>(&value)?);
        }
        all.sort_by(|a, b| a.pair.cmp(&b.pair));
        Ok(all)
    }
}

#[async_trait]
impl RateWriter for DiskRateStore {
    async fn put_pair(
        &self,
        pair: &CurrencyPair,
        rate: f64,
        source: RecordSource,
        fetched_at: DateTime<Utc>,
        ttl: Duration,
    ) -> RateResult<()> {
        let (direct, inverse) = build_pair(pair, rate, source, fetched_at, ttl)?;
        let _guard = self.write_lock.lock().await;

        let mut batch = self.keyspace.batch();
        batch.insert(&self.partition, direct.pair.key(), serde_json::to_vec(&direct)?);
        batch.insert(&self.partition, inverse.pair.key(), serde_json::to_vec(&inverse)?);
        batch.commit()?;
        debug!(pair = %pair, rate, "Store PUT pair");
        Ok(())
    }

    async fn mark_stale(&self, pairs: &[CurrencyPair]) -> RateResult<usize> {
        let _guard = self.write_lock.lock().await;

        let mut batch = self.keyspace.batch();
        let mut touched = 0;
        for pair in pairs {
            for key in [pair.key(), pair.inverse().key()] {
                if let Some(mut record) = self.read(&key)? {
                    record.source = RecordSource::Stale;
                    batch.insert(&self.partition, key, serde_json::to_vec(&record)?);
                    touched += 1;
                }
            }
        }
        batch.commit()?;
        debug!(touched, "Store marked records stale");
        Ok(touched)
    }
}
