//! Deduplication of concurrent work on the same key.

use crate::core::error::{RateError, RateResult};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tracing::debug;

type SharedResult<T> = Shared<BoxFuture<'static, RateResult<T>>>;

/// Runs at most one future per key at a time; callers arriving while it runs
/// await the same result.
///
/// The work is spawned onto the runtime, so a caller that gives up waiting does
/// not cancel it for the others.
pub struct SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    calls: Arc<Mutex<HashMap<K, SharedResult<T>>>>,
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Joins the in-flight call for `key`, or starts one from `work`.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> RateResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RateResult<T>> + Send + 'static,
    {
        let shared = {
            let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(existing) = calls.get(&key) {
                debug!(key = ?key, "Joining in-flight call");
                existing.clone()
            } else {
                debug!(key = ?key, "Starting call");
                let registry = Arc::clone(&self.calls);
                let owned_key = key.clone();
                let fut = work();
                // The registry lock is held until the entry is inserted, so the
                // removal below always runs after the insert.
                let handle = tokio::spawn(async move {
                    let result = fut.await;
                    registry
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&owned_key);
                    result
                });
                let shared = handle
                    .map(|joined| match joined {
                        Ok(result) => result,
                        Err(e) => Err(RateError::TaskFailed(e.to_string())),
                    })
                    .boxed()
                    .shared();
                calls.insert(key, shared.clone());
                shared
            }
        };
        shared.await
    }

    /// Number of keys with work currently running.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
