//! Scriptable in-process fetcher for unit tests.

use crate::core::error::{RateError, RateResult};
use crate::core::fetcher::RateFetcher;
use crate::core::rate::{CurrencyCode, RateTable};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct MockRateFetcher {
    responses: Mutex<HashMap<String, RateResult<RateTable>>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Mutex<Option<Duration>>,
}

impl MockRateFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rates(&self, base: &str, rates: &[(&str, f64)]) {
        let table: RateTable = rates
            .iter()
            .map(|(code, rate)| (code.parse().unwrap(), *rate))
            .collect();
        self.responses
            .lock()
            .unwrap()
            .insert(base.to_string(), Ok(table));
    }

    pub fn fail(&self, base: &str, error: RateError) {
        self.responses
            .lock()
            .unwrap()
            .insert(base.to_string(), Err(error));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls_for(&self, base: &str) -> usize {
        self.calls.lock().unwrap().get(base).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl RateFetcher for MockRateFetcher {
    async fn fetch(&self, base: &CurrencyCode) -> RateResult<RateTable> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(base.to_string())
            .or_default() += 1;

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.responses
            .lock()
            .unwrap()
            .get(base.as_str())
            .cloned()
            .unwrap_or_else(|| Err(RateError::NetworkError(format!("no route to {base}"))))
    }
}
