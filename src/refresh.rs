//! Authenticated bulk refresh of the tracked currency pairs.

use crate::core::clock::{Clock, SystemClock};
use crate::core::error::RateResult;
use crate::core::fetcher::RateFetcher;
use crate::core::policy::RatePolicy;
use crate::core::rate::{CurrencyCode, CurrencyPair, RecordSource};
use crate::core::single_flight::SingleFlight;
use crate::store::RateWriter;
use serde::{Serialize, Serializer};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};

fn pair_key<S: Serializer>(pair: &CurrencyPair, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&pair.key())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairFailure {
    #[serde(serialize_with = "pair_key")]
    pub pair: CurrencyPair,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshSummary {
    /// Pairs written with a fresh rate (each write covers both directions).
    pub refreshed: usize,
    pub elapsed_ms: u64,
    pub failures: Vec<PairFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Unauthorized,
    Success(RefreshSummary),
    PartialFailure(RefreshSummary),
}

impl RefreshOutcome {
    /// HTTP-style status for whatever exposes the trigger.
    pub fn status_code(&self) -> u16 {
        match self {
            RefreshOutcome::Unauthorized => 401,
            RefreshOutcome::Success(_) => 200,
            RefreshOutcome::PartialFailure(_) => 207,
        }
    }

    pub fn summary(&self) -> Option<&RefreshSummary> {
        match self {
            RefreshOutcome::Unauthorized => None,
            RefreshOutcome::Success(summary) | RefreshOutcome::PartialFailure(summary) => {
                Some(summary)
            }
        }
    }

    /// Machine-readable body matching [`Self::status_code`].
    pub fn body(&self) -> Value {
        match self {
            RefreshOutcome::Unauthorized => json!({ "error": "unauthorized" }),
            RefreshOutcome::Success(summary) => json!({ "status": "success", "summary": summary }),
            RefreshOutcome::PartialFailure(summary) => {
                json!({ "status": "partial_failure", "summary": summary })
            }
        }
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub secret: Option<String>,
    pub bases: Vec<CurrencyCode>,
    pub currencies: Vec<CurrencyCode>,
    pub policy: RatePolicy,
}

struct Refresher {
    writer: Arc<dyn RateWriter>,
    fetcher: Arc<dyn RateFetcher>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl Refresher {
    fn pairs_for(&self, base: &CurrencyCode) -> Vec<CurrencyPair> {
        let mut pairs: Vec<CurrencyPair> = self
            .config
            .currencies
            .iter()
            .filter(|c| *c != base)
            .map(|c| CurrencyPair::new(base.clone(), c.clone()))
            .collect();
        pairs.sort();
        pairs.dedup();
        pairs
    }

    async fn run(self: Arc<Self>) -> RateResult<RefreshSummary> {
        let started = Instant::now();
        let mut refreshed = 0;
        let mut failures = Vec::new();

        for base in &self.config.bases {
            let pairs = self.pairs_for(base);
            if pairs.is_empty() {
                continue;
            }

            let table = match self.fetcher.fetch(base).await {
                Ok(table) => table,
                Err(e) => {
                    warn!(base = %base, error = %e, "Refresh fetch failed");
                    failures.extend(pairs.into_iter().map(|pair| PairFailure {
                        pair,
                        reason: e.to_string(),
                    }));
                    continue;
                }
            };

            if let Err(e) = self.writer.mark_stale(&pairs).await {
                warn!(base = %base, error = %e, "Could not mark pairs stale");
            }

            let fetched_at = self.clock.now();
            for pair in pairs {
                let Some(rate) = table.get(&pair.to).copied() else {
                    failures.push(PairFailure {
                        reason: format!("{} not quoted for base {}", pair.to, pair.from),
                        pair,
                    });
                    continue;
                };
                match self
                    .writer
                    .put_pair(&pair, rate, RecordSource::Api, fetched_at, self.config.policy.ttl)
                    .await
                {
                    Ok(()) => refreshed += 1,
                    Err(e) => failures.push(PairFailure {
                        pair,
                        reason: e.to_string(),
                    }),
                }
            }
        }

        let summary = RefreshSummary {
            refreshed,
            elapsed_ms: started.elapsed().as_millis() as u64,
            failures,
        };
        info!(
            refreshed = summary.refreshed,
            failed = summary.failures.len(),
            elapsed_ms = summary.elapsed_ms,
            "Refresh finished"
        );
        Ok(summary)
    }
}

/// Warms the store for the configured currency set on an external trigger.
/// Overlapping triggers share one refresh and receive the same summary.
pub struct RefreshScheduler {
    refresher: Arc<Refresher>,
    flight: SingleFlight<(), RefreshSummary>,
}

impl RefreshScheduler {
    pub fn new(
        writer: Arc<dyn RateWriter>,
        fetcher: Arc<dyn RateFetcher>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            refresher: Arc::new(Refresher {
                writer,
                fetcher,
                clock: Arc::new(SystemClock),
                config,
            }),
            flight: SingleFlight::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        if let Some(refresher) = Arc::get_mut(&mut self.refresher) {
            refresher.clock = clock;
        }
        self
    }

    fn authorized(&self, presented: &str) -> bool {
        match &self.refresher.config.secret {
            Some(secret) if !secret.is_empty() => {
                bool::from(secret.as_bytes().ct_eq(presented.as_bytes()))
            }
            _ => false,
        }
    }

    #[instrument(skip_all)]
    pub async fn refresh_all(&self, secret: &str) -> RateResult<RefreshOutcome> {
        if !self.authorized(secret) {
            warn!("Refresh rejected: bad credential");
            return Ok(RefreshOutcome::Unauthorized);
        }

        let refresher = Arc::clone(&self.refresher);
        let summary = self.flight.run((), move || refresher.run()).await?;
        Ok(if summary.failures.is_empty() {
            RefreshOutcome::Success(summary)
        } else {
            RefreshOutcome::PartialFailure(summary)
        })
    }
}
