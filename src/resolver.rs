//! Rate resolution: identity, fresh cache, direct fetch, triangulation through
//! the pivot currency, stale fallback, failure. In that order.

use crate::core::clock::{Clock, SystemClock};
use crate::core::error::{RateError, RateResult};
use crate::core::fetcher::RateFetcher;
use crate::core::policy::RatePolicy;
use crate::core::rate::{
    Conversion, CurrencyCode, CurrencyPair, RateOrigin, RateRecord, RateTable, RecordSource,
    ResolvedRate,
};
use crate::core::single_flight::SingleFlight;
use crate::providers::util::with_retry;
use crate::store::{RateReader, RateStore, RateWriter};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Currency every triangulated rate hops through.
    pub pivot: CurrencyCode,
    pub policy: RatePolicy,
    /// Extra attempts for a provider call that failed with a network error.
    pub fetch_retries: usize,
    pub retry_delay_ms: u64,
    /// How long a single caller waits before giving up with `Timeout`.
    pub resolve_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            pivot: CurrencyCode::default_pivot(),
            policy: RatePolicy::default(),
            fetch_retries: 1,
            retry_delay_ms: 250,
            resolve_timeout: Duration::from_secs(30),
        }
    }
}

/// One provider answer held for the duration of a resolution.
struct Quote {
    base: CurrencyCode,
    table: RateTable,
    fetched_at: DateTime<Utc>,
}

impl Quote {
    fn rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> Option<f64> {
        if &self.base == from {
            self.table.get(to).copied()
        } else if &self.base == to {
            self.table.get(from).map(|r| 1.0 / r)
        } else {
            None
        }
    }
}

/// A leg of a triangulation. Identity legs carry no timestamps.
#[derive(Debug, Clone, Copy)]
struct Leg {
    rate: f64,
    origin: RateOrigin,
    fetched_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
}

impl Leg {
    fn identity() -> Self {
        Self {
            rate: 1.0,
            origin: RateOrigin::Identity,
            fetched_at: None,
            expires_at: None,
        }
    }

    fn is_identity(&self) -> bool {
        self.origin == RateOrigin::Identity
    }
}

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match (a, b) {
        (Some(a), Some(b)) => a.min(b),
        (Some(t), None) | (None, Some(t)) => t,
        (None, None) => now,
    }
}

/// Combines `from -> pivot` and `pivot -> to`. When one leg is the identity the
/// other leg is a direct quote and keeps its own origin.
fn combine(pair: &CurrencyPair, first: Leg, second: Leg, now: DateTime<Utc>) -> ResolvedRate {
    let origin = match (first.is_identity(), second.is_identity()) {
        (true, _) => second.origin,
        (_, true) => first.origin,
        _ => RateOrigin::Triangulated,
    };
    ResolvedRate {
        pair: pair.clone(),
        rate: first.rate * second.rate,
        origin,
        fetched_at: earliest(first.fetched_at, second.fetched_at, now),
        expires_at: earliest(first.expires_at, second.expires_at, now),
    }
}

struct Engine {
    reader: Arc<dyn RateReader>,
    writer: Arc<dyn RateWriter>,
    fetcher: Arc<dyn RateFetcher>,
    clock: Arc<dyn Clock>,
    config: ResolverConfig,
}

impl Engine {
    async fn fresh_record(&self, pair: &CurrencyPair) -> RateResult<Option<RateRecord>> {
        let now = self.clock.now();
        Ok(self
            .reader
            .get_cached(pair)
            .await?
            .filter(|r| self.config.policy.is_fresh(r, now)))
    }

    async fn resolve_uncached(self: Arc<Self>, pair: CurrencyPair) -> RateResult<ResolvedRate> {
        let cached = self.reader.get_cached(&pair).await?;
        if let Some(record) = &cached {
            if self.config.policy.is_fresh(record, self.clock.now()) {
                debug!(pair = %pair, "Fresh record found");
                return Ok(ResolvedRate::from_record(record.clone(), RateOrigin::Fresh));
            }
        }

        let mut quotes = Vec::new();
        match self.fetch_quote(&pair.from).await {
            Ok(quote) => {
                if let Some(rate) = quote.table.get(&pair.to).copied() {
                    info!(pair = %pair, rate, "Resolved from provider");
                    return Ok(ResolvedRate {
                        pair,
                        rate,
                        origin: RateOrigin::Api,
                        fetched_at: quote.fetched_at,
                        expires_at: self.config.policy.expires_at(quote.fetched_at),
                    });
                }
                debug!(pair = %pair, "No direct quote, triangulating");
                quotes.push(quote);
                match self.triangulate(&pair, &mut quotes, true).await {
                    Ok(Some(resolved)) => Ok(resolved),
                    Ok(None) => Err(RateError::NotFound(pair)),
                    Err(e) if e.is_provider_failure() => self.stale_fallback(pair, cached, e),
                    Err(e) => Err(e),
                }
            }
            Err(e) if e.is_provider_failure() => {
                warn!(pair = %pair, error = %e, "Direct fetch failed");
                if let Some(resolved) = self.triangulate(&pair, &mut quotes, false).await? {
                    return Ok(resolved);
                }
                self.stale_fallback(pair, cached, e)
            }
            Err(e) => Err(e),
        }
    }

    /// Fetches `base` (retrying network errors) and writes every quoted pair
    /// through to the store.
    async fn fetch_quote(&self, base: &CurrencyCode) -> RateResult<Quote> {
        let table = with_retry(
            || self.fetcher.fetch(base),
            self.config.fetch_retries,
            self.config.retry_delay_ms,
        )
        .await?;
        let fetched_at = self.clock.now();
        self.write_through(base, &table, fetched_at).await;
        Ok(Quote {
            base: base.clone(),
            table,
            fetched_at,
        })
    }

    /// Skips pairs holding an unexpired manual record; only an explicit
    /// refresh replaces those.
    async fn write_through(&self, base: &CurrencyCode, table: &RateTable, fetched_at: DateTime<Utc>) {
        for (currency, rate) in table {
            let pair = CurrencyPair::new(base.clone(), currency.clone());
            if let Ok(Some(existing)) = self.reader.get_cached(&pair).await {
                if existing.source == RecordSource::Manual
                    && self.config.policy.is_fresh(&existing, fetched_at)
                {
                    debug!(pair = %pair, "Keeping manual rate");
                    continue;
                }
            }
            if let Err(e) = self
                .writer
                .put_pair(&pair, *rate, RecordSource::Api, fetched_at, self.config.policy.ttl)
                .await
            {
                error!(pair = %pair, error = %e, "Write-through failed");
            }
        }
    }

    async fn leg(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        quotes: &[Quote],
    ) -> RateResult<Option<Leg>> {
        if from == to {
            return Ok(Some(Leg::identity()));
        }
        for quote in quotes {
            if let Some(rate) = quote.rate(from, to) {
                return Ok(Some(Leg {
                    rate,
                    origin: RateOrigin::Api,
                    fetched_at: Some(quote.fetched_at),
                    expires_at: Some(self.config.policy.expires_at(quote.fetched_at)),
                }));
            }
        }
        let pair = CurrencyPair::new(from.clone(), to.clone());
        Ok(self.fresh_record(&pair).await?.map(|r| Leg {
            rate: r.rate,
            origin: RateOrigin::Fresh,
            fetched_at: Some(r.fetched_at),
            expires_at: Some(r.expires_at),
        }))
    }

    async fn legs(&self, pair: &CurrencyPair, quotes: &[Quote]) -> RateResult<Option<ResolvedRate>> {
        let pivot = &self.config.pivot;
        let first = self.leg(&pair.from, pivot, quotes).await?;
        let second = self.leg(pivot, &pair.to, quotes).await?;
        Ok(match (first, second) {
            (Some(a), Some(b)) => Some(combine(pair, a, b, self.clock.now())),
            _ => None,
        })
    }

    /// One hop through the pivot. The result is never written to the store.
    async fn triangulate(
        &self,
        pair: &CurrencyPair,
        quotes: &mut Vec<Quote>,
        allow_fetch: bool,
    ) -> RateResult<Option<ResolvedRate>> {
        if let Some(resolved) = self.legs(pair, quotes).await? {
            return Ok(Some(resolved));
        }
        let pivot = &self.config.pivot;
        if !allow_fetch || quotes.iter().any(|q| &q.base == pivot) {
            return Ok(None);
        }
        quotes.push(self.fetch_quote(pivot).await?);
        self.legs(pair, quotes).await
    }

    fn stale_fallback(
        &self,
        pair: CurrencyPair,
        cached: Option<RateRecord>,
        cause: RateError,
    ) -> RateResult<ResolvedRate> {
        let now = self.clock.now();
        match cached {
            Some(record) if self.config.policy.within_staleness(&record, now) => {
                warn!(
                    pair = %pair,
                    fetched_at = %record.fetched_at,
                    cause = %cause,
                    "Serving stale rate"
                );
                Ok(ResolvedRate::from_record(record, RateOrigin::Stale))
            }
            Some(record) => {
                warn!(
                    pair = %pair,
                    fetched_at = %record.fetched_at,
                    "Stored rate too old for fallback"
                );
                Err(RateError::Unavailable(pair))
            }
            None => Err(RateError::Unavailable(pair)),
        }
    }
}

/// Resolves currency pairs to rates. Concurrent lookups of the same pair share
/// one provider round trip.
pub struct Resolver {
    engine: Arc<Engine>,
    flights: SingleFlight<CurrencyPair, ResolvedRate>,
}

impl Resolver {
    /// Reads use `reader`; write-through uses the elevated `writer`.
    pub fn new(
        reader: Arc<dyn RateReader>,
        writer: Arc<dyn RateWriter>,
        fetcher: Arc<dyn RateFetcher>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            engine: Arc::new(Engine {
                reader,
                writer,
                fetcher,
                clock: Arc::new(SystemClock),
                config,
            }),
            flights: SingleFlight::new(),
        }
    }

    /// Convenience for a store that serves both reads and writes.
    pub fn with_store<S: RateStore + 'static>(
        store: Arc<S>,
        fetcher: Arc<dyn RateFetcher>,
        config: ResolverConfig,
    ) -> Self {
        let reader: Arc<dyn RateReader> = store.clone();
        let writer: Arc<dyn RateWriter> = store;
        Self::new(reader, writer, fetcher, config)
    }

    /// Replaces the wall clock, e.g. with a [`crate::core::clock::ManualClock`].
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        if let Some(engine) = Arc::get_mut(&mut self.engine) {
            engine.clock = clock;
        }
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.engine.config
    }

    #[instrument(skip_all, fields(from = %from, to = %to))]
    pub async fn resolve(&self, from: &CurrencyCode, to: &CurrencyCode) -> RateResult<ResolvedRate> {
        let pair = CurrencyPair::new(from.clone(), to.clone());
        if pair.is_identity() {
            let now = self.engine.clock.now();
            return Ok(ResolvedRate {
                pair,
                rate: 1.0,
                origin: RateOrigin::Identity,
                fetched_at: now,
                expires_at: now,
            });
        }

        if let Some(record) = self.engine.fresh_record(&pair).await? {
            debug!("Fresh record found");
            return Ok(ResolvedRate::from_record(record, RateOrigin::Fresh));
        }

        let engine = Arc::clone(&self.engine);
        let key = pair.clone();
        let flight = self
            .flights
            .run(pair.clone(), move || engine.resolve_uncached(key));

        match tokio::time::timeout(self.engine.config.resolve_timeout, flight).await {
            Ok(result) => result,
            Err(_) => {
                warn!(pair = %pair, "Gave up waiting for rate");
                Err(RateError::Timeout(pair))
            }
        }
    }

    /// Prices `amount` of `from` in `to`.
    pub async fn convert(
        &self,
        amount: f64,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> RateResult<Conversion> {
        if !amount.is_finite() {
            return Err(RateError::InvariantViolation(format!(
                "amount {amount} is not a finite number"
            )));
        }
        let rate = self.resolve(from, to).await?;
        Ok(Conversion {
            amount,
            converted: amount * rate.rate,
            rate,
        })
    }

    /// Stores an operator-provided rate (and its inverse) as a manual record.
    pub async fn set_manual_rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        rate: f64,
    ) -> RateResult<RateRecord> {
        let pair = CurrencyPair::new(from.clone(), to.clone());
        let now = self.engine.clock.now();
        self.engine
            .writer
            .put_pair(&pair, rate, RecordSource::Manual, now, self.engine.config.policy.ttl)
            .await?;
        info!(pair = %pair, rate, "Stored manual rate");
        self.engine
            .reader
            .get_cached(&pair)
            .await?
            .ok_or_else(|| RateError::InvariantViolation(format!("manual write of {pair} not visible")))
    }
}
