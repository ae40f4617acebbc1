//! Freshness and staleness windows shared by the resolver and the refresh scheduler.

use crate::core::rate::{RateRecord, RecordSource};
use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_TTL_HOURS: i64 = 24;
pub const DEFAULT_MAX_STALENESS_HOURS: i64 = 72;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatePolicy {
    /// How long a fetched record counts as fresh.
    pub ttl: Duration,
    /// Oldest record age still acceptable as a fallback when the provider is down.
    pub max_staleness: Duration,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(DEFAULT_TTL_HOURS),
            max_staleness: Duration::hours(DEFAULT_MAX_STALENESS_HOURS),
        }
    }
}

impl RatePolicy {
    pub fn new(ttl: Duration, max_staleness: Duration) -> Self {
        Self { ttl, max_staleness }
    }

    pub fn expires_at(&self, fetched_at: DateTime<Utc>) -> DateTime<Utc> {
        fetched_at + self.ttl
    }

    /// Fresh records are served without touching the provider. Records flagged
    /// stale by a refresh are never fresh, whatever their expiry says.
    pub fn is_fresh(&self, record: &RateRecord, now: DateTime<Utc>) -> bool {
        record.source != RecordSource::Stale && now < record.expires_at
    }

    /// Whether the record may still be used as a fallback at `now`.
    pub fn within_staleness(&self, record: &RateRecord, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(record.fetched_at) <= self.max_staleness
    }

    /// Whether a refresh should pick this record up.
    pub fn needs_refresh(&self, record: &RateRecord, now: DateTime<Utc>) -> bool {
        !self.is_fresh(record, now)
    }
}
