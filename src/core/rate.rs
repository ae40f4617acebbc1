//! Rate records and the types the resolver hands back to callers.

use crate::core::error::RateError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

/// Three-letter uppercase currency code such as `USD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The pivot used when none is configured.
    pub fn default_pivot() -> Self {
        CurrencyCode("USD".to_string())
    }
}

impl FromStr for CurrencyCode {
    type Err = RateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(RateError::InvalidCurrency(s.to_string()));
        }
        Ok(CurrencyCode(code.to_ascii_uppercase()))
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = RateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Directed currency pair, the key for stored records and in-flight lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
}

impl CurrencyPair {
    pub fn new(from: CurrencyCode, to: CurrencyCode) -> Self {
        Self { from, to }
    }

    pub fn inverse(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.from == self.to
    }

    /// Storage key, e.g. `USD/EUR`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.from, self.to)
    }
}

impl Display for CurrencyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.from, self.to)
    }
}

/// Provenance of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    Api,
    Stale,
    Manual,
}

impl Display for RecordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RecordSource::Api => "api",
            RecordSource::Stale => "stale",
            RecordSource::Manual => "manual",
        })
    }
}

/// One directed conversion as obtained from the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub pair: CurrencyPair,
    pub rate: f64,
    pub source: RecordSource,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// How the resolver arrived at a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateOrigin {
    Identity,
    Fresh,
    Api,
    Triangulated,
    Stale,
}

impl Display for RateOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RateOrigin::Identity => "identity",
            RateOrigin::Fresh => "fresh",
            RateOrigin::Api => "api",
            RateOrigin::Triangulated => "triangulated",
            RateOrigin::Stale => "stale",
        })
    }
}

/// A rate returned to callers together with how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRate {
    pub pair: CurrencyPair,
    pub rate: f64,
    pub origin: RateOrigin,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ResolvedRate {
    pub(crate) fn from_record(record: RateRecord, origin: RateOrigin) -> Self {
        Self {
            pair: record.pair,
            rate: record.rate,
            origin,
            fetched_at: record.fetched_at,
            expires_at: record.expires_at,
        }
    }

    /// True when the caller should warn that an outdated rate was used.
    pub fn is_stale(&self) -> bool {
        self.origin == RateOrigin::Stale
    }
}

/// An amount priced in another currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub amount: f64,
    pub converted: f64,
    pub rate: ResolvedRate,
}

/// Normalised provider answer: currency code to rate relative to the base.
pub type RateTable = HashMap<CurrencyCode, f64>;

/// Rejects rates that would corrupt money amounts.
pub fn validate_rate(pair: &CurrencyPair, rate: f64) -> Result<(), RateError> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(RateError::InvariantViolation(format!(
            "rate {rate} for {pair} must be positive and finite"
        )));
    }
    Ok(())
}
