//! Rate provider abstraction

use crate::core::error::RateResult;
use crate::core::rate::{CurrencyCode, RateTable};
use async_trait::async_trait;

/// Fetches every rate the provider quotes against `base`.
///
/// Implementations make exactly one outbound call per invocation, never retry
/// and never write to the store. Failures are `NetworkError` or
/// `InvalidResponse`; retry policy belongs to the caller.
#[async_trait]
pub trait RateFetcher: Send + Sync {
    async fn fetch(&self, base: &CurrencyCode) -> RateResult<RateTable>;
}
