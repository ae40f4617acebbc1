//! Core rate types, policies and the seams the resolver is built on

pub mod clock;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod log;
pub mod policy;
pub mod rate;
pub mod single_flight;

// Re-export main types for cleaner imports
pub use error::{RateError, RateResult};
pub use fetcher::RateFetcher;
pub use policy::RatePolicy;
pub use rate::{Conversion, CurrencyCode, CurrencyPair, RateOrigin, RateRecord, ResolvedRate};
