pub mod exchange_api;
pub mod util;

#[cfg(test)]
pub mod mock;

pub use exchange_api::ExchangeApiFetcher;
