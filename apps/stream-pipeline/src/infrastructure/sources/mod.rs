//! Upstream market-data source adapters.

/// Generic REST candle source.
pub mod rest;

pub use rest::RestCandleSource;
