//! Candle Store Port (Driven Port)
//!
//! Single entry point for persisting candles. The implementation must make
//! the upsert a single atomic insert-or-update keyed on `(exchange, symbol,
//! open_time)`: concurrent shard readers may process records for the same
//! key, and last-writer-wins on the mutable fields is the required outcome.

use async_trait::async_trait;

use crate::domain::candle::OhlcvCandle;

/// Errors from the candle store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Connecting to the store failed.
    #[error("store connection error: {message}")]
    Connection {
        /// Driver detail.
        message: String,
    },

    /// A statement failed to execute.
    #[error("store query error: {message}")]
    Query {
        /// Driver detail.
        message: String,
    },
}

/// Port for the relational candle sink.
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Insert the candle, or update its mutable aggregate fields
    /// (open/high/low/close/volume) when the natural key already exists.
    /// Key fields are never touched on conflict.
    async fn upsert_candle(&self, candle: &OhlcvCandle) -> Result<(), StoreError>;
}
