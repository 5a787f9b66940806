//! Market Source Port (Driven Port)
//!
//! One capability interface per upstream market-data source: poll the most
//! recent candle for a symbol. Sources are selected via configuration, not
//! per-exchange client types; a failed poll is a per-item skip for the
//! caller, never a pipeline failure.

use async_trait::async_trait;

use crate::domain::record::CandleBar;

/// Errors from polling an upstream source.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    /// The source could not be reached or returned an error status.
    #[error("source unavailable: {message}")]
    Unavailable {
        /// Transport or status detail.
        message: String,
    },

    /// The response body did not match the expected candle shape.
    #[error("malformed response: {message}")]
    Malformed {
        /// Parser detail.
        message: String,
    },

    /// The source returned no candle for the symbol.
    #[error("no candle returned")]
    NoData,
}

/// Port for one upstream market-data source.
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Stable source identifier, used as the candle's exchange field.
    fn id(&self) -> &str;

    /// Fetch the most recent single candle for a symbol.
    async fn poll(&self, symbol: &str) -> Result<CandleBar, SourceError>;
}
