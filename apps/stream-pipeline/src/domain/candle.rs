//! OHLCV Candle Storage Entity
//!
//! The persisted form of a candle observation. `(exchange, symbol,
//! open_time)` is the natural key; the storage sink upserts on that triple
//! so replayed records are idempotent.

use chrono::{DateTime, Utc};

use super::record::OhlcvRecord;

/// A candle row as stored in the relational sink.
#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvCandle {
    /// Exchange identifier. Part of the natural key.
    pub exchange: String,
    /// Trading pair symbol. Part of the natural key.
    pub symbol: String,
    /// Candle open time in epoch milliseconds. Part of the natural key.
    pub open_time: i64,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Base-asset volume.
    pub volume: f64,
    /// Pool liquidity in USD, for DEX sources.
    pub liquidity: Option<f64>,
    /// Chain network id, for on-chain sources.
    pub network_id: Option<i64>,
}

/// Why a wire record could not become a storable candle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CandleValidationError {
    /// Exchange field was empty.
    #[error("exchange is empty")]
    EmptyExchange,
    /// Symbol field was empty.
    #[error("symbol is empty")]
    EmptySymbol,
    /// Open time was zero or negative.
    #[error("open_time {0} is not a positive epoch millisecond timestamp")]
    InvalidOpenTime(i64),
}

impl OhlcvCandle {
    /// Validate a decoded wire record and map it into the storage entity.
    ///
    /// # Errors
    ///
    /// Returns a [`CandleValidationError`] when a required field is missing
    /// or out of range. Callers treat that as a per-record skip.
    pub fn try_from_record(record: OhlcvRecord) -> Result<Self, CandleValidationError> {
        if record.exchange.trim().is_empty() {
            return Err(CandleValidationError::EmptyExchange);
        }
        if record.symbol.trim().is_empty() {
            return Err(CandleValidationError::EmptySymbol);
        }
        if record.candle.open_time <= 0 {
            return Err(CandleValidationError::InvalidOpenTime(
                record.candle.open_time,
            ));
        }

        Ok(Self {
            exchange: record.exchange,
            symbol: record.symbol,
            open_time: record.candle.open_time,
            open: record.candle.open,
            high: record.candle.high,
            low: record.candle.low,
            close: record.candle.close,
            volume: record.candle.volume,
            liquidity: record.liquidity,
            network_id: record.network_id,
        })
    }

    /// Candle open time as a UTC timestamp.
    ///
    /// Returns `None` when the epoch milliseconds fall outside the
    /// representable range.
    #[must_use]
    pub fn open_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.open_time)
    }
}
