//! Stream Record Wire Model
//!
//! Every record on the stream is a JSON object carrying a `type` tag that
//! selects one of the known record kinds. Consumers decode bytes into
//! [`WireEvent`] before inspection; producers never put ad-hoc dictionaries
//! on the wire.
//!
//! # Wire Contract
//!
//! | `type` tag        | Payload                                   |
//! |-------------------|-------------------------------------------|
//! | `ohlcv`           | Exchange candle, [`OhlcvRecord`]          |
//! | `price_snapshot`  | Token price observation, [`PriceSnapshot`]|
//! | `pair_metadata`   | DEX pair metadata, [`PairMetadata`]       |
//!
//! Unknown tags or malformed bodies fail decoding; the consumer treats that
//! as a per-record skip, never a pipeline failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One candle bar with explicit named fields.
///
/// Replaces the positional `[open_time, open, high, low, close, volume]`
/// array encoding used by exchange APIs, removing ambiguity about array
/// length and optional trailing fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandleBar {
    /// Candle open time in epoch milliseconds.
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
}

/// An OHLCV candle observation from one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvRecord {
    /// Exchange identifier (e.g. `coinbase`).
    pub exchange: String,
    /// Unified trading pair symbol (e.g. `BTC/USDT`).
    pub symbol: String,
    /// The candle itself.
    pub candle: CandleBar,
    /// Pool liquidity in USD, present only for DEX sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity: Option<f64>,
    /// Chain network id, present only for on-chain sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<i64>,
}

/// A point-in-time token price observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    /// Chain network id.
    pub network_id: i64,
    /// Token contract address.
    pub address: String,
    /// Token ticker symbol.
    pub symbol: String,
    /// USD price at observation time.
    pub price_usd: f64,
    /// Market capitalization in USD, when the source reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    /// Observation timestamp.
    pub observed_at: DateTime<Utc>,
}

/// Metadata describing one DEX trading pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairMetadata {
    /// Chain network id.
    pub network_id: i64,
    /// Pair contract address.
    pub pair_address: String,
    /// Exchange the pair trades on.
    pub exchange_name: String,
    /// Base token symbol.
    pub base_symbol: String,
    /// Quote token symbol.
    pub quote_symbol: String,
    /// 24h volume in USD, when the source reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_usd: Option<f64>,
    /// Pool liquidity in USD, when the source reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity_usd: Option<f64>,
    /// Observation timestamp.
    pub observed_at: DateTime<Utc>,
}

/// Tagged union of every record kind the pipeline understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    /// Exchange OHLCV candle.
    Ohlcv(OhlcvRecord),
    /// Token price observation.
    PriceSnapshot(PriceSnapshot),
    /// DEX pair metadata.
    PairMetadata(PairMetadata),
}

impl WireEvent {
    /// Stable name of the record kind, matching the wire `type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Ohlcv(_) => "ohlcv",
            Self::PriceSnapshot(_) => "price_snapshot",
            Self::PairMetadata(_) => "pair_metadata",
        }
    }
}

/// One record handed to the producer: a wire event plus the partition key
/// that determines shard routing and intra-shard ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    /// Record payload.
    pub data: WireEvent,
    /// Partition key; records sharing a key land on the same shard in
    /// publish order.
    pub partition_key: String,
}

impl StreamRecord {
    /// Create a record with an explicit partition key.
    #[must_use]
    pub fn new(data: WireEvent, partition_key: impl Into<String>) -> Self {
        Self {
            data,
            partition_key: partition_key.into(),
        }
    }
}
