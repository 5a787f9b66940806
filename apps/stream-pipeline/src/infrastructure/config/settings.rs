//! Pipeline Configuration Settings
//!
//! All settings are read from environment variables with documented
//! defaults; only structurally invalid values are fatal. Missing optional
//! infrastructure (e.g. `DATABASE_URL`) degrades to in-process fallbacks at
//! wiring time, not here.

use std::time::Duration;

use crate::infrastructure::ingestion::PollerSettings;
use crate::infrastructure::stream::{ConsumerSettings, StreamConfig};

/// Default stream name.
const DEFAULT_STREAM_NAME: &str = "liquidity-master";

/// Default backend region identifier.
const DEFAULT_REGION: &str = "us-east-2";

/// Default symbols polled each cycle.
const DEFAULT_SYMBOLS: &str =
    "BTC/USDT,ETH/USDT,SOL/USDT,DOGE/USDT,XRP/USDT,SUI/USDT,PEPE/USDT,LINK/USDT";

/// Default candle sources as `id=url_template` pairs separated by `;`.
const DEFAULT_SOURCES: &str = "binance=https://api.binance.com/api/v3/klines?symbol={symbol_nosep}&interval=1m&limit=1;okx=https://www.okx.com/api/v5/market/candles?instId={symbol_dash}&bar=1m&limit=1";

/// One configured candle source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    /// Source identifier, used as the candle's exchange field.
    pub id: String,
    /// Endpoint URL template (see the REST source adapter for placeholders).
    pub url_template: String,
}

/// Complete pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Stream connection parameters.
    pub stream: StreamConfig,
    /// Shard count used when the local transport creates the stream.
    pub shard_count: usize,
    /// Partition key for candle records; also the consumer-side filter.
    pub partition_key: String,
    /// Symbols polled each cycle.
    pub symbols: Vec<String>,
    /// Candle sources polled each cycle.
    pub sources: Vec<SourceSettings>,
    /// PostgreSQL URL; `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Poll loop settings.
    pub poller: PollerSettings,
    /// Shard reader settings.
    pub consumer: ConsumerSettings,
}

impl PipelineConfig {
    /// Load configuration from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `STREAM_NAME`: stream to publish/consume (default: `liquidity-master`)
    /// - `STREAM_REGION`: backend region tag (default: `us-east-2`)
    /// - `STREAM_SHARD_COUNT`: local shard count (default: 2)
    /// - `PARTITION_KEY`: candle partition key (default: `ohlcv`)
    /// - `SYMBOLS`: comma-separated pair symbols
    /// - `SOURCES`: `;`-separated `id=url_template` pairs
    /// - `DATABASE_URL`: PostgreSQL URL (optional)
    /// - `POLL_PERIOD_SECS`: poll cycle period (default: 60)
    /// - `CONSUMER_POLL_INTERVAL_SECS`: fetch cycle sleep (default: 1)
    /// - `CONSUMER_ERROR_BACKOFF_SECS`: fetch error sleep (default: 5)
    /// - `CONSUMER_FETCH_LIMIT`: records per fetch (default: 100)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value is structurally invalid (e.g. a
    /// `SOURCES` entry without `=`, or an empty symbol list).
    pub fn from_env() -> Result<Self, ConfigError> {
        let stream = StreamConfig {
            stream_name: env_or("STREAM_NAME", DEFAULT_STREAM_NAME),
            region: env_or("STREAM_REGION", DEFAULT_REGION),
        };

        let symbols = parse_symbols(&env_or("SYMBOLS", DEFAULT_SYMBOLS))?;
        let sources = parse_sources(&env_or("SOURCES", DEFAULT_SOURCES))?;
        let partition_key = env_or("PARTITION_KEY", "ohlcv");

        let poller = PollerSettings {
            poll_period: parse_env_duration_secs(
                "POLL_PERIOD_SECS",
                PollerSettings::default().poll_period,
            ),
            partition_key: partition_key.clone(),
            backlog_factor: PollerSettings::default().backlog_factor,
        };

        let consumer = ConsumerSettings {
            fetch_limit: parse_env_usize(
                "CONSUMER_FETCH_LIMIT",
                ConsumerSettings::default().fetch_limit,
            ),
            poll_interval: parse_env_duration_secs(
                "CONSUMER_POLL_INTERVAL_SECS",
                ConsumerSettings::default().poll_interval,
            ),
            error_backoff: parse_env_duration_secs(
                "CONSUMER_ERROR_BACKOFF_SECS",
                ConsumerSettings::default().error_backoff,
            ),
        };

        Ok(Self {
            stream,
            shard_count: parse_env_usize("STREAM_SHARD_COUNT", 2),
            partition_key,
            symbols,
            sources,
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            poller,
            consumer,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A list-valued variable parsed to nothing.
    #[error("environment variable {0} yields an empty list")]
    EmptyList(&'static str),
    /// A `SOURCES` entry is not of the form `id=url_template`.
    #[error("malformed SOURCES entry: {0}")]
    MalformedSource(String),
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

/// Parse a comma-separated symbol list.
fn parse_symbols(raw: &str) -> Result<Vec<String>, ConfigError> {
    let symbols: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect();
    if symbols.is_empty() {
        return Err(ConfigError::EmptyList("SYMBOLS"));
    }
    Ok(symbols)
}

/// Parse a `;`-separated list of `id=url_template` source entries.
fn parse_sources(raw: &str) -> Result<Vec<SourceSettings>, ConfigError> {
    let mut sources = Vec::new();
    for entry in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (id, url_template) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedSource(entry.to_string()))?;
        if id.trim().is_empty() || url_template.trim().is_empty() {
            return Err(ConfigError::MalformedSource(entry.to_string()));
        }
        sources.push(SourceSettings {
            id: id.trim().to_string(),
            url_template: url_template.trim().to_string(),
        });
    }
    if sources.is_empty() {
        return Err(ConfigError::EmptyList("SOURCES"));
    }
    Ok(sources)
}
