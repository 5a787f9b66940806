//! REST Candle Source
//!
//! One adapter for the whole family of exchange klines/candles endpoints
//! that answer with rows of `[open_time, open, high, low, close, volume]`,
//! either as a top-level array or wrapped in a `data` field. The endpoint
//! is a URL template selected via configuration, so adding an exchange is a
//! config change, not a new client type.
//!
//! # URL template placeholders
//!
//! | Placeholder       | Substitution                       |
//! |-------------------|------------------------------------|
//! | `{symbol}`        | symbol verbatim (`BTC/USDT`)       |
//! | `{symbol_nosep}`  | separator stripped (`BTCUSDT`)     |
//! | `{symbol_dash}`   | separator dashed (`BTC-USDT`)      |
//!
//! Rows are expected in ascending time order; the final row is taken as the
//! most recent candle. Endpoints should be asked for a single candle
//! (`limit=1` or equivalent).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::application::ports::{MarketSource, SourceError};
use crate::domain::record::CandleBar;

/// Request timeout for source polls.
const POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Market source speaking the conventional klines JSON shape.
pub struct RestCandleSource {
    id: String,
    url_template: String,
    client: reqwest::Client,
}

impl RestCandleSource {
    /// Create a source for one exchange endpoint.
    #[must_use]
    pub fn new(id: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url_template: url_template.into(),
            client: reqwest::Client::builder()
                .timeout(POLL_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    fn render_url(&self, symbol: &str) -> String {
        self.url_template
            .replace("{symbol_nosep}", &symbol.replace('/', ""))
            .replace("{symbol_dash}", &symbol.replace('/', "-"))
            .replace("{symbol}", symbol)
    }
}

#[async_trait]
impl MarketSource for RestCandleSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn poll(&self, symbol: &str) -> Result<CandleBar, SourceError> {
        let url = self.render_url(symbol);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| SourceError::Unavailable {
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Unavailable {
                message: format!("http status {status}"),
            });
        }

        let body: Value = response.json().await.map_err(|err| SourceError::Malformed {
            message: err.to_string(),
        })?;

        parse_latest_candle(&body)
    }
}

/// Pull the most recent candle row out of a klines response body.
fn parse_latest_candle(body: &Value) -> Result<CandleBar, SourceError> {
    let rows = body
        .as_array()
        .or_else(|| body.get("data").and_then(Value::as_array))
        .ok_or_else(|| SourceError::Malformed {
            message: "expected a candle array or a data-wrapped candle array".to_string(),
        })?;

    let row = rows.last().ok_or(SourceError::NoData)?;
    let fields = row.as_array().ok_or_else(|| SourceError::Malformed {
        message: "candle row is not an array".to_string(),
    })?;
    if fields.len() < 6 {
        return Err(SourceError::Malformed {
            message: format!("candle row has {} fields, expected at least 6", fields.len()),
        });
    }

    Ok(CandleBar {
        open_time: value_as_i64(&fields[0]).ok_or_else(|| SourceError::Malformed {
            message: "open_time is not an integer".to_string(),
        })?,
        open: numeric_field(&fields[1], "open")?,
        high: numeric_field(&fields[2], "high")?,
        low: numeric_field(&fields[3], "low")?,
        close: numeric_field(&fields[4], "close")?,
        volume: numeric_field(&fields[5], "volume")?,
    })
}

/// Exchanges encode numbers either as JSON numbers or as decimal strings.
fn value_as_f64(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn value_as_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn numeric_field(value: &Value, name: &str) -> Result<f64, SourceError> {
    value_as_f64(value).ok_or_else(|| SourceError::Malformed {
        message: format!("{name} is not numeric"),
    })
}
