//! Candle Sink
//!
//! The consumer-side half of the ingestion adapter: a
//! [`RecordHandler`] that validates decoded candle records and upserts them
//! through the [`CandleStore`] port. Malformed records are logged and
//! dropped without signalling failure; record kinds this sink does not own
//! are ignored.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::ports::{CandleStore, RecordHandler};
use crate::domain::candle::OhlcvCandle;
use crate::domain::record::WireEvent;

/// Normalizes candle records and persists them idempotently.
pub struct CandleSink {
    store: Arc<dyn CandleStore>,
}

impl CandleSink {
    /// Create a sink writing through the given store.
    #[must_use]
    pub fn new(store: Arc<dyn CandleStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RecordHandler for CandleSink {
    async fn handle(&self, event: WireEvent) -> anyhow::Result<()> {
        match event {
            WireEvent::Ohlcv(record) => {
                let exchange = record.exchange.clone();
                let symbol = record.symbol.clone();
                let candle = match OhlcvCandle::try_from_record(record) {
                    Ok(candle) => candle,
                    Err(err) => {
                        tracing::warn!(
                            exchange = %exchange,
                            symbol = %symbol,
                            error = %err,
                            "discarding malformed candle record"
                        );
                        return Ok(());
                    }
                };

                self.store.upsert_candle(&candle).await?;
                tracing::debug!(
                    exchange = %candle.exchange,
                    symbol = %candle.symbol,
                    open_time = candle.open_time,
                    "candle upserted"
                );
                Ok(())
            }
            other => {
                tracing::debug!(kind = other.kind(), "ignoring non-candle record");
                Ok(())
            }
        }
    }
}
