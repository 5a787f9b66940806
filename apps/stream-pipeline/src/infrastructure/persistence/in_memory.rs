//! In-Memory Candle Store
//!
//! Mirrors the PostgreSQL upsert semantics against a hash map: on a
//! conflicting natural key only the mutable aggregate fields are replaced.
//! Used by the test suite and by storeless local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::application::ports::{CandleStore, StoreError};
use crate::domain::candle::OhlcvCandle;

type NaturalKey = (String, String, i64);

/// Candle store keeping rows in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCandleStore {
    rows: Mutex<HashMap<NaturalKey, OhlcvCandle>>,
}

impl InMemoryCandleStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    /// Whether the store holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    /// Fetch one row by its natural key.
    #[must_use]
    pub fn get(&self, exchange: &str, symbol: &str, open_time: i64) -> Option<OhlcvCandle> {
        self.rows
            .lock()
            .get(&(exchange.to_string(), symbol.to_string(), open_time))
            .cloned()
    }
}

#[async_trait]
impl CandleStore for InMemoryCandleStore {
    async fn upsert_candle(&self, candle: &OhlcvCandle) -> Result<(), StoreError> {
        let key = (
            candle.exchange.clone(),
            candle.symbol.clone(),
            candle.open_time,
        );
        let mut rows = self.rows.lock();
        rows.entry(key)
            .and_modify(|existing| {
                // Conflict path: only the mutable aggregates change.
                existing.open = candle.open;
                existing.high = candle.high;
                existing.low = candle.low;
                existing.close = candle.close;
                existing.volume = candle.volume;
            })
            .or_insert_with(|| candle.clone());
        Ok(())
    }
}
