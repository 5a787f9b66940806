//! PostgreSQL Candle Store
//!
//! Persists candles with a single-statement
//! `INSERT ... ON CONFLICT ... DO UPDATE` keyed on `(exchange, symbol,
//! open_time)`. The statement is atomic, so concurrent shard readers
//! upserting the same key cannot race a read-then-write; the mutable
//! aggregates resolve last-writer-wins.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::application::ports::{CandleStore, StoreError};
use crate::domain::candle::OhlcvCandle;

/// Candle store backed by a PostgreSQL pool.
///
/// The pool is safe for concurrent use from every shard reader task.
pub struct PostgresCandleStore {
    pool: PgPool,
}

impl PostgresCandleStore {
    /// Connect a new pool to the database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when the database is unreachable.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|err| StoreError::Connection {
                message: err.to_string(),
            })?;

        tracing::info!(max_connections, "PostgreSQL connection pool initialized");
        Ok(Self { pool })
    }

    /// Wrap an existing pool (for testing).
    #[must_use]
    pub const fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the candle table and its natural-key constraint if absent.
    ///
    /// Schema ownership lives with the read side; this bootstrap only makes
    /// a fresh local database usable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] when the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS ohlcv_data (
                id BIGSERIAL PRIMARY KEY,
                exchange TEXT NOT NULL,
                symbol TEXT NOT NULL,
                open_time TIMESTAMPTZ NOT NULL,
                open_price DOUBLE PRECISION NOT NULL,
                high_price DOUBLE PRECISION NOT NULL,
                low_price DOUBLE PRECISION NOT NULL,
                close_price DOUBLE PRECISION NOT NULL,
                volume DOUBLE PRECISION NOT NULL,
                liquidity DOUBLE PRECISION,
                network_id BIGINT,
                UNIQUE (exchange, symbol, open_time)
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|err| StoreError::Query {
            message: err.to_string(),
        })?;
        Ok(())
    }
}

#[async_trait]
impl CandleStore for PostgresCandleStore {
    async fn upsert_candle(&self, candle: &OhlcvCandle) -> Result<(), StoreError> {
        let open_time = candle.open_timestamp().ok_or_else(|| StoreError::Query {
            message: format!("open_time {} outside timestamp range", candle.open_time),
        })?;

        sqlx::query(
            r"
            INSERT INTO ohlcv_data (
                exchange, symbol, open_time, open_price, high_price,
                low_price, close_price, volume, liquidity, network_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (exchange, symbol, open_time) DO UPDATE SET
                open_price = EXCLUDED.open_price,
                high_price = EXCLUDED.high_price,
                low_price = EXCLUDED.low_price,
                close_price = EXCLUDED.close_price,
                volume = EXCLUDED.volume
            ",
        )
        .bind(&candle.exchange)
        .bind(&candle.symbol)
        .bind(open_time)
        .bind(candle.open)
        .bind(candle.high)
        .bind(candle.low)
        .bind(candle.close)
        .bind(candle.volume)
        .bind(candle.liquidity)
        .bind(candle.network_id)
        .execute(&self.pool)
        .await
        .map_err(|err| StoreError::Query {
            message: err.to_string(),
        })?;

        Ok(())
    }
}
