//! Persistence adapters for the candle store port.

/// PostgreSQL adapter with atomic upserts.
pub mod postgres;

/// In-memory adapter for tests and storeless runs.
pub mod in_memory;

pub use in_memory::InMemoryCandleStore;
pub use postgres::PostgresCandleStore;
