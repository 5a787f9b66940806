//! Infrastructure layer - Adapters and external integrations.

/// Stream producer/consumer and transport adapters.
pub mod stream;

/// Ingestion adapter: periodic poller and candle sink.
pub mod ingestion;

/// Upstream market-data source adapters.
pub mod sources;

/// Relational persistence adapters.
pub mod persistence;

/// Configuration loaded from the environment.
pub mod config;

/// Prometheus metrics.
pub mod metrics;
