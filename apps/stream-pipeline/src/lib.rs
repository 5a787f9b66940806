#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access
    )
)]

//! Stream Pipeline - Market Data Ingestion
//!
//! Ingests continuous market-data events (OHLCV candles, token prices,
//! pair metadata), publishes them onto a durable, partitioned, ordered
//! event stream, and separately consumes that stream into a relational
//! store with idempotent upserts.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Wire record model and the candle storage entity
//!   - `record`: tagged wire events and the producer-facing stream record
//!   - `candle`: the persisted OHLCV entity and its validation
//!
//! - **Application**: Port definitions
//!   - `ports`: stream transport, market source, candle store, record
//!     handler
//!
//! - **Infrastructure**: Adapters and pipeline components
//!   - `stream`: producer, multi-shard consumer, retry policy, in-memory
//!     transport
//!   - `ingestion`: periodic candle poller and the upserting sink
//!   - `sources`: REST candle source adapter
//!   - `persistence`: PostgreSQL and in-memory candle stores
//!   - `config`: environment configuration
//!   - `metrics`: Prometheus counters
//!
//! # Data Flow
//!
//! ```text
//! exchange APIs --> CandlePoller --> StreamProducer --> stream
//!                                                         |
//!                     PostgreSQL <-- CandleSink <-- StreamConsumer
//!                                                  (one reader per shard)
//! ```
//!
//! Delivery is at-least-once and best-effort: per-record decode and handler
//! failures are logged and skipped, and the pipeline favors continued
//! operation over halting.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core record types with no external service dependencies.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and pipeline components.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::candle::{CandleValidationError, OhlcvCandle};
pub use domain::record::{
    CandleBar, OhlcvRecord, PairMetadata, PriceSnapshot, StreamRecord, WireEvent,
};

// Ports
pub use application::ports::{
    CandleStore, MarketSource, RecordHandler, SourceError, StoreError, StreamError,
    StreamTransport,
};

// Stream core
pub use infrastructure::stream::{
    ConsumerSettings, ConsumerState, InMemoryTransport, RetryPolicy, StreamConfig, StreamConsumer,
    StreamProducer,
};

// Ingestion adapter
pub use infrastructure::ingestion::{CandlePoller, CandleSink, PollerSettings};

// Adapters
pub use infrastructure::persistence::{InMemoryCandleStore, PostgresCandleStore};
pub use infrastructure::sources::RestCandleSource;

// Configuration
pub use infrastructure::config::{ConfigError, PipelineConfig, SourceSettings};

// Metrics
pub use infrastructure::metrics::init_metrics;
