//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following the
//! Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`transport::StreamTransport`]: the partitioned event-stream backend
//! - [`source::MarketSource`]: one upstream market-data source
//! - [`store::CandleStore`]: the relational candle sink
//!
//! ## Driver Ports (Inbound)
//!
//! - [`handler::RecordHandler`]: the per-record callback the consumer drives

/// Stream backend port and the shared stream error taxonomy.
pub mod transport;

/// Record handler port driven by the consumer.
pub mod handler;

/// Upstream market-data source port.
pub mod source;

/// Candle storage port.
pub mod store;

pub use handler::RecordHandler;
pub use source::{MarketSource, SourceError};
pub use store::{CandleStore, StoreError};
pub use transport::{
    FetchedRecord, IteratorPosition, PutEntry, PutOutcome, RecordBatch, StreamError,
    StreamTransport,
};
