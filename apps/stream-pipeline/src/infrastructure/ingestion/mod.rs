//! Ingestion Adapter
//!
//! The concrete pipeline built on the stream producer/consumer:
//! [`poller::CandlePoller`] pulls periodic candle snapshots from the
//! configured sources and publishes them in batches;
//! [`sink::CandleSink`] normalizes consumed records and upserts them into
//! storage.

/// Periodic multi-source candle poller (producer side).
pub mod poller;

/// Normalize-and-upsert record handler (consumer side).
pub mod sink;

pub use poller::{CandlePoller, PollerSettings};
pub use sink::CandleSink;
