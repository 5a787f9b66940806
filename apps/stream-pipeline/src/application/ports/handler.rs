//! Record Handler Port (Driver Port)
//!
//! The per-record callback the consumer drives. Handlers may perform I/O
//! (e.g. a database upsert) and may fail; the shard reader logs a handler
//! failure and moves on to the next record. Delivery is at-least-once and
//! best-effort: the shard iterator advances before the handler completes,
//! so a crash in between can drop a record.

use async_trait::async_trait;

use crate::domain::record::WireEvent;

/// Port for domain processing of decoded stream records.
#[async_trait]
pub trait RecordHandler: Send + Sync {
    /// Process one decoded record. Errors are logged by the reader loop and
    /// never abort the shard.
    async fn handle(&self, event: WireEvent) -> anyhow::Result<()>;
}

/// No-op handler for testing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpHandler;

#[async_trait]
impl RecordHandler for NoOpHandler {
    async fn handle(&self, _event: WireEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
