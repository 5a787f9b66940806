//! Stream Transport Port (Driven Port)
//!
//! Interface for the partitioned, ordered event-stream backend. The backend
//! owns shard routing: two records with the same partition key are delivered
//! to the same shard in publish order. This module also defines the stream
//! error taxonomy shared by the producer and consumer built on top of the
//! port.

use async_trait::async_trait;

/// Where a freshly created shard iterator is positioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IteratorPosition {
    /// Start at the latest position; only records published after the
    /// iterator is created are visible. No historical replay.
    #[default]
    Latest,
}

/// One record as fetched from a shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedRecord {
    /// Partition key the record was published under.
    pub partition_key: String,
    /// Opaque record body; the consumer decodes it as JSON.
    pub data: Vec<u8>,
}

/// Result of one `get_records` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBatch {
    /// Fetched records in backend order.
    pub records: Vec<FetchedRecord>,
    /// Iterator for the next fetch; `None` means the shard is closed and
    /// fully consumed.
    pub next_iterator: Option<String>,
}

/// One entry of a batched publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutEntry {
    /// Serialized record body.
    pub data: Vec<u8>,
    /// Partition key for shard routing.
    pub partition_key: String,
}

/// Per-record status reported by a batched publish call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PutOutcome {
    /// Backend error message for this record, `None` on success.
    pub error: Option<String>,
}

impl PutOutcome {
    /// Whether the record was accepted.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Errors raised by the stream backend and the producer/consumer built on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    /// A backend call failed (network, auth, throttling).
    #[error("transport failure: {message}")]
    Transport {
        /// Backend error detail.
        message: String,
    },

    /// Stream or shard listing failed. Fatal to consumer start.
    #[error("stream discovery failed: {message}")]
    Discovery {
        /// Backend error detail.
        message: String,
    },

    /// A record body could not be decoded. Skips one record.
    #[error("record decode failed: {message}")]
    Decode {
        /// Decoder error detail.
        message: String,
    },

    /// The bounded retry budget was consumed.
    #[error("retry budget exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Total publish attempts made, including the initial one.
        attempts: u32,
        /// The error from the final attempt.
        last_error: String,
    },

    /// Caller contract violation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation on a torn-down client.
    #[error("client is closed")]
    Closed,

    /// A batched publish was partially rejected by the backend. The caller
    /// owns resubmitting exactly the failed entries.
    #[error("batch publish rejected {} of {total} records", failed_indices.len())]
    PartialBatch {
        /// Input positions of the rejected records.
        failed_indices: Vec<usize>,
        /// Total records in the batch.
        total: usize,
    },
}

/// Port for the partitioned event-stream backend.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// List the shard ids of a stream.
    async fn describe_stream(&self, stream: &str) -> Result<Vec<String>, StreamError>;

    /// Acquire an iterator for one shard at the given position.
    async fn get_shard_iterator(
        &self,
        stream: &str,
        shard_id: &str,
        position: IteratorPosition,
    ) -> Result<String, StreamError>;

    /// Fetch up to `limit` records from an iterator.
    async fn get_records(&self, iterator: &str, limit: usize) -> Result<RecordBatch, StreamError>;

    /// Publish one record.
    async fn put_record(
        &self,
        stream: &str,
        data: Vec<u8>,
        partition_key: &str,
    ) -> Result<(), StreamError>;

    /// Publish a batch of records in one backend call, returning one status
    /// per input entry, in input order.
    async fn put_records(
        &self,
        stream: &str,
        entries: Vec<PutEntry>,
    ) -> Result<Vec<PutOutcome>, StreamError>;

    /// Release the underlying connection. Idempotent.
    async fn close(&self) {}
}
