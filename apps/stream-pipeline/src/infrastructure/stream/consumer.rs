//! Stream Consumer
//!
//! Continuously delivers records from every shard of a stream to a
//! [`RecordHandler`] until stopped. One reader task per shard; shard tasks
//! share nothing mutable except the cancellation token.
//!
//! # Lifecycle
//!
//! `Idle -> Running -> Stopping -> Stopped`. [`start`](StreamConsumer::start)
//! discovers shards, spawns the readers and **joins** them: it returns only
//! when every reader has terminated. [`stop`](StreamConsumer::stop) cancels
//! cooperatively; readers observe the token at the top of the next loop
//! iteration, so in-flight fetch and handler calls complete first.
//!
//! # Delivery semantics
//!
//! At-least-once, best-effort. The shard iterator advances before the
//! handler runs, so a crash between iterator-advance and handler-completion
//! can drop a record. Decode and handler failures skip one record and never
//! abort the shard.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    FetchedRecord, IteratorPosition, RecordHandler, StreamError, StreamTransport,
};
use crate::domain::record::WireEvent;
use crate::infrastructure::metrics;

use super::StreamConfig;

/// Consumer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Created, not yet started.
    Idle,
    /// Shard readers are running.
    Running,
    /// Stop requested; readers are draining.
    Stopping,
    /// All readers have terminated.
    Stopped,
}

/// Tuning knobs for the per-shard reader loops.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Maximum records per fetch call.
    pub fetch_limit: usize,
    /// Sleep between fetch cycles, bounding the backend request rate.
    pub poll_interval: Duration,
    /// Sleep after a fetch error before retrying the same iterator.
    pub error_backoff: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            fetch_limit: 100,
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// Cursor over one shard, owned exclusively by that shard's reader task.
#[derive(Debug, Clone)]
struct ShardCursor {
    shard_id: String,
    /// `None` once the backend reports the shard closed.
    iterator: Option<String>,
}

/// Consumes every shard of one stream.
pub struct StreamConsumer {
    stream_name: String,
    transport: Arc<dyn StreamTransport>,
    partition_filter: Option<String>,
    settings: ConsumerSettings,
    cancel: CancellationToken,
    state: Mutex<ConsumerState>,
}

impl StreamConsumer {
    /// Create a consumer for the configured stream.
    #[must_use]
    pub fn new(
        config: &StreamConfig,
        transport: Arc<dyn StreamTransport>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            stream_name: config.stream_name.clone(),
            transport,
            partition_filter: None,
            settings,
            cancel: CancellationToken::new(),
            state: Mutex::new(ConsumerState::Idle),
        }
    }

    /// Deliver only records published under this partition key.
    #[must_use]
    pub fn with_partition_filter(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_filter = Some(partition_key.into());
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConsumerState {
        *self.state.lock()
    }

    /// Discover shards, run one reader per shard, and block until every
    /// reader has terminated (via [`stop`](Self::stop) or shard closure).
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Discovery`] when the stream cannot be listed
    /// (fatal, not retried) and [`StreamError::InvalidArgument`] when the
    /// consumer was already started. A consumer is single-use.
    pub async fn start(&self, handler: Arc<dyn RecordHandler>) -> Result<(), StreamError> {
        {
            let mut state = self.state.lock();
            if *state != ConsumerState::Idle {
                return Err(StreamError::InvalidArgument(
                    "consumer can only be started once".to_string(),
                ));
            }
            *state = ConsumerState::Running;
        }

        let shard_ids = match self.transport.describe_stream(&self.stream_name).await {
            Ok(ids) => ids,
            Err(err) => {
                *self.state.lock() = ConsumerState::Stopped;
                let err = match err {
                    discovery @ StreamError::Discovery { .. } => discovery,
                    other => StreamError::Discovery {
                        message: other.to_string(),
                    },
                };
                tracing::error!(stream = %self.stream_name, error = %err, "shard discovery failed");
                return Err(err);
            }
        };

        tracing::info!(
            stream = %self.stream_name,
            shards = shard_ids.len(),
            filter = self.partition_filter.as_deref().unwrap_or("<none>"),
            "starting shard readers"
        );

        let mut tasks = Vec::with_capacity(shard_ids.len());
        for shard_id in shard_ids {
            let reader = ShardReader {
                stream_name: self.stream_name.clone(),
                shard_id,
                transport: Arc::clone(&self.transport),
                handler: Arc::clone(&handler),
                partition_filter: self.partition_filter.clone(),
                settings: self.settings.clone(),
                cancel: self.cancel.clone(),
            };
            tasks.push(tokio::spawn(reader.run()));
        }

        for result in futures::future::join_all(tasks).await {
            if let Err(err) = result {
                tracing::error!(stream = %self.stream_name, error = %err, "shard reader panicked");
            }
        }

        *self.state.lock() = ConsumerState::Stopped;
        tracing::info!(stream = %self.stream_name, "all shard readers terminated");
        Ok(())
    }

    /// Request a cooperative stop. Readers observe the cancellation at the
    /// top of their next loop iteration; in-flight work completes.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == ConsumerState::Running {
                *state = ConsumerState::Stopping;
            }
        }
        self.cancel.cancel();
        tracing::info!(stream = %self.stream_name, "consumer stop requested");
    }

    /// Stop and release the transport. Safe to call even if
    /// [`start`](Self::start) never completed.
    pub async fn destroy(&self) {
        self.stop();
        self.transport.close().await;
    }
}

/// Reads one shard sequentially until cancelled or the shard closes.
struct ShardReader {
    stream_name: String,
    shard_id: String,
    transport: Arc<dyn StreamTransport>,
    handler: Arc<dyn RecordHandler>,
    partition_filter: Option<String>,
    settings: ConsumerSettings,
    cancel: CancellationToken,
}

impl ShardReader {
    async fn run(self) {
        let Some(mut cursor) = self.acquire_cursor().await else {
            return;
        };
        tracing::info!(shard_id = %cursor.shard_id, "shard reader started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some(iterator) = cursor.iterator.clone() else {
                tracing::info!(shard_id = %cursor.shard_id, "shard closed, reader exiting");
                break;
            };

            match self
                .transport
                .get_records(&iterator, self.settings.fetch_limit)
                .await
            {
                Ok(batch) => {
                    cursor.iterator = batch.next_iterator;
                    for record in batch.records {
                        self.deliver(record).await;
                    }
                    if self.sleep_or_cancel(self.settings.poll_interval).await {
                        break;
                    }
                }
                Err(err) => {
                    metrics::record_fetch_error();
                    tracing::warn!(
                        shard_id = %cursor.shard_id,
                        error = %err,
                        "record fetch failed, retrying same iterator"
                    );
                    if self.sleep_or_cancel(self.settings.error_backoff).await {
                        break;
                    }
                }
            }
        }

        tracing::info!(shard_id = %self.shard_id, "shard reader stopped");
    }

    /// Acquire a LATEST iterator, retrying on transient failure.
    ///
    /// Returns `None` when cancelled before an iterator was obtained.
    async fn acquire_cursor(&self) -> Option<ShardCursor> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            match self
                .transport
                .get_shard_iterator(&self.stream_name, &self.shard_id, IteratorPosition::Latest)
                .await
            {
                Ok(iterator) => {
                    return Some(ShardCursor {
                        shard_id: self.shard_id.clone(),
                        iterator: Some(iterator),
                    });
                }
                Err(err) => {
                    metrics::record_fetch_error();
                    tracing::warn!(
                        shard_id = %self.shard_id,
                        error = %err,
                        "shard iterator acquisition failed, retrying"
                    );
                    if self.sleep_or_cancel(self.settings.error_backoff).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Filter, decode and hand one record to the handler. Decode and
    /// handler failures skip the record.
    async fn deliver(&self, record: FetchedRecord) {
        if let Some(filter) = &self.partition_filter
            && record.partition_key != *filter
        {
            return;
        }

        let event: WireEvent = match serde_json::from_slice(&record.data) {
            Ok(event) => event,
            Err(err) => {
                let err = StreamError::Decode {
                    message: err.to_string(),
                };
                metrics::record_decode_failure();
                tracing::warn!(
                    shard_id = %self.shard_id,
                    partition_key = %record.partition_key,
                    error = %err,
                    "skipping undecodable record"
                );
                return;
            }
        };

        match self.handler.handle(event).await {
            Ok(()) => metrics::record_consumed(),
            Err(err) => {
                metrics::record_handler_error();
                tracing::warn!(
                    shard_id = %self.shard_id,
                    partition_key = %record.partition_key,
                    error = %err,
                    "handler failed, continuing with next record"
                );
            }
        }
    }

    /// Sleep, waking early on cancellation. Returns `true` when cancelled.
    async fn sleep_or_cancel(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => true,
            () = tokio::time::sleep(duration) => false,
        }
    }
}
