//! Stream Producer
//!
//! Publishes records to the stream with three durability/latency trade-offs
//! the caller picks per record type:
//!
//! - [`publish`](StreamProducer::publish): best-effort single record, no
//!   retry; the caller decides whether to retry.
//! - [`publish_batch`](StreamProducer::publish_batch): one backend call for
//!   a whole batch; bounds backpressure for high-frequency records.
//! - [`publish_with_retry`](StreamProducer::publish_with_retry): bounded
//!   exponential backoff for records that are costly to lose.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;

use crate::application::ports::{PutEntry, StreamError, StreamTransport};
use crate::domain::record::{StreamRecord, WireEvent};
use crate::infrastructure::metrics;

use super::{RetryPolicy, StreamConfig};

/// Publishes records onto one configured stream.
pub struct StreamProducer {
    stream_name: String,
    transport: Arc<dyn StreamTransport>,
    closed: AtomicBool,
}

impl StreamProducer {
    /// Create a producer for the configured stream.
    #[must_use]
    pub fn new(config: &StreamConfig, transport: Arc<dyn StreamTransport>) -> Self {
        Self {
            stream_name: config.stream_name.clone(),
            transport,
            closed: AtomicBool::new(false),
        }
    }

    /// Publish a single record under a wall-clock partition key.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] on any backend failure and
    /// [`StreamError::Closed`] after [`close`](Self::close).
    pub async fn publish(&self, event: &WireEvent) -> Result<(), StreamError> {
        let key = Utc::now().timestamp_millis().to_string();
        self.publish_with_key(event, &key).await
    }

    /// Publish a single record under an explicit domain partition key.
    ///
    /// # Errors
    ///
    /// Same contract as [`publish`](Self::publish).
    pub async fn publish_with_key(
        &self,
        event: &WireEvent,
        partition_key: &str,
    ) -> Result<(), StreamError> {
        self.ensure_open()?;
        let data = encode(event)?;
        match self
            .transport
            .put_record(&self.stream_name, data, partition_key)
            .await
        {
            Ok(()) => {
                metrics::record_published(1);
                Ok(())
            }
            Err(err) => {
                metrics::record_publish_error();
                Err(err)
            }
        }
    }

    /// Publish a non-empty batch in one backend call, preserving input
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidArgument`] for an empty batch,
    /// [`StreamError::PartialBatch`] when the backend rejects a subset of
    /// records (the caller resubmits exactly those), and
    /// [`StreamError::Transport`] when the whole call fails.
    pub async fn publish_batch(&self, records: &[StreamRecord]) -> Result<(), StreamError> {
        self.ensure_open()?;
        if records.is_empty() {
            return Err(StreamError::InvalidArgument(
                "batch must contain at least one record".to_string(),
            ));
        }

        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            entries.push(PutEntry {
                data: encode(&record.data)?,
                partition_key: record.partition_key.clone(),
            });
        }

        let outcomes = match self.transport.put_records(&self.stream_name, entries).await {
            Ok(outcomes) => outcomes,
            Err(err) => {
                metrics::record_publish_error();
                return Err(err);
            }
        };

        let failed_indices: Vec<usize> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, outcome)| !outcome.is_ok())
            .map(|(index, _)| index)
            .collect();

        if failed_indices.is_empty() {
            metrics::record_published(records.len() as u64);
            Ok(())
        } else {
            metrics::record_published((records.len() - failed_indices.len()) as u64);
            metrics::record_publish_error();
            Err(StreamError::PartialBatch {
                failed_indices,
                total: records.len(),
            })
        }
    }

    /// Publish a single record, retrying with exponential backoff.
    ///
    /// Attempts `1 + policy.max_retries` publishes; the n-th retry sleeps
    /// `policy.delay_for(n)` first. The sleep suspends only the calling
    /// task.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::RetryExhausted`] once the budget is consumed,
    /// and [`StreamError::Closed`] immediately without retrying.
    pub async fn publish_with_retry(
        &self,
        event: &WireEvent,
        policy: &RetryPolicy,
    ) -> Result<(), StreamError> {
        let mut attempts: u32 = 0;
        loop {
            match self.publish(event).await {
                Ok(()) => return Ok(()),
                Err(StreamError::Closed) => return Err(StreamError::Closed),
                Err(err) => {
                    attempts += 1;
                    if attempts > policy.max_retries {
                        return Err(StreamError::RetryExhausted {
                            attempts,
                            last_error: err.to_string(),
                        });
                    }
                    let delay = policy.delay_for(attempts);
                    tracing::warn!(
                        stream = %self.stream_name,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "publish failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Release the transport handle. Idempotent; later publishes fail with
    /// [`StreamError::Closed`].
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.transport.close().await;
            tracing::info!(stream = %self.stream_name, "producer closed");
        }
    }

    fn ensure_open(&self) -> Result<(), StreamError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StreamError::Closed)
        } else {
            Ok(())
        }
    }
}

fn encode(event: &WireEvent) -> Result<Vec<u8>, StreamError> {
    serde_json::to_vec(event)
        .map_err(|err| StreamError::InvalidArgument(format!("unserializable payload: {err}")))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::application::ports::{IteratorPosition, PutOutcome, RecordBatch};
    use crate::domain::record::{CandleBar, OhlcvRecord};

    use super::*;

    fn config() -> StreamConfig {
        StreamConfig {
            stream_name: "test-stream".to_string(),
            region: "local".to_string(),
        }
    }

    fn candle_event(close: f64) -> WireEvent {
        WireEvent::Ohlcv(OhlcvRecord {
            exchange: "coinbase".to_string(),
            symbol: "BTC/USDT".to_string(),
            candle: CandleBar {
                open_time: 1_700_000_000_000,
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close,
                volume: 10.0,
            },
            liquidity: None,
            network_id: None,
        })
    }

    /// Transport fake that records calls and answers from a script.
    #[derive(Default)]
    struct ScriptedTransport {
        put_record_calls: AtomicUsize,
        put_records_calls: AtomicUsize,
        batches: Mutex<Vec<Vec<PutEntry>>>,
        fail_all: bool,
        reject_indices: Vec<usize>,
    }

    impl ScriptedTransport {
        fn failing() -> Self {
            Self {
                fail_all: true,
                ..Self::default()
            }
        }

        fn rejecting(indices: Vec<usize>) -> Self {
            Self {
                reject_indices: indices,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl StreamTransport for ScriptedTransport {
        async fn describe_stream(&self, _stream: &str) -> Result<Vec<String>, StreamError> {
            Ok(vec![])
        }

        async fn get_shard_iterator(
            &self,
            _stream: &str,
            _shard_id: &str,
            _position: IteratorPosition,
        ) -> Result<String, StreamError> {
            Err(StreamError::Transport {
                message: "not implemented".to_string(),
            })
        }

        async fn get_records(
            &self,
            _iterator: &str,
            _limit: usize,
        ) -> Result<RecordBatch, StreamError> {
            Err(StreamError::Transport {
                message: "not implemented".to_string(),
            })
        }

        async fn put_record(
            &self,
            _stream: &str,
            _data: Vec<u8>,
            _partition_key: &str,
        ) -> Result<(), StreamError> {
            self.put_record_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_all {
                Err(StreamError::Transport {
                    message: "injected failure".to_string(),
                })
            } else {
                Ok(())
            }
        }

        async fn put_records(
            &self,
            _stream: &str,
            entries: Vec<PutEntry>,
        ) -> Result<Vec<PutOutcome>, StreamError> {
            self.put_records_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_all {
                return Err(StreamError::Transport {
                    message: "injected failure".to_string(),
                });
            }
            let outcomes = (0..entries.len())
                .map(|index| {
                    if self.reject_indices.contains(&index) {
                        PutOutcome {
                            error: Some("throughput exceeded".to_string()),
                        }
                    } else {
                        PutOutcome::default()
                    }
                })
                .collect();
            self.batches.lock().push(entries);
            Ok(outcomes)
        }
    }

    #[tokio::test]
    async fn batch_issues_one_call_in_input_order() {
        let transport = Arc::new(ScriptedTransport::default());
        let dyn_transport: Arc<dyn StreamTransport> = transport.clone();
        let producer = StreamProducer::new(&config(), dyn_transport);

        let records: Vec<StreamRecord> = (0..5)
            .map(|i| StreamRecord::new(candle_event(f64::from(i)), "ohlcv"))
            .collect();

        producer.publish_batch(&records).await.unwrap();

        assert_eq!(transport.put_records_calls.load(Ordering::SeqCst), 1);
        let batches = transport.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 5);
        for (entry, record) in batches[0].iter().zip(&records) {
            let decoded: WireEvent = serde_json::from_slice(&entry.data).unwrap();
            assert_eq!(decoded, record.data);
        }
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let transport = Arc::new(ScriptedTransport::default());
        let producer = StreamProducer::new(&config(), transport);

        let err = producer.publish_batch(&[]).await.unwrap_err();
        assert!(matches!(err, StreamError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn partial_rejection_reports_failed_indices() {
        let transport = Arc::new(ScriptedTransport::rejecting(vec![1, 3]));
        let producer = StreamProducer::new(&config(), transport);

        let records: Vec<StreamRecord> = (0..4)
            .map(|i| StreamRecord::new(candle_event(f64::from(i)), "ohlcv"))
            .collect();

        let err = producer.publish_batch(&records).await.unwrap_err();
        match err {
            StreamError::PartialBatch {
                failed_indices,
                total,
            } => {
                assert_eq!(failed_indices, vec![1, 3]);
                assert_eq!(total, 4);
            }
            other => panic!("expected PartialBatch, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_exhaustion_follows_the_backoff_schedule() {
        let transport = Arc::new(ScriptedTransport::failing());
        let dyn_transport: Arc<dyn StreamTransport> = transport.clone();
        let producer = StreamProducer::new(&config(), dyn_transport);

        let started = tokio::time::Instant::now();
        let err = producer
            .publish_with_retry(&candle_event(1.0), &RetryPolicy::default())
            .await
            .unwrap_err();

        // 1 initial attempt + 3 retries, sleeping 100/200/400ms between.
        assert_eq!(transport.put_record_calls.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), Duration::from_millis(700));
        match err {
            StreamError::RetryExhausted { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_sleeps_never_exceed_max_delay() {
        let transport = Arc::new(ScriptedTransport::failing());
        let dyn_transport: Arc<dyn StreamTransport> = transport.clone();
        let producer = StreamProducer::new(&config(), dyn_transport);

        let policy = RetryPolicy::new(
            10,
            Duration::from_millis(100),
            Duration::from_millis(5000),
        );
        let started = tokio::time::Instant::now();
        let err = producer
            .publish_with_retry(&candle_event(1.0), &policy)
            .await
            .unwrap_err();

        assert!(matches!(err, StreamError::RetryExhausted { attempts: 11, .. }));
        // 100+200+400+800+1600+3200 then four clamped 5000ms sleeps.
        assert_eq!(started.elapsed(), Duration::from_millis(26_300));
    }

    #[tokio::test]
    async fn publish_after_close_fails_closed() {
        let transport = Arc::new(ScriptedTransport::default());
        let producer = StreamProducer::new(&config(), transport);

        producer.close().await;
        producer.close().await; // idempotent

        let err = producer.publish(&candle_event(1.0)).await.unwrap_err();
        assert!(matches!(err, StreamError::Closed));

        let err = producer
            .publish_with_retry(&candle_event(1.0), &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Closed));
    }
}
