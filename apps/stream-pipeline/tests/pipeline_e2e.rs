//! Pipeline Integration Tests
//!
//! Runs the producer, the multi-shard consumer and the candle sink against
//! the in-memory transport and store, covering shard fan-out, cooperative
//! stop, partition filtering, per-record skip semantics and end-to-end
//! idempotent persistence.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::timeout;

use stream_pipeline::application::ports::{
    CandleStore, RecordHandler, StreamTransport,
};
use stream_pipeline::{
    CandleBar, CandleSink, ConsumerSettings, ConsumerState, InMemoryCandleStore,
    InMemoryTransport, OhlcvRecord, StreamConfig, StreamConsumer, StreamError, StreamProducer,
    StreamRecord, WireEvent,
};

const STREAM: &str = "it-stream";

/// Reader loops tick fast in tests so stop latency stays small.
fn test_settings() -> ConsumerSettings {
    ConsumerSettings {
        fetch_limit: 100,
        poll_interval: Duration::from_millis(10),
        error_backoff: Duration::from_millis(20),
    }
}

fn stream_config() -> StreamConfig {
    StreamConfig {
        stream_name: STREAM.to_string(),
        region: "local".to_string(),
    }
}

fn candle_event(exchange: &str, symbol: &str, open_time: i64, close: f64) -> WireEvent {
    WireEvent::Ohlcv(OhlcvRecord {
        exchange: exchange.to_string(),
        symbol: symbol.to_string(),
        candle: CandleBar {
            open_time,
            open: 100.0,
            high: 110.0,
            low: 95.0,
            close,
            volume: 5.0,
        },
        liquidity: None,
        network_id: None,
    })
}

/// Handler that records every event it sees.
#[derive(Default)]
struct CollectingHandler {
    events: Mutex<Vec<WireEvent>>,
}

impl CollectingHandler {
    fn count(&self) -> usize {
        self.events.lock().len()
    }
}

#[async_trait]
impl RecordHandler for CollectingHandler {
    async fn handle(&self, event: WireEvent) -> anyhow::Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Spin up a transport with one stream, a consumer over it and the reader
/// tasks, returning once every shard reader has its iterator.
async fn start_consumer(
    shard_count: usize,
    handler: Arc<dyn RecordHandler>,
    partition_filter: Option<&str>,
) -> (
    Arc<InMemoryTransport>,
    Arc<StreamConsumer>,
    tokio::task::JoinHandle<Result<(), StreamError>>,
) {
    let transport = Arc::new(InMemoryTransport::new());
    transport.create_stream(STREAM, shard_count);

    let mut consumer = StreamConsumer::new(
        &stream_config(),
        Arc::clone(&transport) as Arc<dyn StreamTransport>,
        test_settings(),
    );
    if let Some(filter) = partition_filter {
        consumer = consumer.with_partition_filter(filter);
    }
    let consumer = Arc::new(consumer);

    let task = {
        let consumer = Arc::clone(&consumer);
        tokio::spawn(async move { consumer.start(handler).await })
    };

    // LATEST iterators see nothing published before they exist; wait until
    // every reader is positioned.
    timeout(Duration::from_secs(5), async {
        while transport.iterator_requests() < shard_count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("shard readers never acquired their iterators");

    (transport, consumer, task)
}

async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    timeout(deadline, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

// =============================================================================
// Shard fan-out and cooperative stop
// =============================================================================

#[tokio::test]
async fn two_shards_get_two_readers_and_stop_terminates_both() {
    let handler = Arc::new(CollectingHandler::default());
    let (transport, consumer, task) =
        start_consumer(2, Arc::clone(&handler) as Arc<dyn RecordHandler>, None).await;

    // Exactly one iterator per shard was requested.
    assert_eq!(transport.iterator_requests(), 2);
    assert_eq!(consumer.state(), ConsumerState::Running);

    consumer.stop();

    // Both readers observe the cancellation within one loop iteration;
    // start() returns only after every reader terminated.
    let result = timeout(Duration::from_secs(1), task)
        .await
        .expect("readers did not stop in time")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(consumer.state(), ConsumerState::Stopped);
}

#[tokio::test]
async fn start_fails_fast_on_unknown_stream() {
    let transport = Arc::new(InMemoryTransport::new());
    let consumer = StreamConsumer::new(
        &stream_config(),
        transport as Arc<dyn StreamTransport>,
        test_settings(),
    );

    let err = consumer
        .start(Arc::new(CollectingHandler::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::Discovery { .. }));
    assert_eq!(consumer.state(), ConsumerState::Stopped);
}

#[tokio::test]
async fn destroy_is_safe_before_start() {
    let transport = Arc::new(InMemoryTransport::new());
    transport.create_stream(STREAM, 1);
    let consumer = StreamConsumer::new(
        &stream_config(),
        transport as Arc<dyn StreamTransport>,
        test_settings(),
    );

    consumer.destroy().await;
    assert_eq!(consumer.state(), ConsumerState::Idle);
}

// =============================================================================
// Partition-key filtering
// =============================================================================

#[tokio::test]
async fn filter_delivers_only_matching_partition_keys() {
    let handler = Arc::new(CollectingHandler::default());
    let (transport, consumer, task) = start_consumer(
        1,
        Arc::clone(&handler) as Arc<dyn RecordHandler>,
        Some("ohlcv"),
    )
    .await;

    let matching = serde_json::to_vec(&candle_event("coinbase", "BTC/USDT", 1, 101.0)).unwrap();
    let other = serde_json::to_vec(&candle_event("coinbase", "ETH/USDT", 2, 55.0)).unwrap();
    transport
        .put_record(STREAM, matching, "ohlcv")
        .await
        .unwrap();
    transport.put_record(STREAM, other, "pairs").await.unwrap();

    assert!(wait_until(Duration::from_secs(5), || handler.count() == 1).await);
    // Give the reader another fetch cycle: the filtered record must never
    // arrive, and the matching one must not be delivered twice.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handler.count(), 1);

    let events = handler.events.lock().clone();
    match &events[0] {
        WireEvent::Ohlcv(record) => assert_eq!(record.symbol, "BTC/USDT"),
        other => panic!("unexpected event {other:?}"),
    }

    consumer.stop();
    let _ = timeout(Duration::from_secs(1), task).await.unwrap();
}

// =============================================================================
// Per-record skip semantics
// =============================================================================

#[tokio::test]
async fn malformed_bytes_do_not_block_later_records() {
    let handler = Arc::new(CollectingHandler::default());
    let (transport, consumer, task) =
        start_consumer(1, Arc::clone(&handler) as Arc<dyn RecordHandler>, None).await;

    transport
        .put_record(STREAM, b"{not json".to_vec(), "ohlcv")
        .await
        .unwrap();
    let valid = serde_json::to_vec(&candle_event("kraken", "SOL/USDT", 3, 9.5)).unwrap();
    transport.put_record(STREAM, valid, "ohlcv").await.unwrap();

    assert!(wait_until(Duration::from_secs(5), || handler.count() == 1).await);
    let events = handler.events.lock().clone();
    match &events[0] {
        WireEvent::Ohlcv(record) => assert_eq!(record.exchange, "kraken"),
        other => panic!("unexpected event {other:?}"),
    }

    consumer.stop();
    let _ = timeout(Duration::from_secs(1), task).await.unwrap();
}

#[tokio::test]
async fn failing_handler_does_not_abort_the_shard() {
    /// Handler that rejects the first delivery and counts the rest.
    #[derive(Default)]
    struct FlakyHandler {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl RecordHandler for FlakyHandler {
        async fn handle(&self, _event: WireEvent) -> anyhow::Result<()> {
            let mut calls = self.calls.lock();
            *calls += 1;
            if *calls == 1 {
                anyhow::bail!("transient sink failure");
            }
            Ok(())
        }
    }

    let handler = Arc::new(FlakyHandler::default());
    let (transport, consumer, task) =
        start_consumer(1, Arc::clone(&handler) as Arc<dyn RecordHandler>, None).await;

    for open_time in 1..=2 {
        let data =
            serde_json::to_vec(&candle_event("okx", "XRP/USDT", open_time, 0.6)).unwrap();
        transport.put_record(STREAM, data, "ohlcv").await.unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || *handler.calls.lock() == 2).await);

    consumer.stop();
    let _ = timeout(Duration::from_secs(1), task).await.unwrap();
}

// =============================================================================
// End-to-end: batch publish -> consume -> idempotent persistence
// =============================================================================

#[tokio::test]
async fn batch_of_eight_lands_as_eight_distinct_rows() {
    let store = Arc::new(InMemoryCandleStore::new());
    let sink = Arc::new(CandleSink::new(
        Arc::clone(&store) as Arc<dyn CandleStore>
    ));
    let (transport, consumer, task) =
        start_consumer(2, sink as Arc<dyn RecordHandler>, None).await;

    let producer = StreamProducer::new(
        &stream_config(),
        Arc::clone(&transport) as Arc<dyn StreamTransport>,
    );

    let base = 1_700_000_000_000_i64;
    let records: Vec<StreamRecord> = (0..8)
        .map(|i| {
            StreamRecord::new(
                candle_event(
                    "coinbase",
                    "BTC/USDT",
                    base + i64::from(i) * 60_000,
                    100.0 + f64::from(i),
                ),
                "ohlcv",
            )
        })
        .collect();
    producer.publish_batch(&records).await.unwrap();

    assert!(wait_until(Duration::from_secs(5), || store.len() == 8).await);

    // Every row is a distinct natural key with the published close price.
    for i in 0..8 {
        let row = store
            .get("coinbase", "BTC/USDT", base + i64::from(i) * 60_000)
            .unwrap();
        assert_eq!(row.close, 100.0 + f64::from(i));
    }

    consumer.stop();
    let _ = timeout(Duration::from_secs(1), task).await.unwrap();
    producer.close().await;
}

#[tokio::test]
async fn replayed_batch_stays_idempotent_end_to_end() {
    let store = Arc::new(InMemoryCandleStore::new());
    let sink = Arc::new(CandleSink::new(
        Arc::clone(&store) as Arc<dyn CandleStore>
    ));
    let (transport, consumer, task) =
        start_consumer(1, sink as Arc<dyn RecordHandler>, None).await;

    let producer = StreamProducer::new(
        &stream_config(),
        Arc::clone(&transport) as Arc<dyn StreamTransport>,
    );

    let open_time = 1_700_000_000_000_i64;
    let first = vec![StreamRecord::new(
        candle_event("coinbase", "BTC/USDT", open_time, 101.0),
        "ohlcv",
    )];
    let replay = vec![StreamRecord::new(
        candle_event("coinbase", "BTC/USDT", open_time, 104.5),
        "ohlcv",
    )];

    producer.publish_batch(&first).await.unwrap();
    producer.publish_batch(&replay).await.unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        store
            .get("coinbase", "BTC/USDT", open_time)
            .is_some_and(|row| row.close == 104.5)
    })
    .await);
    assert_eq!(store.len(), 1);

    consumer.stop();
    let _ = timeout(Duration::from_secs(1), task).await.unwrap();
}
