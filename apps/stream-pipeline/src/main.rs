//! Stream Pipeline Binary
//!
//! Runs the full pipeline in one process: the candle poller publishes onto
//! the stream and the consumer drains every shard into the candle store.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p stream-pipeline
//! ```
//!
//! # Environment Variables
//!
//! ## Optional
//! - `STREAM_NAME`: stream name (default: liquidity-master)
//! - `STREAM_REGION`: backend region tag (default: us-east-2)
//! - `STREAM_SHARD_COUNT`: shard count (default: 2)
//! - `PARTITION_KEY`: candle partition key (default: ohlcv)
//! - `SYMBOLS`: comma-separated pair symbols
//! - `SOURCES`: `;`-separated `id=url_template` candle sources
//! - `DATABASE_URL`: PostgreSQL URL; in-memory store when unset
//! - `POLL_PERIOD_SECS`: poll cycle period (default: 60)
//! - `RUST_LOG`: log filter (default: stream_pipeline=info)

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use stream_pipeline::application::ports::{CandleStore, MarketSource, StreamTransport};
use stream_pipeline::{
    CandlePoller, CandleSink, InMemoryCandleStore, InMemoryTransport, PipelineConfig,
    PostgresCandleStore, RestCandleSource, StreamConsumer, StreamProducer, init_metrics,
};

/// Connection pool size for the PostgreSQL store.
const STORE_MAX_CONNECTIONS: u32 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stream_pipeline=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    init_metrics();

    tracing::info!("Starting stream pipeline");

    let config = PipelineConfig::from_env()?;
    tracing::info!(
        stream = %config.stream.stream_name,
        region = %config.stream.region,
        shards = config.shard_count,
        sources = config.sources.len(),
        symbols = config.symbols.len(),
        "Configuration loaded"
    );

    // The in-process transport backs local runs; deployment swaps a managed
    // stream adapter behind the same port.
    let transport = Arc::new(InMemoryTransport::new());
    transport.create_stream(&config.stream.stream_name, config.shard_count);
    let transport: Arc<dyn StreamTransport> = transport;

    let producer = Arc::new(StreamProducer::new(&config.stream, Arc::clone(&transport)));

    let sources: Vec<Arc<dyn MarketSource>> = config
        .sources
        .iter()
        .map(|source| {
            Arc::new(RestCandleSource::new(&source.id, &source.url_template))
                as Arc<dyn MarketSource>
        })
        .collect();

    let store: Arc<dyn CandleStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresCandleStore::connect(url, STORE_MAX_CONNECTIONS).await?;
            store.ensure_schema().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, candles are stored in memory only");
            Arc::new(InMemoryCandleStore::new())
        }
    };
    let sink = Arc::new(CandleSink::new(store));

    let consumer = Arc::new(
        StreamConsumer::new(&config.stream, Arc::clone(&transport), config.consumer.clone())
            .with_partition_filter(config.partition_key.clone()),
    );

    let shutdown = CancellationToken::new();

    let poller = CandlePoller::new(
        Arc::clone(&producer),
        sources,
        config.symbols.clone(),
        config.poller.clone(),
        shutdown.child_token(),
    );
    let poller_task = tokio::spawn(poller.run());

    let consumer_task = {
        let consumer = Arc::clone(&consumer);
        tokio::spawn(async move {
            if let Err(err) = consumer.start(sink).await {
                tracing::error!(error = %err, "consumer terminated with error");
            }
        })
    };

    tracing::info!("Pipeline ready");

    await_shutdown().await;

    shutdown.cancel();
    consumer.stop();

    let _ = poller_task.await;
    let _ = consumer_task.await;

    consumer.destroy().await;
    producer.close().await;

    tracing::info!("Pipeline stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
