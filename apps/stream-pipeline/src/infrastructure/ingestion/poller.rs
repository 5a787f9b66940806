//! Periodic Multi-Source Candle Poller
//!
//! Every poll period, polls each configured (source, symbol) pair once,
//! accumulates one record per successful poll and publishes the batch.
//! Per-pair failures are skipped individually; a publish failure keeps the
//! batch as an unsent backlog for the next cycle. The backlog is bounded:
//! past `backlog_factor x sources x symbols` entries the oldest are shed,
//! trading completeness for freshness and bounded memory.
//!
//! The cycle sleeps only the remainder of the period, so the poll cadence
//! stays wall-clock-stable; a cycle that overruns starts the next one
//! immediately.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::ports::{MarketSource, StreamError};
use crate::domain::record::{OhlcvRecord, StreamRecord, WireEvent};
use crate::infrastructure::metrics;
use crate::infrastructure::stream::StreamProducer;

/// Tuning knobs for the poll loop.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Target wall-clock period of one poll cycle.
    pub poll_period: Duration,
    /// Partition key all candle records are published under.
    pub partition_key: String,
    /// Backlog bound as a multiple of records-per-cycle.
    pub backlog_factor: usize,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_secs(60),
            partition_key: "ohlcv".to_string(),
            backlog_factor: 3,
        }
    }
}

/// Polls candle sources on a fixed cadence and publishes batches.
pub struct CandlePoller {
    producer: Arc<StreamProducer>,
    sources: Vec<Arc<dyn MarketSource>>,
    symbols: Vec<String>,
    settings: PollerSettings,
    cancel: CancellationToken,
    backlog: Vec<StreamRecord>,
}

impl CandlePoller {
    /// Create a poller over the given sources and symbols.
    #[must_use]
    pub fn new(
        producer: Arc<StreamProducer>,
        sources: Vec<Arc<dyn MarketSource>>,
        symbols: Vec<String>,
        settings: PollerSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            producer,
            sources,
            symbols,
            settings,
            cancel,
            backlog: Vec::new(),
        }
    }

    /// Run poll cycles until cancelled.
    pub async fn run(mut self) {
        tracing::info!(
            sources = self.sources.len(),
            symbols = self.symbols.len(),
            period_secs = self.settings.poll_period.as_secs(),
            "candle poller started"
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let started = tokio::time::Instant::now();
            self.run_cycle().await;

            let remaining = self.settings.poll_period.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                // Overran the period: start the next cycle immediately.
                continue;
            }
            let cancelled = tokio::select! {
                () = self.cancel.cancelled() => true,
                () = tokio::time::sleep(remaining) => false,
            };
            if cancelled {
                break;
            }
        }

        tracing::info!("candle poller stopped");
    }

    /// Poll every (source, symbol) pair once and publish the backlog.
    pub(crate) async fn run_cycle(&mut self) {
        for symbol in &self.symbols {
            for source in &self.sources {
                match source.poll(symbol).await {
                    Ok(candle) => {
                        self.backlog.push(StreamRecord::new(
                            WireEvent::Ohlcv(OhlcvRecord {
                                exchange: source.id().to_string(),
                                symbol: symbol.clone(),
                                candle,
                                liquidity: None,
                                network_id: None,
                            }),
                            self.settings.partition_key.clone(),
                        ));
                    }
                    Err(err) => {
                        metrics::record_poll_failure();
                        tracing::warn!(
                            source = %source.id(),
                            symbol = %symbol,
                            error = %err,
                            "candle poll failed, skipping pair"
                        );
                    }
                }
            }
        }

        if self.backlog.is_empty() {
            return;
        }

        match self.producer.publish_batch(&self.backlog).await {
            Ok(()) => {
                tracing::info!(count = self.backlog.len(), "published candle batch");
                self.backlog.clear();
            }
            Err(StreamError::PartialBatch {
                failed_indices,
                total,
            }) => {
                tracing::warn!(
                    failed = failed_indices.len(),
                    total,
                    "batch partially rejected, retaining failed records"
                );
                let failed: HashSet<usize> = failed_indices.into_iter().collect();
                let pending = std::mem::take(&mut self.backlog);
                self.backlog = pending
                    .into_iter()
                    .enumerate()
                    .filter_map(|(index, record)| failed.contains(&index).then_some(record))
                    .collect();
                self.shed_backlog();
            }
            Err(err) => {
                tracing::warn!(
                    pending = self.backlog.len(),
                    error = %err,
                    "batch publish failed, retaining backlog"
                );
                self.shed_backlog();
            }
        }
    }

    /// Number of unsent records carried into the next cycle.
    #[cfg(test)]
    pub(crate) fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Bound the unsent backlog, dropping the oldest entries.
    fn shed_backlog(&mut self) {
        let per_cycle = self.sources.len().saturating_mul(self.symbols.len()).max(1);
        let bound = self.settings.backlog_factor.saturating_mul(per_cycle);
        if self.backlog.len() > bound {
            let dropped = self.backlog.len() - bound;
            self.backlog.drain(..dropped);
            metrics::record_shed(dropped as u64);
            tracing::warn!(dropped, bound, "shedding oldest unsent records");
        }
    }
}
