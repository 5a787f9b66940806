//! Prometheus Metrics Module
//!
//! Exposes pipeline metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Producer**: records published, publish errors, shed backlog records
//! - **Consumer**: records consumed, decode failures, handler errors,
//!   shard fetch errors
//! - **Poller**: per-pair poll failures

use std::sync::OnceLock;

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Safe to call more than once; only the first call installs the recorder.
/// Returns `None` when a recorder was already installed elsewhere in the
/// process.
pub fn init_metrics() -> Option<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Some(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_metrics();
    let _ = PROMETHEUS_HANDLE.set(handle.clone());
    Some(handle)
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

fn register_metrics() {
    describe_counter!(
        "pipeline_records_published_total",
        "Total records accepted by the stream backend"
    );
    describe_counter!(
        "pipeline_publish_errors_total",
        "Total failed publish calls, including partial batch rejections"
    );
    describe_counter!(
        "pipeline_records_shed_total",
        "Total unsent records dropped by the poller's backlog bound"
    );
    describe_counter!(
        "pipeline_poll_failures_total",
        "Total failed (source, symbol) candle polls"
    );
    describe_counter!(
        "pipeline_records_consumed_total",
        "Total records successfully handed to the record handler"
    );
    describe_counter!(
        "pipeline_decode_failures_total",
        "Total records skipped because their body failed to decode"
    );
    describe_counter!(
        "pipeline_handler_errors_total",
        "Total records whose handler invocation failed"
    );
    describe_counter!(
        "pipeline_shard_fetch_errors_total",
        "Total failed shard fetch or iterator calls"
    );
}

/// Count records accepted by the backend.
pub fn record_published(count: u64) {
    counter!("pipeline_records_published_total").increment(count);
}

/// Count one failed publish call.
pub fn record_publish_error() {
    counter!("pipeline_publish_errors_total").increment(1);
}

/// Count unsent records dropped by the backlog bound.
pub fn record_shed(count: u64) {
    counter!("pipeline_records_shed_total").increment(count);
}

/// Count one failed (source, symbol) poll.
pub fn record_poll_failure() {
    counter!("pipeline_poll_failures_total").increment(1);
}

/// Count one record delivered to the handler.
pub fn record_consumed() {
    counter!("pipeline_records_consumed_total").increment(1);
}

/// Count one undecodable record.
pub fn record_decode_failure() {
    counter!("pipeline_decode_failures_total").increment(1);
}

/// Count one failed handler invocation.
pub fn record_handler_error() {
    counter!("pipeline_handler_errors_total").increment(1);
}

/// Count one failed shard fetch.
pub fn record_fetch_error() {
    counter!("pipeline_shard_fetch_errors_total").increment(1);
}
