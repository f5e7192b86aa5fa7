//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status
//! - `proxy_request_duration_seconds` (histogram): time to origin headers
//! - `recorder_exchanges_total` (counter): handoffs by outcome
//!   (enqueued, dropped, closed)
//! - `recorder_records_total` (counter): store calls by outcome
//!   (stored, failed, timeout)
//! - `recorder_queue_depth` (gauge): exchanges waiting for the consumer
//!
//! # Design Decisions
//! - Recording helpers are plain functions so call sites stay one line
//! - Without an installed exporter every helper is a no-op

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a forwarded request once the origin answered (or failed).
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record what happened to an exchange handed to the recorder.
pub fn record_exchange(outcome: &'static str) {
    counter!("recorder_exchanges_total", "outcome" => outcome).increment(1);
}

/// Record the outcome of a store call.
pub fn record_store(outcome: &'static str) {
    counter!("recorder_records_total", "outcome" => outcome).increment(1);
}

pub fn set_queue_depth(depth: usize) {
    gauge!("recorder_queue_depth").set(depth as f64);
}
