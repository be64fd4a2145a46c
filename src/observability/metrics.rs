//! Metrics collection and exposition.
//!
//! # Metrics
//! - `supervisor_outcomes_total` (counter): supervised calls by outcome
//! - `supervisor_duration_seconds` (histogram): time until the outcome was committed
//! - `handler_abandoned_total` (counter): handler tasks left running, by reason
//!   (deadline expired or request cancelled)
//! - `handler_late_signal_total` (counter): completion/fault signals nobody read
//! - `http_requests_total` (counter): requests by method, status
//! - `http_request_duration_seconds` (histogram): end-to-end latency
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::time::Instant;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_outcome(outcome: &'static str, started: Instant) {
    metrics::counter!("supervisor_outcomes_total", "outcome" => outcome).increment(1);
    metrics::histogram!("supervisor_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

/// Count a handler task left running because its deadline finished first.
///
/// `reason` is `expired` or `cancelled`.
pub fn record_abandoned(reason: &'static str) {
    metrics::counter!("handler_abandoned_total", "reason" => reason).increment(1);
}

pub fn record_late_signal(signal: &'static str) {
    metrics::counter!("handler_late_signal_total", "signal" => signal).increment(1);
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("http_request_duration_seconds").record(started.elapsed().as_secs_f64());
}
