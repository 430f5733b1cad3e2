//! Metrics collection and exposition.
//!
//! # Metrics
//! - `honeypot_requests_total` (counter): proxied calls by method, status
//! - `honeypot_upstream_duration_seconds` (histogram): upstream latency
//! - `honeypot_forward_failures_total` (counter): failed forwards by kind
//! - `honeypot_capture_failures_total` (counter): failed audit writes by stage
//!
//! Without an installed recorder every call here is a no-op.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one completed proxied call.
pub fn record_request(method: &str, status: u16) {
    counter!(
        "honeypot_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record the time an upstream call took, success or failure.
pub fn record_upstream_duration(method: &str, elapsed_ms: u64) {
    histogram!("honeypot_upstream_duration_seconds", "method" => method.to_string())
        .record(elapsed_ms as f64 / 1000.0);
}

pub fn record_forward_failure(kind: &'static str) {
    counter!("honeypot_forward_failures_total", "kind" => kind).increment(1);
}

/// `stage` is `"request"` or `"response"`.
pub fn record_capture_failure(stage: &'static str) {
    counter!("honeypot_capture_failures_total", "stage" => stage).increment(1);
}
