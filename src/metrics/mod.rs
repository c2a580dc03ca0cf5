//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Transfer submissions and failures
//! - Nonce resyncs and gaps
//! - Transfer latency

use crate::error::{FaucetError, FaucetResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    pub static ref TX_SUBMITTED: Counter = register_counter!(
        "faucet_transactions_submitted_total",
        "Total transactions accepted by the endpoint"
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "faucet_transactions_failed_total",
        "Total failed transfers by error kind",
        &["kind"]
    ).unwrap();

    pub static ref TX_LATENCY: Histogram = register_histogram!(
        "faucet_transfer_latency_seconds",
        "Time from transfer request to endpoint acceptance",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    pub static ref NONCE_RESYNCS: CounterVec = register_counter_vec!(
        "faucet_nonce_resyncs_total",
        "Nonce resynchronizations by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref NONCE_GAPS: Counter = register_counter!(
        "faucet_nonce_gaps_total",
        "Nonces allocated but never submitted"
    ).unwrap();

    pub static ref NONCE_CURRENT: Gauge = register_gauge!(
        "faucet_nonce_current",
        "Nonce last observed on the endpoint"
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> FaucetResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| FaucetError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| FaucetError::Internal(format!("Metrics server failed: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Encode the default registry in the text exposition format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

// Helper functions to record metrics

pub fn record_tx_submitted() {
    TX_SUBMITTED.inc();
}

pub fn record_tx_failed(kind: &str) {
    TX_FAILED.with_label_values(&[kind]).inc();
}

pub fn record_tx_latency(latency_secs: f64) {
    TX_LATENCY.observe(latency_secs);
}

pub fn record_nonce_resync(outcome: &str) {
    NONCE_RESYNCS.with_label_values(&[outcome]).inc();
}

pub fn record_nonce_gap() {
    NONCE_GAPS.inc();
}

pub fn record_nonce(nonce: u64) {
    NONCE_CURRENT.set(nonce as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_recorded_metrics() {
        record_tx_failed("rejected");
        record_nonce_gap();

        let output = render().unwrap();
        assert!(output.contains("faucet_transactions_failed_total"));
        assert!(output.contains("faucet_nonce_gaps_total"));
    }
}
