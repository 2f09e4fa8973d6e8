//! # Prometheus Metrics
//!
//! Exposes issuance metrics for the node. Scraped by Prometheus at the
//! `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] with
//! the `certchain` prefix so they do not collide with the default registry.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Certificates committed to the chain (saved or not).
    pub certificates_issued_total: IntCounter,
    /// Issuance requests refused before a block was built.
    pub certificates_rejected_total: IntCounter,
    /// Snapshot saves that failed after all retries.
    pub snapshot_save_failures_total: IntCounter,
    /// Index of the tip block.
    pub chain_height: IntGauge,
    /// Time spent in append + save, in seconds.
    pub issuance_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("certchain".into()), None)
            .expect("failed to create prometheus registry");

        let certificates_issued_total = IntCounter::new(
            "certificates_issued_total",
            "Total number of certificates committed to the chain",
        )
        .expect("metric creation");
        let certificates_rejected_total = IntCounter::new(
            "certificates_rejected_total",
            "Total number of issuance requests rejected before append",
        )
        .expect("metric creation");
        let snapshot_save_failures_total = IntCounter::new(
            "snapshot_save_failures_total",
            "Total number of snapshot saves that failed after retries",
        )
        .expect("metric creation");
        let chain_height = IntGauge::new("chain_height", "Index of the latest block")
            .expect("metric creation");
        let issuance_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "issuance_latency_seconds",
                "Append plus snapshot save latency in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        )
        .expect("metric creation");

        registry
            .register(Box::new(certificates_issued_total.clone()))
            .expect("metric registration");
        registry
            .register(Box::new(certificates_rejected_total.clone()))
            .expect("metric registration");
        registry
            .register(Box::new(snapshot_save_failures_total.clone()))
            .expect("metric registration");
        registry
            .register(Box::new(chain_height.clone()))
            .expect("metric registration");
        registry
            .register(Box::new(issuance_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            certificates_issued_total,
            certificates_rejected_total,
            snapshot_save_failures_total,
            chain_height,
            issuance_latency_seconds,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics handle passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_metrics_carry_prefix() {
        let metrics = NodeMetrics::new();
        metrics.certificates_issued_total.inc();
        metrics.chain_height.set(3);

        let text = metrics.encode().unwrap();
        assert!(text.contains("certchain_certificates_issued_total 1"));
        assert!(text.contains("certchain_chain_height 3"));
    }
}
