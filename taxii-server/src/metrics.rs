//! Prometheus metrics for the TAXII server.
//!
//! Metrics are served by the HTTP front end at `/management/metrics`.

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};

/// Request duration histogram buckets (in seconds).
const DURATION_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0];

/// Prometheus metrics for the TAXII server.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// TAXII requests by message type.
    pub requests_total: CounterVec,
    /// Rendered status messages by status type.
    pub statuses_total: CounterVec,
    /// Rejected credentials by reason.
    pub auth_failures_total: IntCounterVec,
    /// Tokens issued by the auth endpoint.
    pub tokens_issued_total: IntCounter,
    /// Inbox content blocks stored.
    pub content_blocks_stored_total: IntCounter,
    /// Request duration by service type.
    pub request_duration: HistogramVec,
}

impl Metrics {
    /// Creates a new Metrics instance with all metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("taxii_requests_total", "Total TAXII requests by message type"),
            &["message_type"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let statuses_total = CounterVec::new(
            Opts::new("taxii_statuses_total", "Status messages sent by status type"),
            &["status"],
        )?;
        registry.register(Box::new(statuses_total.clone()))?;

        let auth_failures_total = IntCounterVec::new(
            Opts::new("taxii_auth_failures_total", "Rejected credentials by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(auth_failures_total.clone()))?;

        let tokens_issued_total = IntCounter::with_opts(Opts::new(
            "taxii_tokens_issued_total",
            "Tokens issued by the auth endpoint",
        ))?;
        registry.register(Box::new(tokens_issued_total.clone()))?;

        let content_blocks_stored_total = IntCounter::with_opts(Opts::new(
            "taxii_content_blocks_stored_total",
            "Content blocks accepted by inbox services",
        ))?;
        registry.register(Box::new(content_blocks_stored_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "taxii_request_duration_seconds",
                "Request duration in seconds by service type",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["service"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            statuses_total,
            auth_failures_total,
            tokens_issued_total,
            content_blocks_stored_total,
            request_duration,
        })
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }

    /// Returns a reference to the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();

        metrics
            .requests_total
            .with_label_values(&["poll_request"])
            .inc();
        metrics.statuses_total.with_label_values(&["SUCCESS"]).inc();
        metrics
            .auth_failures_total
            .with_label_values(&["invalid_header"])
            .inc();
        metrics.tokens_issued_total.inc();
        metrics.content_blocks_stored_total.inc_by(3);
        metrics
            .request_duration
            .with_label_values(&["inbox"])
            .observe(0.001);

        let encoded = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(encoded.contains("taxii_requests_total"));
        assert!(encoded.contains("taxii_statuses_total"));
        assert!(encoded.contains("taxii_auth_failures_total"));
        assert!(encoded.contains("taxii_tokens_issued_total 1"));
        assert!(encoded.contains("taxii_content_blocks_stored_total 3"));
        assert!(encoded.contains("taxii_request_duration_seconds"));
    }

    #[test]
    fn test_independent_registries() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.tokens_issued_total.inc();
        assert_eq!(b.tokens_issued_total.get(), 0);
        assert!(!a.registry().gather().is_empty());
    }
}
