//! Prometheus metrics (spec ambient stack: observability signals alongside
//! `/healthz`). Mirrors the shape of `litellm-rs`'s own
//! `core::observability::metrics::PrometheusMetrics` (request/error counters,
//! duration histogram, cache hit/miss, provider health) but backs it with the
//! real `prometheus` crate instead of a hand-rolled exposition writer, and is
//! gated behind the `metrics` feature so a build without it pays nothing.

use crate::core::logger::RequestLogEntry;

#[cfg(feature = "metrics")]
mod enabled {
    use super::RequestLogEntry;
    use prometheus::{Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder};

    pub struct GatewayMetrics {
        registry: Registry,
        requests_total: IntCounterVec,
        request_duration_seconds: HistogramVec,
        cache_lookups_total: IntCounterVec,
    }

    impl GatewayMetrics {
        pub fn new() -> Self {
            let registry = Registry::new();

            let requests_total = IntCounterVec::new(
                prometheus::Opts::new(
                    "gateway_requests_total",
                    "Total number of requests handled, by provider and outcome",
                ),
                &["provider", "status"],
            )
            .expect("static metric definition");
            let request_duration_seconds = HistogramVec::new(
                prometheus::HistogramOpts::new(
                    "gateway_request_duration_seconds",
                    "Request latency in seconds, by provider",
                ),
                &["provider"],
            )
            .expect("static metric definition");
            let cache_lookups_total = IntCounterVec::new(
                prometheus::Opts::new(
                    "gateway_cache_lookups_total",
                    "Semantic cache lookups, by hit/miss",
                ),
                &["result"],
            )
            .expect("static metric definition");

            registry
                .register(Box::new(requests_total.clone()))
                .expect("unique metric name");
            registry
                .register(Box::new(request_duration_seconds.clone()))
                .expect("unique metric name");
            registry
                .register(Box::new(cache_lookups_total.clone()))
                .expect("unique metric name");

            Self {
                registry,
                requests_total,
                request_duration_seconds,
                cache_lookups_total,
            }
        }

        /// Record one completed request (success or failure; `entry.status`
        /// carries the `GatewayError::error_type()` string on failure, or
        /// `"ok"` on success).
        pub fn record(&self, entry: &RequestLogEntry) {
            let provider = if entry.provider.is_empty() { "unknown" } else { entry.provider.as_str() };
            self.requests_total
                .with_label_values(&[provider, &entry.status])
                .inc();
            self.request_duration_seconds
                .with_label_values(&[provider])
                .observe(entry.latency_ms as f64 / 1000.0);
            self.cache_lookups_total
                .with_label_values(&[if entry.cache_hit { "hit" } else { "miss" }])
                .inc();
        }

        /// Render the current registry in Prometheus text exposition format,
        /// for the `/metrics` route.
        pub fn gather(&self) -> String {
            let encoder = TextEncoder::new();
            let families = self.registry.gather();
            let mut buffer = Vec::new();
            if encoder.encode(&families, &mut buffer).is_err() {
                return String::new();
            }
            String::from_utf8(buffer).unwrap_or_default()
        }
    }

    impl Default for GatewayMetrics {
        fn default() -> Self {
            Self::new()
        }
    }
}

#[cfg(not(feature = "metrics"))]
mod disabled {
    use super::RequestLogEntry;

    #[derive(Default)]
    pub struct GatewayMetrics;

    impl GatewayMetrics {
        pub fn new() -> Self {
            Self
        }

        pub fn record(&self, _entry: &RequestLogEntry) {}

        pub fn gather(&self) -> String {
            String::new()
        }
    }
}

#[cfg(feature = "metrics")]
pub use enabled::GatewayMetrics;
#[cfg(not(feature = "metrics"))]
pub use disabled::GatewayMetrics;

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;

    fn entry() -> RequestLogEntry {
        RequestLogEntry {
            request_id: "req-1".into(),
            api_key_id: "key-1".into(),
            model: "gpt-4o".into(),
            provider: "openai".into(),
            prompt_tokens: 5,
            completion_tokens: 7,
            cost_usd: 0.0004,
            latency_ms: 120,
            cache_hit: true,
            fallback_used: false,
            status: "ok".into(),
            prompt_preview: "hello".into(),
        }
    }

    #[test]
    fn gather_reflects_recorded_requests() {
        let metrics = GatewayMetrics::new();
        metrics.record(&entry());
        let text = metrics.gather();
        assert!(text.contains("gateway_requests_total"));
        assert!(text.contains("provider=\"openai\""));
    }
}
