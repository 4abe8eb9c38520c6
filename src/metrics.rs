//! Prometheus metrics for quote and build operations
//!
//! A [`Metrics`] instance owns its own registry and is handed to the service
//! at construction; nothing here is process-global, so tests can assert on
//! counters without interference from each other.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

pub struct Metrics {
    registry: Registry,

    // Counters
    pub builds_total: IntCounter,
    pub builds_success: IntCounter,
    pub builds_failed: IntCounterVec,
    pub quotes_created: IntCounter,
    pub quotes_failed: IntCounterVec,
    pub fee_transfers: IntCounter,
    pub server_signatures: IntCounter,
    pub simulation_failures: IntCounter,
    pub lookup_tables_dropped: IntCounter,

    // Histograms
    pub build_latency: Histogram,
    pub quote_latency: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let builds_total = IntCounter::with_opts(Opts::new(
            "swap_builds_total",
            "Total number of swap transaction builds attempted",
        ))?;

        let builds_success = IntCounter::with_opts(Opts::new(
            "swap_builds_success",
            "Number of swap transactions built and returned",
        ))?;

        let builds_failed = IntCounterVec::new(
            Opts::new("swap_builds_failed", "Failed swap builds by error category"),
            &["category"],
        )?;

        let quotes_created = IntCounter::with_opts(Opts::new(
            "swap_quotes_created",
            "Number of quotes priced and persisted",
        ))?;

        let quotes_failed = IntCounterVec::new(
            Opts::new("swap_quotes_failed", "Failed quote requests by error category"),
            &["category"],
        )?;

        let fee_transfers = IntCounter::with_opts(Opts::new(
            "swap_fee_transfers",
            "Fee-distribution transfer instructions emitted",
        ))?;

        let server_signatures = IntCounter::with_opts(Opts::new(
            "swap_server_signatures",
            "Transactions partially signed by the fee-vault authority",
        ))?;

        let simulation_failures = IntCounter::with_opts(Opts::new(
            "swap_simulation_failures",
            "Built transactions that failed simulation",
        ))?;

        let lookup_tables_dropped = IntCounter::with_opts(Opts::new(
            "swap_lookup_tables_dropped",
            "Lookup tables referenced by the aggregator but not loadable",
        ))?;

        let build_latency = Histogram::with_opts(
            HistogramOpts::new("swap_build_latency_seconds", "End-to-end build latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )?;

        let quote_latency = Histogram::with_opts(
            HistogramOpts::new("swap_quote_latency_seconds", "Quote request latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]),
        )?;

        registry.register(Box::new(builds_total.clone()))?;
        registry.register(Box::new(builds_success.clone()))?;
        registry.register(Box::new(builds_failed.clone()))?;
        registry.register(Box::new(quotes_created.clone()))?;
        registry.register(Box::new(quotes_failed.clone()))?;
        registry.register(Box::new(fee_transfers.clone()))?;
        registry.register(Box::new(server_signatures.clone()))?;
        registry.register(Box::new(simulation_failures.clone()))?;
        registry.register(Box::new(lookup_tables_dropped.clone()))?;
        registry.register(Box::new(build_latency.clone()))?;
        registry.register(Box::new(quote_latency.clone()))?;

        Ok(Self {
            registry,
            builds_total,
            builds_success,
            builds_failed,
            quotes_created,
            quotes_failed,
            fee_transfers,
            server_signatures,
            simulation_failures,
            lookup_tables_dropped,
            build_latency,
            quote_latency,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_build_failure(&self, category: &str) {
        self.builds_failed.with_label_values(&[category]).inc();
    }

    pub fn record_quote_failure(&self, category: &str) {
        self.quotes_failed.with_label_values(&[category]).inc();
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_labels() {
        let metrics = Metrics::new().unwrap();
        metrics.builds_total.inc();
        metrics.record_build_failure("expired");

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("swap_builds_total 1"));
        assert!(text.contains("swap_builds_failed{category=\"expired\"} 1"));
    }

    #[test]
    fn test_instances_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.quotes_created.inc();
        assert_eq!(a.quotes_created.get(), 1);
        assert_eq!(b.quotes_created.get(), 0);
    }
}
