//! `MetricsSink` (§4.8): `Counter.Inc`, `Histogram.Observe`, `Gauge.Set`.
//! Metrics/observability dashboards are an explicit Non-goal of the
//! distilled scope, but the sink boundary itself is not — every mutation of
//! shared state (GPU leases, rate counters, job transitions) reports through
//! it, to a backend a real deployment can swap in behind the trait.

use std::sync::Arc;

pub trait MetricsSink: Send + Sync {
    fn counter_inc(&self, name: &'static str, value: u64);
    fn histogram_observe(&self, name: &'static str, value: f64);
    fn gauge_set(&self, name: &'static str, value: f64);
}

/// Emits every metric as a structured `tracing` event at `TRACE` level, the
/// same way the rest of this gateway logs — no external metrics backend is
/// wired up by default.
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn counter_inc(&self, name: &'static str, value: u64) {
        tracing::trace!(metric = name, kind = "counter", value, "metric");
    }

    fn histogram_observe(&self, name: &'static str, value: f64) {
        tracing::trace!(metric = name, kind = "histogram", value, "metric");
    }

    fn gauge_set(&self, name: &'static str, value: f64) {
        tracing::trace!(metric = name, kind = "gauge", value, "metric");
    }
}

pub fn noop() -> Arc<dyn MetricsSink> {
    Arc::new(TracingMetricsSink)
}
