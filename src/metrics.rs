//! Prometheus-compatible metrics for the relationship graph.
//!
//! Counters track write outcomes, invalidation traffic, and how often
//! reads are served from the memoized view versus recomputed.

use prometheus::{self, IntCounter, IntGauge, Registry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Global metrics instance.
static METRICS: std::sync::OnceLock<Arc<Metrics>> = std::sync::OnceLock::new();

/// Get or initialize the global metrics instance.
pub fn get_metrics() -> Arc<Metrics> {
    METRICS.get_or_init(|| Arc::new(Metrics::new())).clone()
}

/// All metrics for the relationship graph.
pub struct Metrics {
    /// Prometheus registry for all metrics.
    pub registry: Registry,

    // =========================================================================
    // Counters
    // =========================================================================
    /// Total number of relationships added.
    pub relationships_added_total: IntCounter,
    /// Total number of failed add operations.
    pub add_failures_total: IntCounter,
    /// Total number of relationships removed.
    pub relationships_removed_total: IntCounter,
    /// Total number of failed remove operations.
    pub remove_failures_total: IntCounter,
    /// Total number of invalidation signals received.
    pub invalidation_signals_total: IntCounter,
    /// Total number of reads served from the memoized view.
    pub read_memo_hits_total: IntCounter,
    /// Total number of reads that recomputed the merged view.
    pub read_recomputes_total: IntCounter,

    // =========================================================================
    // Gauges
    // =========================================================================
    /// Current number of optimistic overlay entries.
    pub overlay_entries: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with all metrics registered.
    pub fn new() -> Self {
        let registry = Registry::new();

        let relationships_added_total = IntCounter::new(
            "sinew_relationships_added_total",
            "Total number of relationships added",
        )
        .expect("failed to create counter");

        let add_failures_total = IntCounter::new(
            "sinew_add_failures_total",
            "Total number of failed add operations",
        )
        .expect("failed to create counter");

        let relationships_removed_total = IntCounter::new(
            "sinew_relationships_removed_total",
            "Total number of relationships removed",
        )
        .expect("failed to create counter");

        let remove_failures_total = IntCounter::new(
            "sinew_remove_failures_total",
            "Total number of failed remove operations",
        )
        .expect("failed to create counter");

        let invalidation_signals_total = IntCounter::new(
            "sinew_invalidation_signals_total",
            "Total number of invalidation signals received",
        )
        .expect("failed to create counter");

        let read_memo_hits_total = IntCounter::new(
            "sinew_read_memo_hits_total",
            "Total number of reads served from the memoized view",
        )
        .expect("failed to create counter");

        let read_recomputes_total = IntCounter::new(
            "sinew_read_recomputes_total",
            "Total number of reads that recomputed the merged view",
        )
        .expect("failed to create counter");

        let overlay_entries = IntGauge::new(
            "sinew_overlay_entries",
            "Current number of optimistic overlay entries",
        )
        .expect("failed to create gauge");

        registry
            .register(Box::new(relationships_added_total.clone()))
            .expect("failed to register metric");
        registry
            .register(Box::new(add_failures_total.clone()))
            .expect("failed to register metric");
        registry
            .register(Box::new(relationships_removed_total.clone()))
            .expect("failed to register metric");
        registry
            .register(Box::new(remove_failures_total.clone()))
            .expect("failed to register metric");
        registry
            .register(Box::new(invalidation_signals_total.clone()))
            .expect("failed to register metric");
        registry
            .register(Box::new(read_memo_hits_total.clone()))
            .expect("failed to register metric");
        registry
            .register(Box::new(read_recomputes_total.clone()))
            .expect("failed to register metric");
        registry
            .register(Box::new(overlay_entries.clone()))
            .expect("failed to register metric");

        Self {
            registry,
            relationships_added_total,
            add_failures_total,
            relationships_removed_total,
            remove_failures_total,
            invalidation_signals_total,
            read_memo_hits_total,
            read_recomputes_total,
            overlay_entries,
        }
    }

    /// Export metrics in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Export metrics as a serializable snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            relationships_added_total: self.relationships_added_total.get(),
            add_failures_total: self.add_failures_total.get(),
            relationships_removed_total: self.relationships_removed_total.get(),
            remove_failures_total: self.remove_failures_total.get(),
            invalidation_signals_total: self.invalidation_signals_total.get(),
            read_memo_hits_total: self.read_memo_hits_total.get(),
            read_recomputes_total: self.read_recomputes_total.get(),
            overlay_entries: self.overlay_entries.get(),
        }
    }
}

/// Snapshot of all metrics for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub relationships_added_total: u64,
    pub add_failures_total: u64,
    pub relationships_removed_total: u64,
    pub remove_failures_total: u64,
    pub invalidation_signals_total: u64,
    pub read_memo_hits_total: u64,
    pub read_recomputes_total: u64,
    pub overlay_entries: i64,
}
