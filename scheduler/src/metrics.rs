//! Metrics collection for scheduler monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Scheduler metrics.
pub struct Metrics {
    /// Ticks run, scheduled and manual.
    pub ticks_total: AtomicU64,
    /// Scheduled ticks skipped because another tick was running.
    pub ticks_skipped: AtomicU64,
    /// Ticks that ended in error.
    pub ticks_failed: AtomicU64,
    /// Refreshes that wrote a new base value.
    pub rate_changes: AtomicU64,
    /// Refreshes that failed at the providers.
    pub source_failures: AtomicU64,
    /// Cascade runs, counted per stage.
    pub cascades_total: AtomicU64,
    /// Cascade runs that failed as a whole, counted per stage.
    pub cascades_failed: AtomicU64,
    pub variants_repriced: AtomicU64,
    pub orders_repriced: AtomicU64,
    /// Individual records a cascade left out.
    pub records_failed: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            ticks_total: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            ticks_failed: AtomicU64::new(0),
            rate_changes: AtomicU64::new(0),
            source_failures: AtomicU64::new(0),
            cascades_total: AtomicU64::new(0),
            cascades_failed: AtomicU64::new(0),
            variants_repriced: AtomicU64::new(0),
            orders_repriced: AtomicU64::new(0),
            records_failed: AtomicU64::new(0),
        }
    }

    pub fn tick_started(&self) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_skipped(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a tick that failed to refresh the rate.
    pub fn tick_failed(&self, source_error: bool) {
        self.ticks_failed.fetch_add(1, Ordering::Relaxed);
        if source_error {
            self.source_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn rate_changed(&self) {
        self.rate_changes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a variant cascade run.
    pub fn variants_cascaded(&self, updated: usize, failed: usize) {
        self.cascades_total.fetch_add(1, Ordering::Relaxed);
        self.variants_repriced.fetch_add(updated as u64, Ordering::Relaxed);
        self.records_failed.fetch_add(failed as u64, Ordering::Relaxed);
    }

    /// Record an order cascade run.
    pub fn orders_cascaded(&self, updated: usize, failed: usize) {
        self.cascades_total.fetch_add(1, Ordering::Relaxed);
        self.orders_repriced.fetch_add(updated as u64, Ordering::Relaxed);
        self.records_failed.fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub fn cascade_failed(&self) {
        self.cascades_total.fetch_add(1, Ordering::Relaxed);
        self.cascades_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            ticks_failed: self.ticks_failed.load(Ordering::Relaxed),
            rate_changes: self.rate_changes.load(Ordering::Relaxed),
            source_failures: self.source_failures.load(Ordering::Relaxed),
            cascades_total: self.cascades_total.load(Ordering::Relaxed),
            cascades_failed: self.cascades_failed.load(Ordering::Relaxed),
            variants_repriced: self.variants_repriced.load(Ordering::Relaxed),
            orders_repriced: self.orders_repriced.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let counters: [(&str, &str, u64); 10] = [
            ("ticks_total", "Total scheduler ticks", s.ticks_total),
            ("ticks_skipped", "Scheduled ticks skipped while another tick ran", s.ticks_skipped),
            ("ticks_failed", "Ticks whose rate refresh failed", s.ticks_failed),
            ("rate_changes", "Refreshes that wrote a new base value", s.rate_changes),
            ("source_failures", "Refreshes where every provider failed", s.source_failures),
            ("cascades_total", "Cascade runs per stage", s.cascades_total),
            ("cascades_failed", "Cascade runs that failed as a whole", s.cascades_failed),
            ("variants_repriced", "Variant ARS prices rewritten", s.variants_repriced),
            ("orders_repriced", "Order ARS totals rewritten", s.orders_repriced),
            ("records_failed", "Records left out of a cascade", s.records_failed),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP pricesync_{name} {help}\n# TYPE pricesync_{name} counter\npricesync_{name} {value}\n\n"
            ));
        }
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub ticks_total: u64,
    pub ticks_skipped: u64,
    pub ticks_failed: u64,
    pub rate_changes: u64,
    pub source_failures: u64,
    pub cascades_total: u64,
    pub cascades_failed: u64,
    pub variants_repriced: u64,
    pub orders_repriced: u64,
    pub records_failed: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
