//! Metrics collection for observability
//!
//! Prometheus collectors for the posting path and recovery, registered in
//! a collector-owned registry (not the process-global one, so repeated
//! construction in tests stays clean).

use std::sync::Arc;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};

use crate::recovery::RecoveryReport;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Total posts attempted
    pub posts_total: IntCounter,

    /// Posts that returned an error to the caller
    pub post_failures_total: IntCounter,

    /// Post latency histogram (seconds)
    pub post_duration: Histogram,

    /// Records applied during the last WAL replay
    pub recovered_records: IntGauge,

    /// Replayed records that failed business validation
    pub recovery_anomalies: IntGauge,

    registry: Arc<Registry>,
}

impl Metrics {
    /// Create the collector and register everything in its registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let posts_total =
            IntCounter::new("ledger_posts_total", "Total posts attempted")?;
        registry.register(Box::new(posts_total.clone()))?;

        let post_failures_total = IntCounter::new(
            "ledger_post_failures_total",
            "Posts that returned an error to the caller",
        )?;
        registry.register(Box::new(post_failures_total.clone()))?;

        let post_duration = Histogram::with_opts(
            HistogramOpts::new("ledger_post_duration_seconds", "Post latency")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.500]),
        )?;
        registry.register(Box::new(post_duration.clone()))?;

        let recovered_records = IntGauge::new(
            "ledger_recovered_records",
            "Records applied during the last WAL replay",
        )?;
        registry.register(Box::new(recovered_records.clone()))?;

        let recovery_anomalies = IntGauge::new(
            "ledger_recovery_anomalies",
            "Replayed records that failed business validation",
        )?;
        registry.register(Box::new(recovery_anomalies.clone()))?;

        Ok(Self {
            posts_total,
            post_failures_total,
            post_duration,
            recovered_records,
            recovery_anomalies,
            registry,
        })
    }

    /// Record one post attempt.
    pub fn record_post(&self, ok: bool, duration_seconds: f64) {
        self.posts_total.inc();
        if !ok {
            self.post_failures_total.inc();
        }
        self.post_duration.observe(duration_seconds);
    }

    /// Publish the outcome of startup recovery.
    pub fn record_recovery(&self, report: &RecoveryReport) {
        self.recovered_records.set(report.applied as i64);
        self.recovery_anomalies.set(report.anomalies as i64);
    }

    /// Registry holding all collectors.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("metric registration cannot fail with static names")
    }
}
