//! Prometheus metrics for the loyalty ledger
//!
//! # Metrics
//!
//! - `loyalty_entries_total{entry_type}` - Entries appended, by type
//! - `loyalty_points_redeemed_total` - Points spent on redemptions
//! - `loyalty_redemptions_rejected_total{reason}` - Refused redemptions, by error kind
//! - `loyalty_redeem_duration_seconds` - Redemption latency
//! - `loyalty_points_expired_total` - Points removed by expiry

use crate::types::EntryType;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
///
/// Collectors are registered in the ledger's own registry only, so several
/// ledgers can live in one process.
#[derive(Clone)]
pub struct Metrics {
    /// Entries appended, by type
    pub entries_total: IntCounterVec,

    /// Points spent on redemptions
    pub points_redeemed: IntCounter,

    /// Refused redemptions, by reason
    pub redemptions_rejected: IntCounterVec,

    /// Redemption latency
    pub redeem_duration: Histogram,

    /// Points removed by expiry
    pub points_expired: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("points_redeemed", &self.points_redeemed.get())
            .field("points_expired", &self.points_expired.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let entries_total = IntCounterVec::new(
            Opts::new("loyalty_entries_total", "Total ledger entries appended"),
            &["entry_type"],
        )?;
        registry.register(Box::new(entries_total.clone()))?;

        let points_redeemed = IntCounter::new(
            "loyalty_points_redeemed_total",
            "Total points spent on redemptions",
        )?;
        registry.register(Box::new(points_redeemed.clone()))?;

        let redemptions_rejected = IntCounterVec::new(
            Opts::new(
                "loyalty_redemptions_rejected_total",
                "Total redemptions refused",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(redemptions_rejected.clone()))?;

        let redeem_duration = Histogram::with_opts(
            HistogramOpts::new(
                "loyalty_redeem_duration_seconds",
                "Histogram of redemption latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(redeem_duration.clone()))?;

        let points_expired = IntCounter::new(
            "loyalty_points_expired_total",
            "Total points removed by expiry",
        )?;
        registry.register(Box::new(points_expired.clone()))?;

        Ok(Self {
            entries_total,
            points_redeemed,
            redemptions_rejected,
            redeem_duration,
            points_expired,
            registry,
        })
    }

    /// Record appended entries
    pub fn record_entries(&self, entry_type: EntryType, count: usize) {
        self.entries_total
            .with_label_values(&[entry_type.as_str()])
            .inc_by(count as u64);
    }

    /// Record a committed redemption
    pub fn record_redemption(&self, points: i64, duration_seconds: f64) {
        self.record_entries(EntryType::Redeem, 1);
        self.points_redeemed.inc_by(points.unsigned_abs());
        self.redeem_duration.observe(duration_seconds);
    }

    /// Record a refused redemption
    pub fn record_rejection(&self, reason: &str) {
        self.redemptions_rejected.with_label_values(&[reason]).inc();
    }

    /// Record expired points
    pub fn record_expired(&self, entries: usize, points: i64) {
        if entries == 0 {
            return;
        }
        self.record_entries(EntryType::Expire, entries);
        self.points_expired.inc_by(points.unsigned_abs());
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the Prometheus text format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
