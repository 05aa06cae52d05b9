//! Reconciliation phase metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::reconcile::ReconciliationStats;

pub struct ReconcileMetrics;

impl ReconcileMetrics {
    pub fn record_pass(region: &str, stats: &ReconciliationStats, dry_run: bool, duration_secs: f64) {
        let mode = if dry_run { "dry_run" } else { "applied" };
        let region = region.to_string();

        ::metrics::counter!(phase_metric!(counter, "reconcile", "passes"), "region" => region.clone(), "mode" => mode)
            .increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "reconcile", "pass_duration_seconds"))
            .record(duration_secs);

        if dry_run {
            return;
        }
        ::metrics::counter!(phase_metric!(counter, "reconcile", "listings_new"), "region" => region.clone())
            .increment(stats.new_count as u64);
        ::metrics::counter!(phase_metric!(counter, "reconcile", "listings_updated"), "region" => region.clone())
            .increment(stats.updated_count as u64);
        ::metrics::counter!(phase_metric!(counter, "reconcile", "listings_restored"), "region" => region.clone())
            .increment(stats.restored_count as u64);
        ::metrics::counter!(phase_metric!(counter, "reconcile", "listings_marked_under_contract"), "region" => region.clone())
            .increment(stats.marked_under_contract_count as u64);
        ::metrics::counter!(phase_metric!(counter, "reconcile", "item_errors"), "region" => region)
            .increment(stats.error_count as u64);
    }

    /// A pass that failed before issuing writes
    pub fn record_pass_failed(region: &str) {
        ::metrics::counter!(phase_metric!(counter, "reconcile", "passes_failed"), "region" => region.to_string())
            .increment(1);
    }
}

impl PhaseMetrics for ReconcileMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(phase_metric!(counter, "reconcile", "passes"));
        let _ = counter!(phase_metric!(counter, "reconcile", "passes_failed"));
        let _ = counter!(phase_metric!(counter, "reconcile", "listings_new"));
        let _ = counter!(phase_metric!(counter, "reconcile", "listings_updated"));
        let _ = counter!(phase_metric!(counter, "reconcile", "listings_restored"));
        let _ = counter!(phase_metric!(counter, "reconcile", "listings_marked_under_contract"));
        let _ = counter!(phase_metric!(counter, "reconcile", "item_errors"));
        let _ = histogram!(phase_metric!(histogram, "reconcile", "pass_duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "reconcile"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "reconcile", "passes"),
                metric_type: MetricType::Counter,
                help: "Completed reconciliation passes",
                labels: vec!["region", "mode"],
            },
            MetricDoc {
                name: phase_metric!(counter, "reconcile", "passes_failed"),
                metric_type: MetricType::Counter,
                help: "Passes aborted before any write (bad region, unreadable catalog, empty snapshot)",
                labels: vec!["region"],
            },
            MetricDoc {
                name: phase_metric!(counter, "reconcile", "listings_new"),
                metric_type: MetricType::Counter,
                help: "Listings inserted for the first time",
                labels: vec!["region"],
            },
            MetricDoc {
                name: phase_metric!(counter, "reconcile", "listings_updated"),
                metric_type: MetricType::Counter,
                help: "Existing listings refreshed from a snapshot, restores included",
                labels: vec!["region"],
            },
            MetricDoc {
                name: phase_metric!(counter, "reconcile", "listings_restored"),
                metric_type: MetricType::Counter,
                help: "Listings restored from UNDER_CONTRACT to AVAILABLE",
                labels: vec!["region"],
            },
            MetricDoc {
                name: phase_metric!(counter, "reconcile", "listings_marked_under_contract"),
                metric_type: MetricType::Counter,
                help: "Listings marked UNDER_CONTRACT because they left the feed",
                labels: vec!["region"],
            },
            MetricDoc {
                name: phase_metric!(counter, "reconcile", "item_errors"),
                metric_type: MetricType::Counter,
                help: "Observed items or writes that failed during a pass",
                labels: vec!["region"],
            },
            MetricDoc {
                name: phase_metric!(histogram, "reconcile", "pass_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Wall-clock duration of a reconciliation pass",
                labels: vec![],
            },
        ]
    }
}
