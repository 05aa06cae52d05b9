//! Source feed phase metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct FeedMetrics;

impl FeedMetrics {
    pub fn record_fetch_success(feed: &str, items: usize, duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "feed", "fetch_success"), "feed" => feed.to_string())
            .increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "feed", "fetch_duration_seconds"))
            .record(duration_secs);
        ::metrics::gauge!(phase_metric!(gauge, "feed", "snapshot_items"), "feed" => feed.to_string())
            .set(items as f64);
    }

    pub fn record_fetch_error(feed: &str) {
        ::metrics::counter!(phase_metric!(counter, "feed", "fetch_error"), "feed" => feed.to_string())
            .increment(1);
    }

    pub fn record_rejected_items(feed: &str, count: usize) {
        ::metrics::counter!(phase_metric!(counter, "feed", "items_rejected"), "feed" => feed.to_string())
            .increment(count as u64);
    }
}

impl PhaseMetrics for FeedMetrics {
    fn register_metrics() {
        use metrics::{counter, gauge, histogram};

        let _ = counter!(phase_metric!(counter, "feed", "fetch_success"));
        let _ = counter!(phase_metric!(counter, "feed", "fetch_error"));
        let _ = counter!(phase_metric!(counter, "feed", "items_rejected"));
        let _ = histogram!(phase_metric!(histogram, "feed", "fetch_duration_seconds"));
        let _ = gauge!(phase_metric!(gauge, "feed", "snapshot_items"));
    }

    fn phase_name() -> &'static str {
        "feed"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "feed", "fetch_success"),
                metric_type: MetricType::Counter,
                help: "Snapshots fetched successfully",
                labels: vec!["feed"],
            },
            MetricDoc {
                name: phase_metric!(counter, "feed", "fetch_error"),
                metric_type: MetricType::Counter,
                help: "Snapshot fetches that failed",
                labels: vec!["feed"],
            },
            MetricDoc {
                name: phase_metric!(counter, "feed", "items_rejected"),
                metric_type: MetricType::Counter,
                help: "Feed items rejected by validation",
                labels: vec!["feed"],
            },
            MetricDoc {
                name: phase_metric!(histogram, "feed", "fetch_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time spent fetching one snapshot",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(gauge, "feed", "snapshot_items"),
                metric_type: MetricType::Gauge,
                help: "Items in the most recent snapshot",
                labels: vec!["feed"],
            },
        ]
    }
}
