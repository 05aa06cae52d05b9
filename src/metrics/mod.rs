//! Metrics for the sync pipeline
//!
//! Each phase (feed fetching, reconciliation) defines its metrics in its own
//! submodule. Recording goes through the `metrics` facade, so nothing is
//! exported unless a recorder has been installed with [`init_metrics`].

pub mod feed;
pub mod reconcile;
pub mod registry;

pub use feed::FeedMetrics;
pub use reconcile::ReconcileMetrics;

use std::sync::{Once, OnceLock};
use tracing::{info, warn};

static INIT: Once = Once::new();
static HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and register all phase metrics.
///
/// Idempotent. With a listen address an HTTP exporter serves `/metrics`;
/// without one the recorder is still installed so [`render`] works in-process.
pub fn init_metrics(listen_addr: Option<&str>) {
    INIT.call_once(|| {
        let mut builder = metrics_exporter_prometheus::PrometheusBuilder::new();

        let installed = match listen_addr.map(str::parse::<std::net::SocketAddr>) {
            Some(Ok(addr)) => {
                builder = builder.with_http_listener(addr);
                match builder.install() {
                    Ok(()) => {
                        info!("Prometheus HTTP exporter started at http://{}/metrics", addr);
                        true
                    }
                    Err(e) => {
                        warn!("Failed to start Prometheus exporter: {}", e);
                        false
                    }
                }
            }
            Some(Err(_)) | None => {
                if let Some(addr) = listen_addr {
                    warn!("Invalid metrics address '{}', exporting in-process only", addr);
                }
                match builder.install_recorder() {
                    Ok(handle) => {
                        if HANDLE.set(handle).is_err() {
                            warn!("Prometheus handle was already set");
                        }
                        true
                    }
                    Err(e) => {
                        warn!("Failed to install Prometheus recorder: {}", e);
                        false
                    }
                }
            }
        };

        if installed {
            registry::register_all_metrics();
        }
    });
}

/// Render the current metrics in Prometheus text format, if an in-process recorder is installed
pub fn render() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}

/// Trait for phase-specific metrics collections
pub trait PhaseMetrics {
    /// Register all metrics for this phase so they appear before first use
    fn register_metrics();

    /// Phase name used in metric prefixes
    fn phase_name() -> &'static str;

    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    #[allow(dead_code)]
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Metric names follow hud_{phase}_{name}, with counters suffixed _total
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("hud_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("hud_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("hud_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;
