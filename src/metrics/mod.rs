//! Phase-organized metrics for mining runs
//!
//! Metrics go through the `metrics` facade. A Prometheus recorder is only
//! installed when `POLL_MINER_METRICS_FILE` is set; the text snapshot is
//! written to that file once the command finishes.

pub mod mining;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

use crate::error::Result;

pub use mining::MiningMetrics;

/// Names the file the Prometheus snapshot is written to
pub const METRICS_FILE_ENV: &str = "POLL_MINER_METRICS_FILE";

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Trait for phase-specific metric sets
pub trait PhaseMetrics {
    /// Describe and touch every metric of the phase so a recorder sees them
    /// before first use
    fn register_metrics();
}

/// Metric name following `poll_miner_{phase}_{name}[_total]`
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("poll_miner_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("poll_miner_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;

/// Install the Prometheus recorder when a snapshot file is configured and
/// return that file. Without the variable the facade stays a no-op.
pub fn init_metrics() -> Option<PathBuf> {
    let target = std::env::var_os(METRICS_FILE_ENV).map(PathBuf::from)?;
    if HANDLE.get().is_none() {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = HANDLE.set(handle);
                info!("📈 Metrics recorder installed, snapshot goes to {}", target.display());
            }
            Err(e) => {
                warn!("Prometheus recorder install failed: {}", e);
                return None;
            }
        }
    }
    register_all();
    Some(target)
}

/// Register every phase's metrics
pub fn register_all() {
    MiningMetrics::register_metrics();
}

/// Prometheus text exposition of everything recorded so far
pub fn render() -> Option<String> {
    HANDLE.get().map(PrometheusHandle::render)
}

/// Write the current snapshot to `path`. Returns false when no recorder is
/// installed, in which case nothing is written.
pub fn write_snapshot(path: &Path) -> Result<bool> {
    let Some(text) = render() else {
        return Ok(false);
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    Ok(true)
}
