//! Mining phase metrics: rows extracted, anomalies, files written

use crate::metrics::{phase_metric, PhaseMetrics};
use crate::pipeline::processing::anomaly::AnomalyKind;

pub struct MiningMetrics;

impl MiningMetrics {
    pub fn record_rows_extracted(count: usize) {
        ::metrics::counter!(phase_metric!(counter, "mining", "rows_extracted")).increment(count as u64);
    }

    /// Record one anomaly, and its removal when the line was dropped
    pub fn record_anomaly(kind: AnomalyKind, auto_removed: bool) {
        let name = match kind {
            AnomalyKind::CandidateNotInRegistry => phase_metric!(counter, "mining", "candidates_not_found"),
            AnomalyKind::ScoreSumMismatch => phase_metric!(counter, "mining", "score_mismatches"),
            AnomalyKind::ScaleMismatch => phase_metric!(counter, "mining", "scale_mismatches"),
        };
        ::metrics::counter!(name).increment(1);
        if auto_removed {
            ::metrics::counter!(phase_metric!(counter, "mining", "rows_auto_removed")).increment(1);
        }
    }

    pub fn record_files_written(count: usize) {
        ::metrics::counter!(phase_metric!(counter, "mining", "files_written")).increment(count as u64);
    }

    pub fn record_run_success(duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "mining", "runs_success")).increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "mining", "run_duration_seconds")).record(duration_secs);
    }

    pub fn record_run_failure() {
        ::metrics::counter!(phase_metric!(counter, "mining", "runs_failed")).increment(1);
    }
}

impl PhaseMetrics for MiningMetrics {
    fn register_metrics() {
        use metrics::{counter, describe_counter, describe_histogram, histogram};

        describe_counter!(
            phase_metric!(counter, "mining", "rows_extracted"),
            "Raw table rows extracted from located sections"
        );
        describe_counter!(
            phase_metric!(counter, "mining", "candidates_not_found"),
            "Lines whose name did not resolve in the candidate registry"
        );
        describe_counter!(
            phase_metric!(counter, "mining", "score_mismatches"),
            "Lines whose scores did not add up to the expected total"
        );
        describe_counter!(
            phase_metric!(counter, "mining", "scale_mismatches"),
            "Lines with more scores than the institute's scale"
        );
        describe_counter!(phase_metric!(counter, "mining", "rows_auto_removed"), "Lines dropped from the output table");
        describe_counter!(phase_metric!(counter, "mining", "files_written"), "Output tables and reports written");
        describe_counter!(phase_metric!(counter, "mining", "runs_success"), "Completed runs");
        describe_counter!(phase_metric!(counter, "mining", "runs_failed"), "Runs that ended in a fatal error");
        describe_histogram!(phase_metric!(histogram, "mining", "run_duration_seconds"), "Wall-clock duration of a run");

        let _ = counter!(phase_metric!(counter, "mining", "rows_extracted"));
        let _ = counter!(phase_metric!(counter, "mining", "candidates_not_found"));
        let _ = counter!(phase_metric!(counter, "mining", "score_mismatches"));
        let _ = counter!(phase_metric!(counter, "mining", "scale_mismatches"));
        let _ = counter!(phase_metric!(counter, "mining", "rows_auto_removed"));
        let _ = counter!(phase_metric!(counter, "mining", "files_written"));
        let _ = counter!(phase_metric!(counter, "mining", "runs_success"));
        let _ = counter!(phase_metric!(counter, "mining", "runs_failed"));
        let _ = histogram!(phase_metric!(histogram, "mining", "run_duration_seconds"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn test_recorded_anomalies_render_with_help() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            MiningMetrics::register_metrics();
            MiningMetrics::record_anomaly(AnomalyKind::ScoreSumMismatch, true);
            MiningMetrics::record_files_written(2);
        });

        let text = handle.render();
        assert!(text.contains("# HELP poll_miner_mining_score_mismatches_total"));
        assert!(text.contains("poll_miner_mining_score_mismatches_total 1"));
        assert!(text.contains("poll_miner_mining_rows_auto_removed_total 1"));
        assert!(text.contains("poll_miner_mining_files_written_total 2"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        MiningMetrics::register_metrics();
        MiningMetrics::record_anomaly(AnomalyKind::ScoreSumMismatch, true);
        MiningMetrics::record_files_written(2);
    }
}
