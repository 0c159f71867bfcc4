//! Human-readable anomaly report, one file per population.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::{Anomaly, AnomalyKind, MissingPosition};
use crate::constants::anomaly_report_name;
use crate::error::Result;
use crate::types::{format_score, format_scores};

const RULE: &str = "================================================================";

pub struct AnomalyReport<'a> {
    pub poll_id: &'a str,
    pub population: &'a str,
    pub population_label: &'a str,
    pub anomalies: &'a [Anomaly],
}

impl<'a> AnomalyReport<'a> {
    pub fn file_name(&self) -> String {
        anomaly_report_name(self.population)
    }

    /// Render the report. Unresolved candidates come first, then score
    /// problems; each block keeps its detection sequence number.
    pub fn render(&self) -> String {
        let removed = self.anomalies.iter().filter(|a| a.auto_removed).count();
        let mut out = String::new();
        let _ = writeln!(out, "ANOMALY REPORT");
        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out, "Poll: {}", self.poll_id);
        let _ = writeln!(out, "Population: {} ({})", self.population_label, self.population);
        let _ = writeln!(out, "Anomalies: {}", self.anomalies.len());
        let _ = writeln!(out, "Automatically removed: {}", removed);
        let _ = writeln!(out, "Difference: line total minus expected total (negative: points missing)");
        let _ = writeln!(out, "{}", RULE);

        let not_found: Vec<&Anomaly> =
            self.anomalies.iter().filter(|a| a.kind == AnomalyKind::CandidateNotInRegistry).collect();
        let scores: Vec<&Anomaly> =
            self.anomalies.iter().filter(|a| a.kind != AnomalyKind::CandidateNotInRegistry).collect();

        if !not_found.is_empty() {
            let _ = writeln!(out, "\nCANDIDATES NOT FOUND IN REGISTRY ({})", not_found.len());
            for anomaly in not_found {
                render_block(&mut out, anomaly);
            }
        }
        if !scores.is_empty() {
            let _ = writeln!(out, "\nSCORE ANOMALIES ({})", scores.len());
            for anomaly in scores {
                render_block(&mut out, anomaly);
            }
        }

        if removed > 0 {
            let _ = writeln!(out, "\n{}", RULE);
            let _ = writeln!(
                out,
                "NOTE: {} line(s) marked AUTOMATIC ACTION were left out of the output table.",
                removed
            );
            let _ = writeln!(out, "Add them back by hand once the source values are confirmed.");
        }
        out
    }

    /// Write the report into `dir`, returning its path
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.file_name());
        fs::write(&path, self.render())?;
        info!("⚠️  Wrote {} anomalies to {}", self.anomalies.len(), path.display());
        Ok(path)
    }
}

fn render_block(out: &mut String, anomaly: &Anomaly) {
    let _ = writeln!(out, "\nANOMALY #{}", anomaly.sequence_number);
    let _ = writeln!(out, "  Page: {}", anomaly.page);
    let _ = writeln!(out, "  Line: {}", anomaly.line);
    let _ = writeln!(out, "  Candidate: {}", anomaly.candidate_name);
    let _ = writeln!(out, "  Population: {}", anomaly.population);
    let _ = writeln!(out, "  Scores: {}", format_scores(&anomaly.scores));
    let _ = writeln!(out, "  Total: {}", format_score(anomaly.total));
    let _ = writeln!(out, "  Difference: {}", signed(anomaly.difference));
    let _ = writeln!(out, "  Description: {}", description(anomaly));
    let _ = writeln!(out, "  Action: {}", action(anomaly));
}

fn signed(value: f64) -> String {
    if value > 0.0 {
        format!("+{}", format_score(value))
    } else {
        format_score(value)
    }
}

fn description(anomaly: &Anomaly) -> String {
    match anomaly.kind {
        AnomalyKind::CandidateNotInRegistry => {
            format!("'{}' does not match any candidate in the registry", anomaly.candidate_name)
        }
        AnomalyKind::ScaleMismatch => format!(
            "{} scores found, more than the answer scale allows",
            anomaly.scores.len()
        ),
        AnomalyKind::ScoreSumMismatch if anomaly.difference < 0.0 => {
            let hint = match anomaly.missing_position {
                Some(MissingPosition::Start) => ", probably in the first column",
                Some(MissingPosition::End) => ", probably in the last column",
                Some(MissingPosition::Middle) => ", probably in a middle column",
                None => "",
            };
            format!("{} points missing{}", format_score(-anomaly.difference), hint)
        }
        AnomalyKind::ScoreSumMismatch => format!("{} points too many", format_score(anomaly.difference)),
    }
}

fn action(anomaly: &Anomaly) -> &'static str {
    match (anomaly.kind, anomaly.auto_removed) {
        (AnomalyKind::CandidateNotInRegistry, _) => {
            "ACTION REQUIRED: add the candidate to the registry or fix the spelling; the row was written with an empty identifier"
        }
        (_, true) => "AUTOMATIC ACTION: row removed from the output table; check the source document",
        (_, false) => "ACTION REQUIRED: row kept as extracted; check the values against the source document",
    }
}
