pub mod report;

use serde::{Deserialize, Serialize};

use crate::config::RunContext;
use crate::metrics::MiningMetrics;
use crate::registry::CandidateRegistry;
use crate::types::{PollLine, SourceLocation};

/// Float noise allowed when comparing totals to the tolerance and threshold
const EPSILON: f64 = 1e-9;

/// Validation verdict for one poll line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Resolved and adding up to the expected total
    Valid,
    /// Name could not be resolved against the candidate registry
    AnomalyCandidateNotFound,
    /// Scores do not add up to the expected total
    AnomalyScoreMismatch,
    /// More score columns than the institute's scale
    AnomalyScaleMismatch,
}

/// Kinds of recorded anomalies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyKind {
    CandidateNotInRegistry,
    ScoreSumMismatch,
    ScaleMismatch,
}

impl AnomalyKind {
    pub fn verdict(self) -> Verdict {
        match self {
            AnomalyKind::CandidateNotInRegistry => Verdict::AnomalyCandidateNotFound,
            AnomalyKind::ScoreSumMismatch => Verdict::AnomalyScoreMismatch,
            AnomalyKind::ScaleMismatch => Verdict::AnomalyScaleMismatch,
        }
    }
}

/// Where the missing share of a short line most likely sits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingPosition {
    Start,
    Middle,
    End,
}

/// One recorded validation failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    /// 1-based, scoped to one (poll, population) run
    pub sequence_number: usize,
    pub page: u32,
    pub line: usize,
    pub candidate_name: String,
    pub population: String,
    pub scores: Vec<f64>,
    pub total: f64,
    /// `total - expected_total`
    pub difference: f64,
    pub kind: AnomalyKind,
    pub auto_removed: bool,
    pub missing_position: Option<MissingPosition>,
}

/// Outcome of checking one line
#[derive(Debug, Clone, PartialEq)]
pub struct LineAssessment {
    pub candidate_identifier: Option<String>,
    /// Every non-valid verdict, in detection order
    pub verdicts: Vec<Verdict>,
    /// Whether the line goes to the output table
    pub keep: bool,
}

impl LineAssessment {
    /// The most severe verdict, or `Valid`
    pub fn verdict(&self) -> Verdict {
        let severity = |v: &Verdict| match v {
            Verdict::AnomalyScaleMismatch => 3,
            Verdict::AnomalyScoreMismatch => 2,
            Verdict::AnomalyCandidateNotFound => 1,
            Verdict::Valid => 0,
        };
        self.verdicts.iter().copied().max_by_key(severity).unwrap_or(Verdict::Valid)
    }

    pub fn is_valid(&self) -> bool {
        self.verdicts.is_empty()
    }
}

/// Configuration for anomaly detection
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub scale_size: usize,
    pub expected_total: f64,
    /// Deviation still considered valid
    pub tolerance: f64,
    /// Deviation beyond which a line is removed from the output
    pub auto_removal_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            scale_size: 5,
            expected_total: crate::constants::EXPECTED_TOTAL,
            tolerance: 0.0,
            auto_removal_threshold: 4.0,
        }
    }
}

impl From<&RunContext> for DetectorConfig {
    fn from(ctx: &RunContext) -> Self {
        Self {
            scale_size: ctx.profile.scale_size,
            expected_total: ctx.expected_total,
            tolerance: ctx.tolerance,
            auto_removal_threshold: ctx.auto_removal_threshold,
        }
    }
}

/// Trait for checking poll lines one at a time
pub trait LineValidator {
    /// Check a line, recording an anomaly for every non-valid verdict
    fn check(&mut self, line: &PollLine) -> LineAssessment;
}

/// Anomaly detector for one (poll, population) run.
///
/// The sequence counter is the only state; build a new detector (or call
/// [`AnomalyDetector::reset`]) for every population.
pub struct AnomalyDetector<'a> {
    registry: &'a CandidateRegistry,
    pub config: DetectorConfig,
    population: String,
    anomalies: Vec<Anomaly>,
}

impl<'a> AnomalyDetector<'a> {
    pub fn new(registry: &'a CandidateRegistry, population: impl Into<String>) -> Self {
        Self::with_config(registry, population, DetectorConfig::default())
    }

    pub fn with_config(registry: &'a CandidateRegistry, population: impl Into<String>, config: DetectorConfig) -> Self {
        Self { registry, config, population: population.into(), anomalies: Vec::new() }
    }

    /// Start a new population run: forget recorded anomalies and restart numbering
    pub fn reset(&mut self, population: impl Into<String>) {
        self.population = population.into();
        self.anomalies.clear();
    }

    pub fn population(&self) -> &str {
        &self.population
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    pub fn into_anomalies(self) -> Vec<Anomaly> {
        self.anomalies
    }

    fn record(&mut self, line: &PollLine, kind: AnomalyKind, auto_removed: bool) {
        let total = line.total();
        let difference = total - self.config.expected_total;
        let missing_position = match kind {
            AnomalyKind::ScoreSumMismatch => suggest_missing_position(&line.scores, difference),
            _ => None,
        };
        let SourceLocation { page, line: line_number } = line.source_location;
        self.anomalies.push(Anomaly {
            sequence_number: self.anomalies.len() + 1,
            page,
            line: line_number,
            candidate_name: line.candidate_name.clone(),
            population: self.population.clone(),
            scores: line.scores.clone(),
            total,
            difference,
            kind,
            auto_removed,
            missing_position,
        });
        MiningMetrics::record_anomaly(kind, auto_removed);
    }
}

impl LineValidator for AnomalyDetector<'_> {
    fn check(&mut self, line: &PollLine) -> LineAssessment {
        let mut verdicts = Vec::new();
        let mut keep = true;

        let candidate_identifier = self.registry.lookup(&line.candidate_name).map(|c| c.identifier.clone());
        if candidate_identifier.is_none() {
            self.record(line, AnomalyKind::CandidateNotInRegistry, false);
            verdicts.push(Verdict::AnomalyCandidateNotFound);
        }

        if line.scores.len() > self.config.scale_size {
            self.record(line, AnomalyKind::ScaleMismatch, true);
            verdicts.push(Verdict::AnomalyScaleMismatch);
            keep = false;
        } else {
            let deviation = (line.total() - self.config.expected_total).abs();
            if deviation > self.config.tolerance + EPSILON {
                let auto_removed = deviation > self.config.auto_removal_threshold + EPSILON;
                self.record(line, AnomalyKind::ScoreSumMismatch, auto_removed);
                verdicts.push(Verdict::AnomalyScoreMismatch);
                keep = !auto_removed;
            }
        }

        LineAssessment { candidate_identifier, verdicts, keep }
    }
}

/// Guess where the missing share of an under-summing line sits from the
/// size of its first and last scores. Only small gaps (at most 5 points)
/// get a hint.
pub fn suggest_missing_position(scores: &[f64], difference: f64) -> Option<MissingPosition> {
    let missing = -difference;
    if missing <= 0.0 || missing > 5.0 + EPSILON {
        return None;
    }
    let (first, last) = (scores.first()?, scores.last()?);
    if *first <= 10.0 {
        Some(MissingPosition::Start)
    } else if *last <= 10.0 {
        Some(MissingPosition::End)
    } else {
        Some(MissingPosition::Middle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CandidateRecord;

    fn registry() -> CandidateRegistry {
        CandidateRegistry::from_records(vec![
            CandidateRecord { identifier: "B1".to_string(), display_name: "B Candidat".to_string(), party: None },
            CandidateRecord { identifier: "AD".to_string(), display_name: "Anne Dupont".to_string(), party: None },
        ])
    }

    fn line(name: &str, scores: &[f64], number: usize) -> PollLine {
        PollLine {
            candidate_name: name.to_string(),
            scores: scores.to_vec(),
            population: "all".to_string(),
            source_location: SourceLocation { page: 4, line: number },
        }
    }

    fn four_point_config() -> DetectorConfig {
        DetectorConfig { scale_size: 4, ..DetectorConfig::default() }
    }

    #[test]
    fn test_valid_line_records_nothing() {
        let registry = registry();
        let mut detector = AnomalyDetector::new(&registry, "all");
        let assessment = detector.check(&line("Anne Dupont", &[30.0, 30.0, 20.0, 10.0, 10.0], 1));
        assert!(assessment.is_valid());
        assert_eq!(assessment.verdict(), Verdict::Valid);
        assert_eq!(assessment.candidate_identifier.as_deref(), Some("AD"));
        assert!(assessment.keep);
        assert!(detector.anomalies().is_empty());
    }

    #[test]
    fn test_small_mismatch_is_kept_for_review() {
        let registry = registry();
        let mut detector = AnomalyDetector::with_config(&registry, "all", four_point_config());
        let assessment = detector.check(&line("Anne Dupont", &[8.0, 13.0, 29.0, 48.0], 3));
        assert!(assessment.keep);
        assert_eq!(assessment.verdict(), Verdict::AnomalyScoreMismatch);

        let anomaly = &detector.anomalies()[0];
        assert_eq!(anomaly.kind, AnomalyKind::ScoreSumMismatch);
        assert_eq!(anomaly.total, 98.0);
        assert_eq!(anomaly.difference, -2.0);
        assert!(!anomaly.auto_removed);
        assert_eq!(anomaly.missing_position, Some(MissingPosition::Start));
    }

    #[test]
    fn test_large_mismatch_is_removed() {
        let registry = registry();
        let mut detector = AnomalyDetector::with_config(&registry, "all", four_point_config());
        let assessment = detector.check(&line("Anne Dupont", &[2.0, 18.0, 62.0, 28.0], 1));
        assert!(!assessment.keep);
        let anomaly = &detector.anomalies()[0];
        assert_eq!(anomaly.difference, 10.0);
        assert!(anomaly.auto_removed);
        assert_eq!(anomaly.missing_position, None);
    }

    #[test]
    fn test_threshold_boundary() {
        let registry = registry();
        let mut detector = AnomalyDetector::with_config(&registry, "all", four_point_config());

        let at_threshold = detector.check(&line("Anne Dupont", &[26.0, 26.0, 26.0, 26.0], 1));
        assert!(at_threshold.keep);
        assert!(!detector.anomalies()[0].auto_removed);

        let beyond = detector.check(&line("Anne Dupont", &[26.0, 26.0, 26.0, 27.0], 2));
        assert!(!beyond.keep);
        assert!(detector.anomalies()[1].auto_removed);

        let below = detector.check(&line("Anne Dupont", &[24.0, 24.0, 24.0, 24.0], 3));
        assert!(below.keep);
        assert_eq!(detector.anomalies()[2].difference, -4.0);
        assert!(!detector.anomalies()[2].auto_removed);
    }

    #[test]
    fn test_tolerance_absorbs_rounding() {
        let registry = registry();
        let config = DetectorConfig { scale_size: 4, tolerance: 1.0, ..DetectorConfig::default() };
        let mut detector = AnomalyDetector::with_config(&registry, "all", config);
        assert!(detector.check(&line("Anne Dupont", &[25.0, 25.0, 25.0, 26.0], 1)).is_valid());
        assert!(!detector.check(&line("Anne Dupont", &[25.0, 25.0, 25.0, 27.0], 2)).is_valid());
    }

    #[test]
    fn test_unknown_candidate_is_kept_with_blank_identifier() {
        let registry = registry();
        let mut detector = AnomalyDetector::with_config(&registry, "macron", four_point_config());
        let assessment = detector.check(&line("Inconnu Total", &[25.0, 25.0, 25.0, 25.0], 1));
        assert!(assessment.keep);
        assert_eq!(assessment.candidate_identifier, None);
        assert_eq!(assessment.verdict(), Verdict::AnomalyCandidateNotFound);
        assert_eq!(detector.anomalies().len(), 1);
        assert_eq!(detector.anomalies()[0].population, "macron");
        assert_eq!(detector.anomalies()[0].kind, AnomalyKind::CandidateNotInRegistry);
    }

    #[test]
    fn test_unknown_and_mismatched_records_two_anomalies() {
        let registry = registry();
        let mut detector = AnomalyDetector::with_config(&registry, "all", four_point_config());
        let assessment = detector.check(&line("Inconnu Total", &[25.0, 25.0, 25.0, 22.0], 1));
        assert_eq!(assessment.verdicts.len(), 2);
        assert_eq!(assessment.verdict(), Verdict::AnomalyScoreMismatch);
        let numbers: Vec<usize> = detector.anomalies().iter().map(|a| a.sequence_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_wrong_scale_is_rejected() {
        let registry = registry();
        let mut detector = AnomalyDetector::new(&registry, "all");
        let a = detector.check(&line("A Inconnu", &[21.0, 16.0, 15.0, 8.0, 38.0, 2.0], 1));
        let b = detector.check(&line("B Candidat", &[30.0, 30.0, 20.0, 10.0, 10.0], 2));

        assert!(!a.keep);
        assert!(a.verdicts.contains(&Verdict::AnomalyScaleMismatch));
        assert!(b.keep);
        assert_eq!(b.candidate_identifier.as_deref(), Some("B1"));
        let scale = detector.anomalies().iter().find(|x| x.kind == AnomalyKind::ScaleMismatch).unwrap();
        assert!(scale.auto_removed);
    }

    #[test]
    fn test_sequence_resets_per_population() {
        let registry = registry();
        let mut detector = AnomalyDetector::with_config(&registry, "all", four_point_config());
        detector.check(&line("Anne Dupont", &[20.0, 20.0, 20.0, 20.0], 1));
        detector.check(&line("Anne Dupont", &[20.0, 20.0, 20.0, 21.0], 2));
        assert_eq!(detector.anomalies().last().unwrap().sequence_number, 2);

        detector.reset("left");
        detector.check(&line("Anne Dupont", &[20.0, 20.0, 20.0, 20.0], 1));
        assert_eq!(detector.anomalies().len(), 1);
        assert_eq!(detector.anomalies()[0].sequence_number, 1);
        assert_eq!(detector.anomalies()[0].population, "left");
    }

    #[test]
    fn test_missing_position_hint() {
        assert_eq!(suggest_missing_position(&[5.0, 30.0, 40.0, 22.0], -3.0), Some(MissingPosition::Start));
        assert_eq!(suggest_missing_position(&[15.0, 30.0, 40.0, 8.0], -7.0), None);
        assert_eq!(suggest_missing_position(&[15.0, 30.0, 44.0, 8.0], -3.0), Some(MissingPosition::End));
        assert_eq!(suggest_missing_position(&[15.0, 30.0, 30.0, 22.0], -3.0), Some(MissingPosition::Middle));
        assert_eq!(suggest_missing_position(&[15.0, 30.0, 30.0, 30.0], 5.0), None);
        assert_eq!(suggest_missing_position(&[], -2.0), None);
    }
}
