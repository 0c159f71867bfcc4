use serde::{Deserialize, Serialize};

/// One positioned string on a document page (PDF user-space coordinates, y grows upward)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextElement {
    pub x: f64,
    pub y: f64,
    pub text: String,
}

impl TextElement {
    pub fn new(x: f64, y: f64, text: impl Into<String>) -> Self {
        Self { x, y, text: text.into() }
    }
}

/// Where a line came from, for diagnostics and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub page: u32,
    pub line: usize,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page {}, line {}", self.page, self.line)
    }
}

/// A tabular row as recovered from the document, before any validation
#[derive(Debug, Clone, PartialEq)]
pub struct RawTableRow {
    pub page_number: u32,
    pub line_position: usize,
    /// Candidate name as printed
    pub raw_label: String,
    /// Score cells in document order, still as text
    pub raw_scores: Vec<String>,
}

/// A candidate line ready for validation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollLine {
    pub candidate_name: String,
    pub scores: Vec<f64>,
    pub population: String,
    pub source_location: SourceLocation,
}

impl PollLine {
    pub fn total(&self) -> f64 {
        self.scores.iter().sum()
    }
}

/// Final normalized row written to an output table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    /// Empty when the name could not be resolved against the registry
    pub candidate_identifier: Option<String>,
    pub candidate_name: String,
    /// One entry per output slot; `None` renders as an empty cell
    pub scores: Vec<Option<f64>>,
    pub poll_type_code: Option<String>,
    pub population: String,
}

/// Render a score the way it was printed: integers without a decimal part
pub fn format_score(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{:.2}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Render a score list as `[8, 13, 29, 48]`
pub fn format_scores(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format_score(*v)).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(38.0), "38");
        assert_eq!(format_score(12.5), "12.5");
        assert_eq!(format_score(0.0), "0");
        assert_eq!(format_score(-2.0), "-2");
        assert_eq!(format_score(33.333), "33.33");
    }

    #[test]
    fn test_format_scores() {
        assert_eq!(format_scores(&[8.0, 13.0, 29.0, 48.0]), "[8, 13, 29, 48]");
        assert_eq!(format_scores(&[]), "[]");
    }

    #[test]
    fn test_poll_line_total() {
        let line = PollLine {
            candidate_name: "Jean Test".to_string(),
            scores: vec![2.0, 18.0, 62.0, 28.0],
            population: "all".to_string(),
            source_location: SourceLocation { page: 4, line: 1 },
        };
        assert_eq!(line.total(), 110.0);
    }
}
