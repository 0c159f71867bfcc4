//! Record extraction: positioned text of a located section to candidate rows.

use tracing::debug;

use crate::document::{Document, TextLine};
use crate::pipeline::processing::locator::LocatedSection;
use crate::registry::InstituteProfile;
use crate::text::{normalize, parse_score};
use crate::types::{PollLine, RawTableRow, SourceLocation};

/// Lowercase name particles accepted between capitalized tokens
const PARTICLES: &[&str] = &["de", "du", "des", "la", "le", "von", "van", "der", "ben", "di", "da", "del"];

/// Words that never appear in a personality name but often in table furniture
const STOPWORDS: &[&str] = &[
    "total",
    "ensemble",
    "electeurs",
    "sympathisants",
    "abstentionnistes",
    "base",
    "source",
    "sous",
    "vous",
    "rappel",
    "evolution",
    "question",
    "classement",
    "personnalites",
    "barometre",
    "image",
    "positive",
    "negative",
    "opinion",
    "nsp",
    "methodologie",
    "echantillon",
    "page",
    "sait",
];

/// A whitespace-separated piece of a line with its horizontal position
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub x: f64,
    pub text: String,
}

/// Split a line into cells. A lone `%` is attached to the value before it.
pub fn cells(line: &TextLine) -> Vec<Cell> {
    let mut cells: Vec<Cell> = Vec::new();
    for element in &line.elements {
        for (index, token) in element.text.split_whitespace().enumerate() {
            if token == "%" {
                if let Some(previous) = cells.last_mut() {
                    previous.text.push('%');
                }
                continue;
            }
            cells.push(Cell { x: element.x + index as f64 * 0.01, text: token.to_string() });
        }
    }
    cells
}

fn is_filler(text: &str) -> bool {
    text.chars().all(|c| !c.is_alphanumeric())
}

/// Heuristic for "this looks like a personal name": 1 to 6 tokens made of
/// letters, each capitalized except name particles, and none of the words
/// used by headers, legends and footers. A lone capitalized token ("Bayrou",
/// "A") is accepted.
pub fn looks_like_name(label: &str) -> bool {
    let tokens: Vec<&str> = label.split_whitespace().collect();
    let length = label.chars().count();
    if !(1..=6).contains(&tokens.len()) || !(1..=60).contains(&length) {
        return false;
    }

    let mut named = 0;
    for (index, token) in tokens.iter().enumerate() {
        if !token.chars().any(char::is_alphabetic)
            || !token.chars().all(|c| c.is_alphabetic() || matches!(c, '-' | '\'' | '\u{2019}' | '.'))
        {
            return false;
        }
        let folded = normalize(token);
        if STOPWORDS.contains(&folded.as_str()) {
            return false;
        }
        if index > 0 && PARTICLES.contains(&token) {
            continue;
        }
        // d'Estaing, l'Hermite
        let core = ["d'", "d\u{2019}", "l'", "l\u{2019}"]
            .iter()
            .find_map(|prefix| token.strip_prefix(prefix))
            .filter(|_| index > 0)
            .unwrap_or(token);
        match core.chars().next() {
            Some(first) if first.is_uppercase() => named += 1,
            _ => return false,
        }
    }
    named >= 1
}

/// First name and surname at least. Single words on a caption line are more
/// often population labels than names.
pub fn looks_like_full_name(label: &str) -> bool {
    label.split_whitespace().nth(1).is_some() && looks_like_name(label)
}

/// Shape of one recovered line
#[derive(Debug, Clone, PartialEq)]
enum RowShape {
    Candidate { label: String, scores: Vec<String> },
    Label(String),
    Scores(Vec<String>),
    Other,
}

fn shape(line: &TextLine) -> RowShape {
    let cells: Vec<Cell> = cells(line).into_iter().filter(|c| !is_filler(&c.text)).collect();
    if cells.is_empty() {
        return RowShape::Other;
    }

    // Rank numbers printed left of the name are not scores
    let label_start = cells.iter().position(|c| parse_score(&c.text).is_none());
    let Some(label_start) = label_start else {
        return RowShape::Scores(cells.into_iter().map(|c| c.text).collect());
    };

    let label_end = cells[label_start..]
        .iter()
        .position(|c| parse_score(&c.text).is_some())
        .map(|offset| label_start + offset)
        .unwrap_or(cells.len());
    let label = cells[label_start..label_end].iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(" ");
    let scores: Vec<String> = cells[label_end..]
        .iter()
        .filter(|c| parse_score(&c.text).is_some())
        .map(|c| c.text.clone())
        .collect();

    if !looks_like_name(&label) {
        return RowShape::Other;
    }
    if scores.is_empty() {
        RowShape::Label(label)
    } else {
        RowShape::Candidate { label, scores }
    }
}

/// Turns located sections into raw rows and raw rows into poll lines
pub struct RecordExtractor<'a> {
    profile: &'a InstituteProfile,
}

impl<'a> RecordExtractor<'a> {
    pub fn new(profile: &'a InstituteProfile) -> Self {
        Self { profile }
    }

    /// Rows of one section, in document order
    pub fn extract_section(&self, document: &Document, section: &LocatedSection) -> Vec<RawTableRow> {
        if section.is_series() {
            return self.extract_series(document, section);
        }
        let Some(page) = document.page(section.page) else {
            return Vec::new();
        };

        let lines: Vec<TextLine> = page
            .lines(self.profile.row_tolerance)
            .into_iter()
            .filter(|line| section.contains_y(line.y))
            .collect();
        let shapes: Vec<(f64, RowShape)> = lines.iter().map(|line| (line.y, shape(line))).collect();

        let rows: Vec<(String, Vec<String>)> = self.merge_orphan_labels(shapes);
        debug!("Section {}: {} candidate rows from {} lines", section.section_id, rows.len(), lines.len());

        rows.into_iter()
            .enumerate()
            .map(|(index, (label, scores))| RawTableRow {
                page_number: section.page,
                line_position: index + 1,
                raw_label: label,
                raw_scores: scores,
            })
            .collect()
    }

    /// Pair labels printed without numbers with the nearest numbers-only row
    /// within the label offset, and keep complete candidate rows as they are
    fn merge_orphan_labels(&self, shapes: Vec<(f64, RowShape)>) -> Vec<(String, Vec<String>)> {
        let offset = self.profile.label_offset;
        let mut consumed = vec![false; shapes.len()];
        let mut rows = Vec::new();

        for index in 0..shapes.len() {
            let (y, shape) = &shapes[index];
            match shape {
                RowShape::Candidate { label, scores } => rows.push((label.clone(), scores.clone())),
                RowShape::Label(label) => {
                    let nearby = |other: usize| -> Option<f64> {
                        match &shapes[other] {
                            (other_y, RowShape::Scores(_)) if !consumed[other] && (y - other_y).abs() <= offset => {
                                Some((y - other_y).abs())
                            }
                            _ => None,
                        }
                    };
                    let previous = index.checked_sub(1).and_then(|i| nearby(i).map(|d| (i, d)));
                    let next = (index + 1 < shapes.len()).then(|| nearby(index + 1).map(|d| (index + 1, d))).flatten();
                    let chosen = match (previous, next) {
                        (Some(p), Some(n)) => Some(if n.1 < p.1 { n.0 } else { p.0 }),
                        (Some(p), None) => Some(p.0),
                        (None, Some(n)) => Some(n.0),
                        (None, None) => None,
                    };
                    match chosen {
                        Some(other) => {
                            consumed[other] = true;
                            if let RowShape::Scores(scores) = &shapes[other].1 {
                                rows.push((label.clone(), scores.clone()));
                            }
                        }
                        None => debug!("Label '{}' has no score row nearby", label),
                    }
                }
                RowShape::Scores(_) | RowShape::Other => {}
            }
        }
        rows
    }

    fn extract_series(&self, document: &Document, section: &LocatedSection) -> Vec<RawTableRow> {
        document
            .series
            .iter()
            .enumerate()
            .map(|(index, series)| RawTableRow {
                page_number: section.page,
                line_position: index + 1,
                raw_label: series.label.clone(),
                raw_scores: series.values.clone(),
            })
            .collect()
    }

    /// Parse a raw row into a poll line. Unreadable cells are dropped and a
    /// trailing total column is removed when it adds up the scale.
    pub fn to_poll_line(&self, row: &RawTableRow, population: &str) -> PollLine {
        let mut scores: Vec<f64> = row.raw_scores.iter().filter_map(|s| parse_score(s)).collect();

        let scale = self.profile.scale_size;
        if scores.len() == scale + 1 {
            let head: f64 = scores[..scale].iter().sum();
            let last = scores[scale];
            if (last - head).abs() < 1e-6 || (last - self.profile.expected_total).abs() < 1e-6 {
                scores.truncate(scale);
            }
        }

        PollLine {
            candidate_name: row.raw_label.split_whitespace().collect::<Vec<_>>().join(" "),
            scores,
            population: population.to_string(),
            source_location: SourceLocation { page: row.page_number, line: row.line_position },
        }
    }
}
