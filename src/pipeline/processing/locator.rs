//! Page/section locator: finds which parts of a document hold result tables
//! and which population each one describes.

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::document::{Document, Page, TextLine};
use crate::error::{MinerError, Result};
use crate::pipeline::processing::extractor::{cells, looks_like_full_name};
use crate::registry::{InstituteProfile, LayoutKind, PopulationTable};
use crate::text::{normalize, parse_score};

/// A document region holding one population's table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocatedSection {
    pub section_id: String,
    pub page: u32,
    pub population: String,
    /// Caption text that named the population, when the layout has captions
    pub caption: Option<String>,
    /// Vertical window `(top, bottom)`, exclusive; `None` means the whole page
    pub band: Option<(f64, f64)>,
    series: bool,
}

impl LocatedSection {
    /// A whole page
    pub fn page(page: u32, population: impl Into<String>) -> Self {
        Self {
            section_id: format!("p{}", page),
            page,
            population: population.into(),
            caption: None,
            band: None,
            series: false,
        }
    }

    /// The embedded value series of an HTML document
    pub fn series(population: impl Into<String>) -> Self {
        Self { section_id: "series".to_string(), series: true, ..Self::page(1, population) }
    }

    pub fn is_series(&self) -> bool {
        self.series
    }

    pub fn contains_y(&self, y: f64) -> bool {
        match self.band {
            Some((top, bottom)) => y < top && y > bottom,
            None => true,
        }
    }
}

/// Signature-based section finder, parameterized by an institute profile
pub struct PageLocator<'a> {
    profile: &'a InstituteProfile,
    populations: &'a PopulationTable,
    titles: Vec<Regex>,
    columns: Vec<Regex>,
    caption_noise: Vec<Regex>,
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| MinerError::Config(format!("Invalid pattern '{}': {}", p, e))))
        .collect()
}

impl<'a> PageLocator<'a> {
    pub fn new(profile: &'a InstituteProfile, populations: &'a PopulationTable) -> Result<Self> {
        Ok(Self {
            profile,
            populations,
            titles: compile(&profile.title_patterns)?,
            columns: compile(&profile.column_patterns)?,
            caption_noise: compile(&profile.caption_strip_patterns)?,
        })
    }

    /// Sections holding data, in document order. An empty result is not an
    /// error; the caller decides what zero sections means.
    pub fn locate(&self, document: &Document) -> Vec<LocatedSection> {
        let sections = match self.profile.layout {
            LayoutKind::EmbeddedSeries => self.locate_series(document),
            LayoutKind::Paged | LayoutKind::Captioned => document
                .pages
                .iter()
                .filter(|page| self.profile.page_range.contains(page.number))
                .flat_map(|page| self.locate_in_page(page))
                .collect(),
        };
        debug!("Located {} sections for {}", sections.len(), self.profile.id);
        sections
    }

    fn locate_in_page(&self, page: &Page) -> Vec<LocatedSection> {
        let lines = page.lines(self.profile.row_tolerance);
        let text = normalize(&lines.iter().map(TextLine::text).collect::<Vec<_>>().join("\n"));
        if !self.has_signature(&text) {
            return Vec::new();
        }

        let score_rows = lines.iter().filter(|line| has_score(line)).count();
        if score_rows < self.profile.min_table_rows {
            debug!("Page {} matches the title but has only {} score rows", page.number, score_rows);
            return Vec::new();
        }

        match self.profile.layout {
            LayoutKind::Captioned => self.split_captioned(page.number, &lines),
            _ => match self.populations.detect(&self.profile.id, &text) {
                Some(population) => vec![LocatedSection::page(page.number, population.code.clone())],
                None => {
                    warn!("Data page {} names no known {} population, skipping", page.number, self.profile.name);
                    Vec::new()
                }
            },
        }
    }

    /// Whether normalized page text carries the institute's title and
    /// enough of its column headers
    pub fn has_signature(&self, text: &str) -> bool {
        let has_title = self.titles.is_empty() || self.titles.iter().any(|r| r.is_match(text));
        let columns = self.columns.iter().filter(|r| r.is_match(text)).count();
        has_title && columns >= self.profile.min_column_matches
    }

    /// Split a page into the tables introduced by population captions
    fn split_captioned(&self, page: u32, lines: &[TextLine]) -> Vec<LocatedSection> {
        let mut sections: Vec<LocatedSection> = Vec::new();
        let mut rows_in_current = 0usize;

        for line in lines {
            if has_score(line) {
                rows_in_current += 1;
                continue;
            }
            let raw = line.text();
            if looks_like_full_name(&raw) {
                continue;
            }
            let mut caption = normalize(&raw);
            for noise in &self.caption_noise {
                caption = noise.replace_all(&caption, "").trim().to_string();
            }
            let Some(population) = self.populations.detect(&self.profile.id, &caption) else {
                continue;
            };

            if let Some(previous) = sections.last_mut() {
                if let Some((top, _)) = previous.band {
                    previous.band = Some((top, line.y));
                }
                if rows_in_current == 0 {
                    debug!("Caption '{}' on page {} has no rows", previous.caption.as_deref().unwrap_or(""), page);
                    sections.pop();
                }
            }
            rows_in_current = 0;

            sections.push(LocatedSection {
                section_id: format!("p{}.t{}", page, sections.len() + 1),
                caption: Some(raw),
                band: Some((line.y, f64::NEG_INFINITY)),
                ..LocatedSection::page(page, population.code.clone())
            });
        }

        if rows_in_current == 0 {
            sections.pop();
        }
        sections
    }

    fn locate_series(&self, document: &Document) -> Vec<LocatedSection> {
        if document.series.is_empty() {
            return Vec::new();
        }
        let text = document.pages.iter().map(|p| p.text(self.profile.row_tolerance)).collect::<Vec<_>>().join("\n");
        let population = self
            .populations
            .detect(&self.profile.id, &text)
            .map(|p| p.code.clone())
            .or_else(|| self.profile.default_population.clone());
        match population {
            Some(population) => vec![LocatedSection::series(population)],
            None => {
                warn!("Embedded series found but no population could be determined");
                Vec::new()
            }
        }
    }
}

fn has_score(line: &TextLine) -> bool {
    cells(line).iter().any(|c| parse_score(&c.text).is_some())
}
