//! Sidecar metadata descriptor and poll identifier validation.
//!
//! The descriptor is a `key: value` text file next to the source document.
//! Blank lines and `#` comments are ignored; any other line must contain a
//! colon.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::document::Document;
use crate::error::{MinerError, Result};
use crate::text::normalize;

static POLL_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([a-z0-9]+)_(\d{4})(\d{2})$").expect("valid regex"));

static SAMPLE_NOTICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"echantillon\s+(?:de|:)\s*(\d[\d\s]*?)\s*personnes").expect("valid regex"));

/// Parsed `key: value` pairs, keys lowercased
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataDescriptor {
    pub path: PathBuf,
    pub entries: BTreeMap<String, String>,
}

/// Provenance confirmed before extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurveyInfo {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub sample_size: Option<u32>,
}

impl MetadataDescriptor {
    /// Read the descriptor; a missing file is fatal for the run
    pub fn read(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(MinerError::MetadataMissing(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim().trim_start_matches('\u{feff}');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                return Err(MinerError::MetadataInvalid {
                    path: path.to_path_buf(),
                    message: format!("line {} is not a 'key: value' pair", index + 1),
                });
            };
            entries.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
        Ok(Self { path: path.to_path_buf(), entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn invalid(&self, message: impl Into<String>) -> MinerError {
        MinerError::MetadataInvalid { path: self.path.clone(), message: message.into() }
    }

    /// Check that every required key is present and well-formed
    pub fn validate(&self, required: &[String]) -> Result<SurveyInfo> {
        for key in required {
            match self.get(key) {
                Some(value) if !value.is_empty() => {}
                _ => return Err(self.invalid(format!("required key '{}' is missing or empty", key))),
            }
        }

        let start_date = self.date("survey_start_date")?;
        let end_date = self.date("survey_end_date")?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                return Err(self.invalid(format!("survey starts ({}) after it ends ({})", start, end)));
            }
        }

        let sample_size = match self.get("sample_size") {
            Some(raw) => Some(
                parse_sample_size(raw)
                    .ok_or_else(|| self.invalid(format!("sample_size '{}' is not a positive integer", raw)))?,
            ),
            None => None,
        };

        Ok(SurveyInfo { start_date, end_date, sample_size })
    }

    fn date(&self, key: &str) -> Result<Option<NaiveDate>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(Some)
                .map_err(|_| self.invalid(format!("{} '{}' is not a YYYY-MM-DD date", key, raw))),
        }
    }
}

fn parse_sample_size(raw: &str) -> Option<u32> {
    let digits: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().filter(|n| *n > 0)
}

/// Poll ids look like `elabe_202511`: the institute id, then year and month
pub fn validate_poll_id(poll_id: &str, institute: &str) -> Result<()> {
    let invalid = |reason: String| MinerError::InvalidPollId { id: poll_id.to_string(), reason };

    let captures = POLL_ID
        .captures(poll_id)
        .ok_or_else(|| invalid("expected <institute>_<YYYYMM>".to_string()))?;
    if &captures[1] != institute {
        return Err(invalid(format!("prefix '{}' does not match institute '{}'", &captures[1], institute)));
    }
    let year: i32 = captures[2].parse().map_err(|_| invalid("unreadable year".to_string()))?;
    let month: u32 = captures[3].parse().map_err(|_| invalid("unreadable month".to_string()))?;
    match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(date) if (2000..=2100).contains(&date.year()) => Ok(()),
        Some(_) => Err(invalid(format!("year {} out of range", year))),
        None => Err(invalid(format!("month {} out of range", month))),
    }
}

/// Sample size announced in the methodology notice of the first pages
pub fn methodology_sample_size(document: &Document, pages: u32, row_tolerance: f64) -> Option<u32> {
    document
        .pages
        .iter()
        .filter(|page| page.number <= pages)
        .find_map(|page| {
            let text = normalize(&page.text(row_tolerance));
            let captures = SAMPLE_NOTICE.captures(&text)?;
            let size = parse_sample_size(&captures[1]);
            debug!("Methodology notice on page {}: {:?}", page.number, size);
            size
        })
}
