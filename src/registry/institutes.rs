use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MinerError, Result};

const BUILTIN_INSTITUTES: &str = include_str!("../../config/institutes.toml");

/// How an institute lays out its result tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    /// One table per page, population named somewhere on the page
    Paged,
    /// Several tables per page, each introduced by a caption naming its population
    Captioned,
    /// Structured value array embedded in an HTML page
    EmbeddedSeries,
}

/// Inclusive page window the locator scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn contains(&self, page: u32) -> bool {
        page >= self.start && page <= self.end
    }
}

impl From<[u32; 2]> for PageRange {
    fn from(bounds: [u32; 2]) -> Self {
        Self { start: bounds[0], end: bounds[1] }
    }
}

/// Fixed layout, scale and validation conventions of one institute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstituteProfile {
    pub id: String,
    pub name: String,
    pub layout: LayoutKind,
    /// Number of response categories per candidate
    pub scale_size: usize,
    /// Score columns in the output table; extra slots stay empty
    pub output_slots: usize,
    #[serde(default)]
    pub poll_type_code: Option<String>,
    #[serde(with = "page_range_array")]
    pub page_range: PageRange,
    #[serde(default)]
    pub tolerance: f64,
    #[serde(default = "default_threshold")]
    pub auto_removal_threshold: f64,
    #[serde(default = "default_expected_total")]
    pub expected_total: f64,
    /// Vertical distance under which text belongs to the same row
    #[serde(default = "default_row_tolerance")]
    pub row_tolerance: f64,
    /// Vertical distance under which a bare label is attached to a bare score row
    #[serde(default = "default_label_offset")]
    pub label_offset: f64,
    #[serde(default = "default_min_table_rows")]
    pub min_table_rows: usize,
    #[serde(default)]
    pub title_patterns: Vec<String>,
    #[serde(default)]
    pub column_patterns: Vec<String>,
    #[serde(default)]
    pub min_column_matches: usize,
    #[serde(default)]
    pub caption_strip_patterns: Vec<String>,
    /// Population used when the document never names one
    #[serde(default)]
    pub default_population: Option<String>,
    #[serde(default)]
    pub include_name_column: bool,
    #[serde(default = "default_required_metadata")]
    pub required_metadata: Vec<String>,
    /// Leading pages scanned for the methodology notice
    #[serde(default = "default_methodology_pages")]
    pub methodology_pages: u32,
}

fn default_threshold() -> f64 {
    4.0
}

fn default_expected_total() -> f64 {
    crate::constants::EXPECTED_TOTAL
}

fn default_row_tolerance() -> f64 {
    3.0
}

fn default_label_offset() -> f64 {
    8.0
}

fn default_min_table_rows() -> usize {
    1
}

fn default_methodology_pages() -> u32 {
    5
}

pub fn default_required_metadata() -> Vec<String> {
    vec![
        "survey_start_date".to_string(),
        "survey_end_date".to_string(),
        "sample_size".to_string(),
    ]
}

mod page_range_array {
    use super::PageRange;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(range: &PageRange, serializer: S) -> Result<S::Ok, S::Error> {
        [range.start, range.end].serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PageRange, D::Error> {
        let bounds = <[u32; 2]>::deserialize(deserializer)?;
        Ok(PageRange::from(bounds))
    }
}

impl InstituteProfile {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(MinerError::Config("Institute with empty id".to_string()));
        }
        if self.scale_size == 0 {
            return Err(MinerError::Config(format!("Institute '{}' has an empty scale", self.id)));
        }
        if self.output_slots < self.scale_size {
            return Err(MinerError::Config(format!(
                "Institute '{}' has {} output slots for a scale of {}",
                self.id, self.output_slots, self.scale_size
            )));
        }
        if self.page_range.start == 0 || self.page_range.start > self.page_range.end {
            return Err(MinerError::Config(format!(
                "Institute '{}' has an invalid page range {}-{}",
                self.id, self.page_range.start, self.page_range.end
            )));
        }
        if self.tolerance < 0.0 || self.auto_removal_threshold < self.tolerance {
            return Err(MinerError::Config(format!(
                "Institute '{}': auto-removal threshold {} must not be below tolerance {}",
                self.id, self.auto_removal_threshold, self.tolerance
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct InstituteFile {
    institute: Vec<InstituteProfile>,
}

/// All known institute profiles, in declaration order
#[derive(Debug, Clone)]
pub struct InstituteTable {
    profiles: Vec<InstituteProfile>,
}

impl InstituteTable {
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_INSTITUTES)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MinerError::Config(format!("Failed to read institute table '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: InstituteFile = toml::from_str(content)?;
        let mut seen = HashSet::new();
        for profile in &file.institute {
            profile.validate()?;
            if !seen.insert(profile.id.clone()) {
                return Err(MinerError::Config(format!("Duplicate institute id '{}'", profile.id)));
            }
        }
        Ok(Self { profiles: file.institute })
    }

    pub fn get(&self, id: &str) -> Result<&InstituteProfile> {
        self.profiles
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| MinerError::UnknownInstitute(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstituteProfile> {
        self.profiles.iter()
    }
}
