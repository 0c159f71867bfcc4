use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::constants;
use crate::error::{MinerError, Result};
use crate::registry::{InstituteProfile, InstituteTable, PageRange, PopulationTable};

/// Tuning values that may be overridden globally or per institute
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileOverrides {
    pub tolerance: Option<f64>,
    pub auto_removal_threshold: Option<f64>,
    pub row_tolerance: Option<f64>,
    pub label_offset: Option<f64>,
    pub page_range: Option<[u32; 2]>,
}

impl ProfileOverrides {
    fn apply(&self, profile: &mut InstituteProfile) {
        if let Some(tolerance) = self.tolerance {
            profile.tolerance = tolerance;
        }
        if let Some(threshold) = self.auto_removal_threshold {
            profile.auto_removal_threshold = threshold;
        }
        if let Some(row_tolerance) = self.row_tolerance {
            profile.row_tolerance = row_tolerance;
        }
        if let Some(label_offset) = self.label_offset {
            profile.label_offset = label_offset;
        }
        if let Some(range) = self.page_range {
            profile.page_range = PageRange::from(range);
        }
    }
}

/// Application configuration (`poll_miner.toml`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Candidate registry location
    pub candidates: Option<PathBuf>,
    /// Replacement population table
    pub populations_file: Option<PathBuf>,
    /// Replacement institute table
    pub institutes_file: Option<PathBuf>,
    #[serde(default)]
    pub defaults: ProfileOverrides,
    #[serde(default)]
    pub institutes: HashMap<String, ProfileOverrides>,
}

impl AppConfig {
    /// Load the configuration. An explicit path must exist; without one the
    /// default file is read when present and built-in values are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(constants::CONFIG_FILE);
                if !default.is_file() {
                    debug!("No {} found, using built-in configuration", constants::CONFIG_FILE);
                    return Ok(Self::default());
                }
                default
            }
        };

        let config_content = fs::read_to_string(&config_path).map_err(|e| {
            MinerError::Config(format!("Failed to read config file '{}': {}", config_path.display(), e))
        })?;

        let config: AppConfig = toml::from_str(&config_content)?;
        Ok(config)
    }

    pub fn population_table(&self) -> Result<PopulationTable> {
        match &self.populations_file {
            Some(path) => PopulationTable::load(path),
            None => PopulationTable::builtin(),
        }
    }

    pub fn institute_table(&self) -> Result<InstituteTable> {
        match &self.institutes_file {
            Some(path) => InstituteTable::load(path),
            None => InstituteTable::builtin(),
        }
    }

    /// Institute profile with global then institute-specific overrides applied
    pub fn profile(&self, institutes: &InstituteTable, id: &str) -> Result<InstituteProfile> {
        let mut profile = institutes.get(id)?.clone();
        self.defaults.apply(&mut profile);
        if let Some(overrides) = self.institutes.get(id) {
            overrides.apply(&mut profile);
        }
        profile.validate()?;
        Ok(profile)
    }

    pub fn candidates_path(&self) -> PathBuf {
        self.candidates
            .clone()
            .unwrap_or_else(|| PathBuf::from(constants::CANDIDATES_FILE))
    }
}

/// Everything one run needs, passed explicitly to each component
#[derive(Debug, Clone)]
pub struct RunContext {
    pub profile: InstituteProfile,
    pub populations: PopulationTable,
    pub poll_id: String,
    pub document: PathBuf,
    pub output_dir: PathBuf,
    pub tolerance: f64,
    pub auto_removal_threshold: f64,
    pub expected_total: f64,
    /// Restrict building to one population
    pub population_filter: Option<String>,
}

impl RunContext {
    /// Context writing next to the source document
    pub fn new(
        profile: InstituteProfile,
        populations: PopulationTable,
        poll_id: impl Into<String>,
        document: impl Into<PathBuf>,
    ) -> Self {
        let document = document.into();
        let output_dir = document
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            tolerance: profile.tolerance,
            auto_removal_threshold: profile.auto_removal_threshold,
            expected_total: profile.expected_total,
            profile,
            populations,
            poll_id: poll_id.into(),
            document,
            output_dir,
            population_filter: None,
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_population_filter(mut self, population: Option<String>) -> Self {
        self.population_filter = population;
        self
    }

    /// Sidecar descriptor beside the source document
    pub fn metadata_path(&self) -> PathBuf {
        self.document
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(constants::METADATA_FILE)
    }

    pub fn institute(&self) -> &str {
        &self.profile.id
    }
}
