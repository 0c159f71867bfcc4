use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MinerError, Result};
use crate::text::squash;

const BUILTIN_POPULATIONS: &str = include_str!("../../config/populations.toml");

/// A population segment: code, human label, institutes that publish it and
/// the phrases that identify it in a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationDef {
    pub code: String,
    pub label: String,
    pub institutes: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PopulationFile {
    population: Vec<PopulationDef>,
}

/// Data-driven population table, in detection order
#[derive(Debug, Clone)]
pub struct PopulationTable {
    populations: Vec<PopulationDef>,
    /// Keywords with spacing removed, parallel to `populations`
    signatures: Vec<Vec<String>>,
}

impl PopulationTable {
    /// Table shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_POPULATIONS)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MinerError::Config(format!("Failed to read population table '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: PopulationFile = toml::from_str(content)?;
        let mut seen = HashSet::new();
        for population in &file.population {
            if population.code.trim().is_empty() {
                return Err(MinerError::Config("Population with empty code".to_string()));
            }
            if !seen.insert(population.code.clone()) {
                return Err(MinerError::Config(format!("Duplicate population code '{}'", population.code)));
            }
        }

        let signatures = file
            .population
            .iter()
            .map(|p| {
                p.keywords
                    .iter()
                    .map(|k| squash(k))
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .collect();

        Ok(Self { populations: file.population, signatures })
    }

    pub fn get(&self, code: &str) -> Option<&PopulationDef> {
        self.populations.iter().find(|p| p.code == code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PopulationDef> {
        self.populations.iter()
    }

    /// Populations an institute declares, in table order
    pub fn for_institute(&self, institute: &str) -> Vec<&PopulationDef> {
        self.populations
            .iter()
            .filter(|p| p.institutes.iter().any(|i| i == institute))
            .collect()
    }

    pub fn is_declared(&self, institute: &str, code: &str) -> bool {
        self.get(code)
            .map(|p| p.institutes.iter().any(|i| i == institute))
            .unwrap_or(false)
    }

    /// Identify the population a caption or page text refers to.
    ///
    /// Only populations declared for `institute` are considered; the first
    /// one (in table order) with a keyword contained in the text wins.
    /// Spacing is ignored on both sides so that words split or glued by the
    /// text layer still match.
    pub fn detect(&self, institute: &str, text: &str) -> Option<&PopulationDef> {
        let haystack = squash(text);
        if haystack.is_empty() {
            return None;
        }
        self.populations
            .iter()
            .zip(self.signatures.iter())
            .filter(|(p, _)| p.institutes.iter().any(|i| i == institute))
            .find(|(_, keywords)| keywords.iter().any(|k| haystack.contains(k.as_str())))
            .map(|(p, _)| p)
    }

    /// Label for a code, falling back to the code itself
    pub fn label_of<'a>(&'a self, code: &'a str) -> &'a str {
        self.get(code).map(|p| p.label.as_str()).unwrap_or(code)
    }
}
