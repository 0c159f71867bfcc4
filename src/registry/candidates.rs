use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MinerError, Result};
use crate::text::normalize;

/// Canonical candidate entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRecord {
    pub identifier: String,
    pub display_name: String,
    pub party: Option<String>,
}

/// Row layout of `candidates.csv`; unknown columns are ignored
#[derive(Debug, Deserialize)]
struct CandidateRow {
    candidate_id: String,
    name: String,
    surname: String,
    #[serde(default)]
    parti: Option<String>,
}

/// Read-only lookup from normalized "first last" name to candidate
#[derive(Debug, Clone, Default)]
pub struct CandidateRegistry {
    by_name: HashMap<String, CandidateRecord>,
}

impl CandidateRegistry {
    /// Load the registry from a CSV file with at least
    /// `candidate_id,name,surname` columns (and optionally `parti`)
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(MinerError::Registry(format!("candidate file not found: {}", path.display())));
        }
        let mut reader = csv::ReaderBuilder::new().flexible(true).trim(csv::Trim::All).from_path(path)?;

        let mut records = Vec::new();
        for row in reader.deserialize::<CandidateRow>() {
            let row = row?;
            if row.candidate_id.is_empty() || row.name.is_empty() || row.surname.is_empty() {
                debug!("Skipping incomplete candidate row: {:?}", row);
                continue;
            }
            // Some first names carry a stray comma ("François, Rebsamen")
            let display_name = format!("{} {}", row.name.replace(',', ""), row.surname);
            records.push(CandidateRecord {
                identifier: row.candidate_id,
                display_name,
                party: row.parti.filter(|p| !p.is_empty()),
            });
        }

        let registry = Self::from_records(records);
        debug!("Loaded {} candidates from {}", registry.len(), path.display());
        Ok(registry)
    }

    pub fn from_records(records: impl IntoIterator<Item = CandidateRecord>) -> Self {
        let mut by_name: HashMap<String, CandidateRecord> = HashMap::new();
        for record in records {
            let key = normalize(&record.display_name);
            match by_name.entry(key) {
                Entry::Occupied(existing) => {
                    let existing: &CandidateRecord = existing.get();
                    if existing.identifier != record.identifier {
                        warn!(
                            "Candidate name '{}' maps to both {} and {}; keeping {}",
                            record.display_name, existing.identifier, record.identifier, existing.identifier
                        );
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
            }
        }
        Self { by_name }
    }

    /// Resolve a printed name by normalized-name equality
    pub fn lookup(&self, name: &str) -> Option<&CandidateRecord> {
        self.by_name.get(&normalize(name))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
