//! The two operations an institute plugs into the orchestrator: Extract and
//! Build. All built-in institutes share the same implementations, which are
//! parameterized by the profile carried in the run context.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::config::RunContext;
use crate::constants::{CLUSTER17, ELABE, IPSOS};
use crate::document::Document;
use crate::error::{MinerError, Result};
use crate::metrics::MiningMetrics;
use crate::pipeline::metadata::methodology_sample_size;
use crate::pipeline::processing::builder::{PopulationOutput, TableBuilder};
use crate::pipeline::processing::extractor::RecordExtractor;
use crate::pipeline::processing::locator::{LocatedSection, PageLocator};
use crate::registry::CandidateRegistry;
use crate::types::PollLine;

/// Lines of one population, merged across its sections in document order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationLines {
    pub population: String,
    pub sections: Vec<String>,
    pub lines: Vec<PollLine>,
}

/// Everything Extract hands over to Build
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extraction {
    pub sections: Vec<LocatedSection>,
    pub populations: Vec<PopulationLines>,
    pub rows_extracted: usize,
    /// Sample size printed in the methodology notice, if any
    pub methodology_sample_size: Option<u32>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.populations.is_empty()
    }

    pub fn lines_for(&self, population: &str) -> Option<&[PollLine]> {
        self.populations.iter().find(|p| p.population == population).map(|p| p.lines.as_slice())
    }
}

/// Locate and extract every data section of the run's document
pub trait ExtractStep {
    fn extract(&self, ctx: &RunContext) -> Result<Extraction>;
}

/// Validate extracted lines and write the output files
pub trait BuildStep {
    fn build(&self, ctx: &RunContext, candidates: &CandidateRegistry, extraction: &Extraction)
        -> Result<Vec<PopulationOutput>>;
}

/// Locator + extractor over a document loaded from disk
#[derive(Debug, Default)]
pub struct DocumentExtract;

impl DocumentExtract {
    pub fn new() -> Self {
        Self
    }

    /// Extraction from an already loaded document
    pub fn extract_document(&self, ctx: &RunContext, document: &Document) -> Result<Extraction> {
        let profile = &ctx.profile;
        let locator = PageLocator::new(profile, &ctx.populations)?;
        let extractor = RecordExtractor::new(profile);

        let sections = locator.locate(document);
        let mut populations: Vec<PopulationLines> = Vec::new();
        let mut rows_extracted = 0;

        for section in &sections {
            if !ctx.populations.is_declared(&profile.id, &section.population) {
                return Err(MinerError::UnknownPopulation {
                    institute: profile.id.clone(),
                    population: section.population.clone(),
                });
            }
            let rows = extractor.extract_section(document, section);
            rows_extracted += rows.len();
            let lines = rows.iter().map(|row| extractor.to_poll_line(row, &section.population));

            match populations.iter_mut().find(|p| p.population == section.population) {
                Some(existing) => {
                    existing.sections.push(section.section_id.clone());
                    existing.lines.extend(lines);
                }
                None => populations.push(PopulationLines {
                    population: section.population.clone(),
                    sections: vec![section.section_id.clone()],
                    lines: lines.collect(),
                }),
            }
        }
        MiningMetrics::record_rows_extracted(rows_extracted);

        for population in &populations {
            info!(
                "🔎 {}: {} lines from sections {}",
                population.population,
                population.lines.len(),
                population.sections.join(", ")
            );
        }

        Ok(Extraction {
            sections,
            populations,
            rows_extracted,
            methodology_sample_size: methodology_sample_size(document, profile.methodology_pages, profile.row_tolerance),
        })
    }
}

impl ExtractStep for DocumentExtract {
    fn extract(&self, ctx: &RunContext) -> Result<Extraction> {
        let document = Document::load(&ctx.document)?;
        self.extract_document(ctx, &document)
    }
}

/// Anomaly detection and table writing, one population at a time
#[derive(Debug, Default)]
pub struct TableBuild;

impl TableBuild {
    pub fn new() -> Self {
        Self
    }
}

impl BuildStep for TableBuild {
    fn build(
        &self,
        ctx: &RunContext,
        candidates: &CandidateRegistry,
        extraction: &Extraction,
    ) -> Result<Vec<PopulationOutput>> {
        let builder = TableBuilder::new(ctx, candidates);
        let mut outputs = Vec::new();

        for population in &extraction.populations {
            if let Some(only) = &ctx.population_filter {
                if &population.population != only {
                    continue;
                }
            }
            let span = info_span!("population", code = %population.population);
            let _guard = span.enter();

            let output = builder.build(&population.population, &population.lines)?;
            if output.anomalies > 0 {
                warn!(
                    "{} anomalies for {} ({} removed)",
                    output.anomalies, output.population, output.auto_removed
                );
            }
            outputs.push(output);
        }
        Ok(outputs)
    }
}

/// Extract and Build operations of one institute
pub struct InstituteSteps {
    pub extract: Box<dyn ExtractStep>,
    pub build: Box<dyn BuildStep>,
}

/// Registry of step implementations by institute id
pub struct StepRegistry {
    steps: HashMap<String, InstituteSteps>,
}

impl StepRegistry {
    /// Registry with the built-in institutes
    pub fn new() -> Self {
        let mut registry = Self { steps: HashMap::new() };
        for institute in [ELABE, CLUSTER17, IPSOS] {
            registry.register(institute, Box::new(DocumentExtract::new()), Box::new(TableBuild::new()));
        }
        registry
    }

    pub fn register(&mut self, institute: &str, extract: Box<dyn ExtractStep>, build: Box<dyn BuildStep>) {
        self.steps.insert(institute.to_string(), InstituteSteps { extract, build });
    }

    pub fn get(&self, institute: &str) -> Option<&InstituteSteps> {
        self.steps.get(institute)
    }

    pub fn list_institutes(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.steps.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}
