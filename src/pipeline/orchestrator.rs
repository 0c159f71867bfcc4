//! Fixed run sequence: validate inputs, validate metadata, clean previous
//! outputs, extract, build. Extract and Build are injected.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, instrument, warn};

use crate::config::RunContext;
use crate::constants::is_previous_output;
use crate::error::{MinerError, Result};
use crate::metrics::MiningMetrics;
use crate::pipeline::metadata::{validate_poll_id, MetadataDescriptor, SurveyInfo};
use crate::pipeline::processing::builder::PopulationOutput;
use crate::pipeline::steps::{BuildStep, ExtractStep, InstituteSteps};
use crate::registry::CandidateRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Init,
    InputsValidated,
    MetadataValidated,
    Cleaned,
    Extracted,
    Built,
    Done,
    Failed,
}

/// Content hash of one written file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFingerprint {
    pub path: PathBuf,
    pub sha256: String,
}

/// What a successful run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub poll_id: String,
    pub institute: String,
    /// Tables and reports written
    pub files_written: usize,
    pub sections_located: usize,
    pub rows_extracted: usize,
    pub populations: Vec<PopulationOutput>,
    pub files: Vec<FileFingerprint>,
    pub survey: SurveyInfo,
    pub methodology_sample_size: Option<u32>,
    pub removed_previous_outputs: usize,
    pub warnings: Vec<String>,
    pub states: Vec<RunState>,
}

impl RunSummary {
    pub fn anomalies(&self) -> usize {
        self.populations.iter().map(|p| p.anomalies).sum()
    }

    pub fn auto_removed(&self) -> usize {
        self.populations.iter().map(|p| p.auto_removed).sum()
    }
}

pub struct Orchestrator<'a> {
    extract: &'a dyn ExtractStep,
    build: &'a dyn BuildStep,
    state: RunState,
    trace: Vec<RunState>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(extract: &'a dyn ExtractStep, build: &'a dyn BuildStep) -> Self {
        Self { extract, build, state: RunState::Init, trace: vec![RunState::Init] }
    }

    pub fn for_institute(steps: &'a InstituteSteps) -> Self {
        Self::new(steps.extract.as_ref(), steps.build.as_ref())
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn trace(&self) -> &[RunState] {
        &self.trace
    }

    fn transition(&mut self, next: RunState) {
        debug!("{:?} -> {:?}", self.state, next);
        self.state = next;
        self.trace.push(next);
    }

    /// Run the whole sequence. Any error leaves the orchestrator in `Failed`.
    #[instrument(skip_all, fields(poll_id = %ctx.poll_id, institute = %ctx.profile.id))]
    pub fn run(&mut self, ctx: &RunContext, candidates: &CandidateRegistry) -> Result<RunSummary> {
        self.state = RunState::Init;
        self.trace = vec![RunState::Init];
        let started = Instant::now();

        match self.run_steps(ctx, candidates) {
            Ok(summary) => {
                MiningMetrics::record_files_written(summary.files_written);
                MiningMetrics::record_run_success(started.elapsed().as_secs_f64());
                Ok(summary)
            }
            Err(e) => {
                error!("❌ Run failed in state {:?}: {}", self.state, e);
                self.transition(RunState::Failed);
                MiningMetrics::record_run_failure();
                Err(e)
            }
        }
    }

    fn run_steps(&mut self, ctx: &RunContext, candidates: &CandidateRegistry) -> Result<RunSummary> {
        let mut warnings = Vec::new();

        if !ctx.document.is_file() {
            return Err(MinerError::DocumentNotFound(ctx.document.clone()));
        }
        validate_poll_id(&ctx.poll_id, ctx.institute())?;
        if let Some(population) = &ctx.population_filter {
            if !ctx.populations.is_declared(ctx.institute(), population) {
                return Err(MinerError::UnknownPopulation {
                    institute: ctx.institute().to_string(),
                    population: population.clone(),
                });
            }
        }
        self.transition(RunState::InputsValidated);

        let descriptor = MetadataDescriptor::read(&ctx.metadata_path())?;
        let survey = descriptor.validate(&ctx.profile.required_metadata)?;
        self.transition(RunState::MetadataValidated);

        fs::create_dir_all(&ctx.output_dir)?;
        let removed_previous_outputs =
            clean_previous_outputs(&ctx.output_dir, &ctx.poll_id, ctx.population_filter.as_deref(), &mut warnings);
        self.transition(RunState::Cleaned);

        let extraction = self.extract.extract(ctx)?;
        if extraction.is_empty() {
            let message = format!("No data sections found in {}", ctx.document.display());
            warn!("{}", message);
            warnings.push(message);
        }
        if let (Some(declared), Some(printed)) = (survey.sample_size, extraction.methodology_sample_size) {
            if declared != printed {
                let message = format!("Metadata sample size {} differs from methodology notice {}", declared, printed);
                warn!("{}", message);
                warnings.push(message);
            }
        }
        if let Some(population) = &ctx.population_filter {
            if extraction.lines_for(population).is_none() {
                let message = format!("Population {} was not found in the document", population);
                warn!("{}", message);
                warnings.push(message);
            }
        }
        self.transition(RunState::Extracted);

        let populations = self.build.build(ctx, candidates, &extraction)?;
        self.transition(RunState::Built);

        let mut files = Vec::new();
        for output in &populations {
            files.push(fingerprint(&output.table_path)?);
            if let Some(report) = &output.report_path {
                files.push(fingerprint(report)?);
            }
        }
        self.transition(RunState::Done);

        info!("✅ {}: {} files written for {} populations", ctx.poll_id, files.len(), populations.len());
        Ok(RunSummary {
            poll_id: ctx.poll_id.clone(),
            institute: ctx.institute().to_string(),
            files_written: files.len(),
            sections_located: extraction.sections.len(),
            rows_extracted: extraction.rows_extracted,
            populations,
            files,
            survey,
            methodology_sample_size: extraction.methodology_sample_size,
            removed_previous_outputs,
            warnings,
            states: self.trace.clone(),
        })
    }
}

/// Delete tables and reports of a previous run, or only those of `population`
/// when the run is filtered. Failures become warnings.
pub fn clean_previous_outputs(
    dir: &Path,
    poll_id: &str,
    population: Option<&str>,
    warnings: &mut Vec<String>,
) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            let message = format!("Cannot list {} for cleanup: {}", dir.display(), e);
            warn!("{}", message);
            warnings.push(message);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_previous = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|name| is_previous_output(name, poll_id, population))
            .unwrap_or(false);
        if !is_previous || !path.is_file() {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("🧹 Removed {}", path.display());
                removed += 1;
            }
            Err(e) => {
                let message = format!("Could not remove {}: {}", path.display(), e);
                warn!("{}", message);
                warnings.push(message);
            }
        }
    }
    removed
}

fn fingerprint(path: &Path) -> Result<FileFingerprint> {
    let bytes = fs::read(path)?;
    Ok(FileFingerprint { path: path.to_path_buf(), sha256: hex::encode(Sha256::digest(&bytes)) })
}
