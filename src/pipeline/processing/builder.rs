//! Output table assembly: validation verdicts in, one CSV per population out.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::RunContext;
use crate::constants::output_table_name;
use crate::error::Result;
use crate::pipeline::processing::anomaly::report::AnomalyReport;
use crate::pipeline::processing::anomaly::{Anomaly, AnomalyDetector, DetectorConfig, LineValidator};
use crate::registry::CandidateRegistry;
use crate::types::{format_score, OutputRecord, PollLine};

/// Kept rows and recorded anomalies for one (poll, population) run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledTable {
    pub population: String,
    pub records: Vec<OutputRecord>,
    pub anomalies: Vec<Anomaly>,
    /// Lines handed to validation
    pub lines_in: usize,
}

impl AssembledTable {
    pub fn removed(&self) -> usize {
        self.anomalies.iter().filter(|a| a.auto_removed).count()
    }
}

/// Files produced for one population
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationOutput {
    pub population: String,
    pub table_path: PathBuf,
    pub report_path: Option<PathBuf>,
    pub lines_in: usize,
    pub lines_written: usize,
    pub anomalies: usize,
    pub auto_removed: usize,
}

pub struct TableBuilder<'a> {
    ctx: &'a RunContext,
    registry: &'a CandidateRegistry,
}

impl<'a> TableBuilder<'a> {
    pub fn new(ctx: &'a RunContext, registry: &'a CandidateRegistry) -> Self {
        Self { ctx, registry }
    }

    /// Validate every line with a fresh detector and keep the survivors in
    /// document order
    pub fn assemble(&self, population: &str, lines: &[PollLine]) -> AssembledTable {
        let mut detector = AnomalyDetector::with_config(self.registry, population, DetectorConfig::from(self.ctx));
        let profile = &self.ctx.profile;

        let mut records = Vec::with_capacity(lines.len());
        for line in lines {
            let assessment = detector.check(line);
            if !assessment.keep {
                debug!("Dropping {} ({})", line.candidate_name, line.source_location);
                continue;
            }
            let mut scores: Vec<Option<f64>> = line.scores.iter().copied().map(Some).collect();
            scores.resize(profile.output_slots.max(scores.len()), None);
            records.push(OutputRecord {
                candidate_identifier: assessment.candidate_identifier,
                candidate_name: line.candidate_name.clone(),
                scores,
                poll_type_code: profile.poll_type_code.clone(),
                population: population.to_string(),
            });
        }

        AssembledTable {
            population: population.to_string(),
            records,
            anomalies: detector.into_anomalies(),
            lines_in: lines.len(),
        }
    }

    /// Column names of the institute's output schema
    pub fn header(&self) -> Vec<String> {
        let profile = &self.ctx.profile;
        let mut header = Vec::new();
        if profile.include_name_column {
            header.push("candidate_name".to_string());
        }
        header.push("candidate_id".to_string());
        header.extend((1..=profile.output_slots).map(|i| format!("intention_mention_{}", i)));
        if profile.poll_type_code.is_some() {
            header.push("poll_type_id".to_string());
        }
        header.push("population".to_string());
        header
    }

    fn row(&self, record: &OutputRecord) -> Vec<String> {
        let profile = &self.ctx.profile;
        let mut row = Vec::new();
        if profile.include_name_column {
            row.push(record.candidate_name.clone());
        }
        row.push(record.candidate_identifier.clone().unwrap_or_default());
        row.extend(record.scores.iter().map(|s| s.map(format_score).unwrap_or_default()));
        if let Some(code) = &record.poll_type_code {
            row.push(code.clone());
        }
        row.push(record.population.clone());
        row
    }

    pub fn write_table(&self, table: &AssembledTable) -> Result<PathBuf> {
        let path = self.ctx.output_dir.join(output_table_name(&self.ctx.poll_id, &table.population));
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(self.header())?;
        for record in &table.records {
            writer.write_record(self.row(record))?;
        }
        writer.flush()?;
        info!("💾 Wrote {} rows to {}", table.records.len(), path.display());
        Ok(path)
    }

    /// Write the anomaly report when there is anything to report
    pub fn write_report(&self, table: &AssembledTable) -> Result<Option<PathBuf>> {
        if table.anomalies.is_empty() {
            return Ok(None);
        }
        let report = AnomalyReport {
            poll_id: &self.ctx.poll_id,
            population: &table.population,
            population_label: self.ctx.populations.label_of(&table.population),
            anomalies: &table.anomalies,
        };
        report.write(&self.ctx.output_dir).map(Some)
    }

    /// Assemble, then write the table and its report
    pub fn build(&self, population: &str, lines: &[PollLine]) -> Result<PopulationOutput> {
        let table = self.assemble(population, lines);
        let table_path = self.write_table(&table)?;
        let report_path = self.write_report(&table)?;
        Ok(PopulationOutput {
            population: table.population.clone(),
            table_path,
            report_path,
            lines_in: table.lines_in,
            lines_written: table.records.len(),
            anomalies: table.anomalies.len(),
            auto_removed: table.removed(),
        })
    }
}
