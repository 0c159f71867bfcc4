use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use poll_miner::config::{AppConfig, RunContext};
use poll_miner::document::{layout, Document};
use poll_miner::pipeline::processing::locator::PageLocator;
use poll_miner::pipeline::{Orchestrator, StepRegistry};
use poll_miner::registry::CandidateRegistry;
use poll_miner::{logging, metrics};

#[derive(Parser)]
#[command(name = "poll_miner")]
#[command(about = "Extracts and validates opinion-poll result tables from institute reports")]
#[command(version = "0.1.0")]
struct Cli {
    /// Application config file (defaults to poll_miner.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, validate and write the tables of one poll document
    Run {
        /// Institute id (elabe, cluster17, ipsos)
        #[arg(long)]
        institute: String,
        /// Poll identifier, e.g. elabe_202511
        #[arg(long)]
        poll_id: String,
        /// Source document (.pdf, .html or layout .json)
        #[arg(long)]
        document: PathBuf,
        /// Output directory (defaults to the document's directory)
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Only build this population
        #[arg(long)]
        population: Option<String>,
        /// Candidate registry CSV (overrides the config)
        #[arg(long)]
        candidates: Option<PathBuf>,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the data sections found in a document
    Detect {
        #[arg(long)]
        institute: String,
        #[arg(long)]
        document: PathBuf,
    },
    /// Dump the positioned text of a document
    Inspect {
        #[arg(long)]
        document: PathBuf,
        /// Only this page
        #[arg(long)]
        page: Option<u32>,
        /// Vertical tolerance for grouping text into lines
        #[arg(long, default_value_t = 3.0)]
        tolerance: f64,
        /// Save the document as layout JSON, usable as `run` input
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// List institute profiles and their populations
    Institutes,
}

fn main() {
    dotenv::dotenv().ok();
    logging::init_logging();
    metrics::register_all();
    let metrics_file = metrics::init_metrics();

    let outcome = run_cli(Cli::parse());
    if let Some(path) = metrics_file {
        if let Err(e) = metrics::write_snapshot(&path) {
            warn!("Could not write metrics snapshot to {}: {}", path.display(), e);
        }
    }
    if let Err(e) = outcome {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Run { institute, poll_id, document, output_dir, population, candidates, json } => {
            let institutes = config.institute_table()?;
            let profile = config.profile(&institutes, &institute)?;
            let mut ctx = RunContext::new(profile, config.population_table()?, poll_id, document)
                .with_population_filter(population);
            if let Some(dir) = output_dir {
                ctx = ctx.with_output_dir(dir);
            }

            let candidates_path = candidates.unwrap_or_else(|| config.candidates_path());
            let registry = CandidateRegistry::load(&candidates_path)
                .with_context(|| format!("Failed to load candidates from {}", candidates_path.display()))?;
            info!("📇 {} candidates loaded", registry.len());

            let steps = StepRegistry::new();
            let institute_steps = steps
                .get(&institute)
                .ok_or_else(|| anyhow!("No pipeline registered for institute {}", institute))?;
            let mut orchestrator = Orchestrator::for_institute(institute_steps);
            let summary = orchestrator.run(&ctx, &registry)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("\n📊 Run summary for {}:", summary.poll_id);
                println!("   Sections located: {}", summary.sections_located);
                println!("   Rows extracted: {}", summary.rows_extracted);
                for population in &summary.populations {
                    println!(
                        "   {}: {} of {} lines written, {} anomalies, {} removed",
                        population.population,
                        population.lines_written,
                        population.lines_in,
                        population.anomalies,
                        population.auto_removed
                    );
                }
                println!("   Files written: {}", summary.files_written);
                for file in &summary.files {
                    println!("   - {} ({})", file.path.display(), &file.sha256[..12]);
                }
                if !summary.warnings.is_empty() {
                    println!("\n⚠️  Warnings:");
                    for warning in &summary.warnings {
                        println!("   - {}", warning);
                    }
                }
            }
        }
        Commands::Detect { institute, document } => {
            let institutes = config.institute_table()?;
            let profile = config.profile(&institutes, &institute)?;
            let populations = config.population_table()?;
            let document = Document::load(&document)?;

            let sections = PageLocator::new(&profile, &populations)?.locate(&document);
            if sections.is_empty() {
                warn!("No data sections found");
            }
            println!("🔎 {} sections found:", sections.len());
            for section in &sections {
                println!(
                    "   {:<8} page {:>3}  {:<14} {}",
                    section.section_id,
                    section.page,
                    section.population,
                    section.caption.as_deref().unwrap_or("")
                );
            }
        }
        Commands::Inspect { document, page, tolerance, save } => {
            let loaded = Document::load(&document)?;
            print_document(&loaded, page, tolerance);
            if let Some(target) = save {
                write_layout_file(&loaded, &target)?;
            }
        }
        Commands::Institutes => {
            let institutes = config.institute_table()?;
            let populations = config.population_table()?;
            for profile in institutes.iter() {
                println!(
                    "{} ({}): {:?} layout, {} scores, pages {}-{}",
                    profile.id,
                    profile.name,
                    profile.layout,
                    profile.scale_size,
                    profile.page_range.start,
                    profile.page_range.end
                );
                for population in populations.for_institute(&profile.id) {
                    println!("   {:<14} {}", population.code, population.label);
                }
            }
        }
    }
    Ok(())
}

fn print_document(document: &Document, only: Option<u32>, tolerance: f64) {
    for page in document.pages.iter().filter(|p| only.map_or(true, |n| p.number == n)) {
        println!("--- page {} ---", page.number);
        for line in page.lines(tolerance) {
            println!("{:>8.1}  {}", line.y, line.text());
        }
    }
    for series in &document.series {
        println!("{}: {}", series.label, series.values.join(" | "));
    }
}

fn write_layout_file(document: &Document, target: &Path) -> Result<()> {
    layout::write_layout(document, target)
        .with_context(|| format!("Failed to write layout to {}", target.display()))?;
    println!("💾 Layout saved to {}", target.display());
    Ok(())
}
