use std::fs;
use std::path::{Path, PathBuf};

use poll_miner::config::RunContext;
use poll_miner::document::{layout, Document, Page};
use poll_miner::error::MinerError;
use poll_miner::pipeline::{Orchestrator, RunState, StepRegistry};
use poll_miner::registry::{CandidateRegistry, InstituteTable, PopulationTable};
use poll_miner::types::TextElement;
use tempfile::tempdir;

const FIRST_NAMES: [&str; 5] = ["Anne", "Paul", "Claire", "Louis", "Julie"];
const LAST_NAMES: [&str; 4] = ["Dupont", "Martin", "Petit", "Bernard"];
const METADATA: &str = "survey_start_date: 2025-11-04\nsurvey_end_date: 2025-11-05\nsample_size: 1 000\n";

fn names() -> Vec<String> {
    FIRST_NAMES
        .iter()
        .flat_map(|first| LAST_NAMES.iter().map(move |last| format!("{} {}", first, last)))
        .collect()
}

/// Registry holding every generated name except the last one
fn write_candidates(dir: &Path) -> PathBuf {
    let mut csv = String::from("candidate_id,name,surname,parti\n");
    for (index, name) in names().iter().enumerate().take(19) {
        let (first, last) = name.split_once(' ').unwrap();
        csv.push_str(&format!("C{:02},{},{},\n", index, first, last));
    }
    let path = dir.join("candidates.csv");
    fs::write(&path, csv).unwrap();
    path
}

fn elabe_page(number: u32, population: &str, overrides: &[(usize, Vec<&str>)]) -> Page {
    let mut elements = vec![
        TextElement::new(40.0, 800.0, "Le classement des personnalités"),
        TextElement::new(40.0, 780.0, population),
    ];
    for (index, name) in names().iter().enumerate() {
        let y = 740.0 - 15.0 * index as f64;
        elements.push(TextElement::new(40.0, y, name.as_str()));
        let scores = overrides
            .iter()
            .find(|(row, _)| *row == index)
            .map(|(_, scores)| scores.clone())
            .unwrap_or_else(|| vec!["30", "30", "20", "10", "10"]);
        for (column, score) in scores.iter().enumerate() {
            elements.push(TextElement::new(300.0 + 40.0 * column as f64, y, *score));
        }
    }
    Page { number, elements }
}

fn write_elabe_document(dir: &Path) -> PathBuf {
    let document = Document {
        pages: vec![
            Page {
                number: 2,
                elements: vec![TextElement::new(40.0, 700.0, "Échantillon de 1 000 personnes représentatif")],
            },
            elabe_page(
                4,
                "Ensemble des Français",
                &[
                    (1, vec!["30", "30", "20", "10", "8"]),
                    (2, vec!["30", "30", "30", "10", "10"]),
                    (3, vec!["21", "16", "15", "8", "38", "2"]),
                ],
            ),
            elabe_page(5, "Sympathisants de gauche", &[]),
        ],
        ..Default::default()
    };
    let path = dir.join("elabe_202511.json");
    layout::write_layout(&document, &path).unwrap();
    path
}

fn context(institute: &str, poll_id: &str, document: PathBuf) -> RunContext {
    let profile = InstituteTable::builtin().unwrap().get(institute).unwrap().clone();
    RunContext::new(profile, PopulationTable::builtin().unwrap(), poll_id, document)
}

fn run(ctx: &RunContext, candidates: &Path) -> poll_miner::error::Result<poll_miner::pipeline::RunSummary> {
    let registry = CandidateRegistry::load(candidates).unwrap();
    let steps = StepRegistry::new();
    let mut orchestrator = Orchestrator::for_institute(steps.get(ctx.institute()).unwrap());
    orchestrator.run(ctx, &registry)
}

fn csv_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("elabe_202511_") && name.ends_with(".csv"))
        .collect();
    files.sort();
    files
}

#[test]
fn test_elabe_run_writes_tables_and_reports() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("metadata.txt"), METADATA).unwrap();
    let candidates = write_candidates(dir.path());
    let ctx = context("elabe", "elabe_202511", write_elabe_document(dir.path()));

    let summary = run(&ctx, &candidates).unwrap();

    assert_eq!(summary.sections_located, 2);
    assert_eq!(summary.files_written, 4);
    assert_eq!(summary.methodology_sample_size, Some(1000));
    assert!(summary.warnings.is_empty());
    assert_eq!(summary.states.last(), Some(&RunState::Done));
    assert_eq!(csv_files(dir.path()), vec!["elabe_202511_all.csv", "elabe_202511_left.csv"]);

    let all = &summary.populations[0];
    assert_eq!(all.population, "all");
    assert_eq!(all.lines_in, 20);
    assert_eq!(all.lines_written, 18);
    assert_eq!(all.anomalies, 4);
    assert_eq!(all.auto_removed, 2);

    let table = fs::read_to_string(dir.path().join("elabe_202511_all.csv")).unwrap();
    let rows: Vec<&str> = table.lines().collect();
    assert_eq!(rows.len(), 19);
    assert_eq!(rows[1], "C00,30,30,20,10,10,,,pt2,all");
    assert_eq!(rows[2], "C01,30,30,20,10,8,,,pt2,all");
    assert_eq!(rows[3], "C04,30,30,20,10,10,,,pt2,all");
    assert_eq!(rows[18], ",30,30,20,10,10,,,pt2,all");

    let report = fs::read_to_string(dir.path().join("mining_anomalie_all.txt")).unwrap();
    assert!(report.contains("Candidate: Julie Bernard"));
    assert!(report.contains("Difference: -2"));
    assert!(report.contains("Difference: +10"));
    assert!(report.contains("Scores: [21, 16, 15, 8, 38, 2]"));
    assert!(report.contains("2 line(s) marked AUTOMATIC ACTION"));

    let left = fs::read_to_string(dir.path().join("mining_anomalie_left.txt")).unwrap();
    assert!(left.contains("ANOMALY #1"));
    assert!(!left.contains("ANOMALY #2"));
}

#[test]
fn test_rerun_is_byte_identical_and_removes_stale_outputs() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("metadata.txt"), METADATA).unwrap();
    let candidates = write_candidates(dir.path());
    let ctx = context("elabe", "elabe_202511", write_elabe_document(dir.path()));

    let first = run(&ctx, &candidates).unwrap();
    let first_table = fs::read(dir.path().join("elabe_202511_all.csv")).unwrap();
    fs::write(dir.path().join("elabe_202511_farright.csv"), "stale").unwrap();

    let second = run(&ctx, &candidates).unwrap();
    assert_eq!(first.files, second.files);
    assert_eq!(fs::read(dir.path().join("elabe_202511_all.csv")).unwrap(), first_table);
    assert!(!dir.path().join("elabe_202511_farright.csv").exists());
    assert_eq!(second.removed_previous_outputs, 5);
    assert!(dir.path().join("metadata.txt").exists());
    assert!(dir.path().join("candidates.csv").exists());
}

#[test]
fn test_missing_metadata_aborts_without_output() {
    let dir = tempdir().unwrap();
    let candidates = write_candidates(dir.path());
    let ctx = context("elabe", "elabe_202511", write_elabe_document(dir.path()));

    let err = run(&ctx, &candidates).unwrap_err();
    assert!(matches!(err, MinerError::MetadataMissing(_)));
    assert!(csv_files(dir.path()).is_empty());
}

#[test]
fn test_missing_document_is_fatal() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("metadata.txt"), METADATA).unwrap();
    let candidates = write_candidates(dir.path());
    let ctx = context("elabe", "elabe_202511", dir.path().join("absent.pdf"));
    assert!(matches!(run(&ctx, &candidates), Err(MinerError::DocumentNotFound(_))));
}

#[test]
fn test_population_filter_and_separate_output_dir() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out");
    fs::write(dir.path().join("metadata.txt"), METADATA).unwrap();
    let candidates = write_candidates(dir.path());
    let ctx = context("elabe", "elabe_202511", write_elabe_document(dir.path()))
        .with_output_dir(&out)
        .with_population_filter(Some("left".to_string()));

    let summary = run(&ctx, &candidates).unwrap();
    assert_eq!(summary.populations.len(), 1);
    assert_eq!(csv_files(&out), vec!["elabe_202511_left.csv"]);
    assert!(csv_files(dir.path()).is_empty());
}

#[test]
fn test_filtered_rerun_keeps_other_population_outputs() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("metadata.txt"), METADATA).unwrap();
    let candidates = write_candidates(dir.path());
    let document = write_elabe_document(dir.path());

    run(&context("elabe", "elabe_202511", document.clone()), &candidates).unwrap();
    let all_table = fs::read_to_string(dir.path().join("elabe_202511_all.csv")).unwrap();
    let all_report = fs::read_to_string(dir.path().join("mining_anomalie_all.txt")).unwrap();

    let filtered = context("elabe", "elabe_202511", document).with_population_filter(Some("left".to_string()));
    let summary = run(&filtered, &candidates).unwrap();

    assert_eq!(summary.removed_previous_outputs, 2);
    assert_eq!(csv_files(dir.path()), vec!["elabe_202511_all.csv", "elabe_202511_left.csv"]);
    assert_eq!(fs::read_to_string(dir.path().join("elabe_202511_all.csv")).unwrap(), all_table);
    assert_eq!(fs::read_to_string(dir.path().join("mining_anomalie_all.txt")).unwrap(), all_report);
    assert!(dir.path().join("mining_anomalie_left.txt").exists());
}

#[test]
fn test_undeclared_population_filter_is_rejected() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("metadata.txt"), METADATA).unwrap();
    let candidates = write_candidates(dir.path());
    let ctx = context("elabe", "elabe_202511", write_elabe_document(dir.path()))
        .with_population_filter(Some("lfi".to_string()));
    assert!(matches!(run(&ctx, &candidates), Err(MinerError::UnknownPopulation { .. })));
}

#[test]
fn test_document_without_data_pages_succeeds_with_zero_files() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("metadata.txt"), METADATA).unwrap();
    let candidates = write_candidates(dir.path());
    let document = Document {
        pages: vec![Page { number: 1, elements: vec![TextElement::new(40.0, 700.0, "Sommaire")] }],
        ..Default::default()
    };
    let path = dir.path().join("cover.json");
    layout::write_layout(&document, &path).unwrap();

    let summary = run(&context("elabe", "elabe_202511", path), &candidates).unwrap();
    assert_eq!(summary.files_written, 0);
    assert_eq!(summary.warnings.len(), 1);
}

#[test]
fn test_cluster17_captioned_tables() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("metadata.txt"), METADATA).unwrap();
    let candidates = write_candidates(dir.path());

    let mut elements = vec![
        TextElement::new(40.0, 800.0, "BAROMÈTRE DES PERSONNALITÉS NOVEMBRE"),
        TextElement::new(300.0, 780.0, "Vous la soutenez"),
        TextElement::new(380.0, 780.0, "Vous l\u{2019}appréciez"),
        TextElement::new(40.0, 760.0, "Électeurs LFI aux Européennes 2024"),
        TextElement::new(40.0, 680.0, "Électeurs RN aux Européennes 2024"),
    ];
    let rows = [
        (740.0, "Anne Dupont", ["25", "25", "25", "25"]),
        (725.0, "Paul Martin", ["10", "20", "30", "40"]),
        (710.0, "Julie Bernard", ["40", "30", "20", "10"]),
        (660.0, "Anne Dupont", ["25", "25", "25", "20"]),
        (645.0, "Paul Martin", ["10", "20", "30", "38"]),
        (630.0, "Claire Petit", ["5", "15", "30", "50"]),
    ];
    for (y, name, scores) in rows {
        elements.push(TextElement::new(40.0, y, name));
        for (column, score) in scores.iter().enumerate() {
            elements.push(TextElement::new(300.0 + 40.0 * column as f64, y, *score));
        }
    }
    let document = Document { pages: vec![Page { number: 6, elements }], ..Default::default() };
    let path = dir.path().join("cluster17.json");
    layout::write_layout(&document, &path).unwrap();

    let summary = run(&context("cluster17", "cluster17_202511", path), &candidates).unwrap();
    let codes: Vec<&str> = summary.populations.iter().map(|p| p.population.as_str()).collect();
    assert_eq!(codes, vec!["lfi", "rn"]);

    let lfi = fs::read_to_string(dir.path().join("cluster17_202511_lfi.csv")).unwrap();
    let lines: Vec<&str> = lfi.lines().collect();
    assert_eq!(
        lines[0],
        "candidate_name,candidate_id,intention_mention_1,intention_mention_2,intention_mention_3,intention_mention_4,poll_type_id,population"
    );
    assert_eq!(lines[1], "Anne Dupont,C00,25,25,25,25,pt4,lfi");
    assert_eq!(lines[3], "Julie Bernard,,40,30,20,10,pt4,lfi");

    let rn = fs::read_to_string(dir.path().join("cluster17_202511_rn.csv")).unwrap();
    assert_eq!(rn.lines().count(), 3);
    assert!(!rn.contains("Anne Dupont"));
    assert!(rn.contains("Paul Martin,C05,10,20,30,38,pt4,rn"));

    let report = fs::read_to_string(dir.path().join("mining_anomalie_rn.txt")).unwrap();
    assert!(report.contains("ANOMALY #1"));
    assert!(report.contains("ANOMALY #2"));
    assert!(report.contains("Population: Électeurs RN aux Européennes 2024 (rn)"));
}
