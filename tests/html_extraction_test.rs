use std::fs;

use poll_miner::config::RunContext;
use poll_miner::error::MinerError;
use poll_miner::pipeline::{Orchestrator, StepRegistry};
use poll_miner::registry::{CandidateRecord, CandidateRegistry, InstituteTable, PopulationTable};
use tempfile::tempdir;

const PAGE: &str = r##"<!DOCTYPE html>
<html><head><meta charset="utf-8"><title>Baromètre politique Ipsos BVA</title></head>
<body>
<h1>Quel jugement portez-vous sur l'action des personnalités suivantes ?</h1>
<script type="text/javascript">
var chart = {"type":"stacked","data":[
  {"label":"Anne Dupont","value":[12,20,18,35,10,5]},
  {"label":"Paul  Martin","value":["10","25","20","30","12","3"]},
  {"label":"Claire Petit","value":[10,10,10,10,10,10]},
  {"label":"Louis Bernard","value":[20,20,20,20,10,10,100]}
],"colors":["#aa0000","#00aa00"]};
</script>
</body></html>"##;

fn context(dir: &std::path::Path) -> RunContext {
    let profile = InstituteTable::builtin().unwrap().get("ipsos").unwrap().clone();
    RunContext::new(profile, PopulationTable::builtin().unwrap(), "ipsos_202511", dir.join("barometre.html"))
}

fn registry() -> CandidateRegistry {
    CandidateRegistry::from_records(
        [("AD", "Anne Dupont"), ("PM", "Paul Martin"), ("CP", "Claire Petit"), ("LB", "Louis Bernard")]
            .iter()
            .map(|(id, name)| CandidateRecord { identifier: id.to_string(), display_name: name.to_string(), party: None }),
    )
}

#[test]
fn test_ipsos_embedded_series_run() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("barometre.html"), PAGE).unwrap();
    fs::write(
        dir.path().join("metadata.txt"),
        "survey_start_date: 2025-11-06\nsurvey_end_date: 2025-11-07\nsample_size: 1000\n",
    )
    .unwrap();

    let ctx = context(dir.path());
    let steps = StepRegistry::new();
    let mut orchestrator = Orchestrator::for_institute(steps.get("ipsos").unwrap());
    let summary = orchestrator.run(&ctx, &registry()).unwrap();

    assert_eq!(summary.populations.len(), 1);
    let all = &summary.populations[0];
    assert_eq!(all.population, "all");
    assert_eq!(all.lines_in, 4);
    assert_eq!(all.lines_written, 3);
    assert_eq!(all.auto_removed, 1);

    let table = fs::read_to_string(dir.path().join("ipsos_202511_all.csv")).unwrap();
    let rows: Vec<&str> = table.lines().collect();
    assert_eq!(rows[1], "AD,12,20,18,35,10,5,,pt1,all");
    assert_eq!(rows[2], "PM,10,25,20,30,12,3,,pt1,all");
    assert_eq!(rows[3], "LB,20,20,20,20,10,10,,pt1,all");

    let report = fs::read_to_string(dir.path().join("mining_anomalie_all.txt")).unwrap();
    assert!(report.contains("Candidate: Claire Petit"));
    assert!(report.contains("40 points missing"));
}

#[test]
fn test_html_without_data_segment_fails_run() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("barometre.html"), "<html><body><h1>Rien</h1></body></html>").unwrap();
    fs::write(
        dir.path().join("metadata.txt"),
        "survey_start_date: 2025-11-06\nsurvey_end_date: 2025-11-07\nsample_size: 1000\n",
    )
    .unwrap();

    let ctx = context(dir.path());
    let steps = StepRegistry::new();
    let mut orchestrator = Orchestrator::for_institute(steps.get("ipsos").unwrap());
    let err = orchestrator.run(&ctx, &registry()).unwrap_err();
    assert!(matches!(err, MinerError::Layout(_)));
    assert!(!dir.path().join("ipsos_202511_all.csv").exists());
}
