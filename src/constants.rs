/// Institute identifiers, file names and output naming shared across the crate

// Institute ids (used in CLI and as poll id prefixes)
pub const ELABE: &str = "elabe";
pub const CLUSTER17: &str = "cluster17";
pub const IPSOS: &str = "ipsos";

/// Sidecar descriptor expected next to every source document
pub const METADATA_FILE: &str = "metadata.txt";

/// Default location of the candidate registry
pub const CANDIDATES_FILE: &str = "candidates.csv";

/// Default application config file
pub const CONFIG_FILE: &str = "poll_miner.toml";

/// Prefix of per-population anomaly reports
pub const ANOMALY_REPORT_PREFIX: &str = "mining_anomalie_";

/// Total every valid score line must reach
pub const EXPECTED_TOTAL: f64 = 100.0;

/// Output table file name for one population of a poll
pub fn output_table_name(poll_id: &str, population: &str) -> String {
    format!("{}_{}.csv", poll_id, population)
}

/// Anomaly report file name for one population
pub fn anomaly_report_name(population: &str) -> String {
    format!("{}{}.txt", ANOMALY_REPORT_PREFIX, population)
}

/// Whether a file name is an output of a previous run for `poll_id`.
/// With a population, only that population's table and report match.
pub fn is_previous_output(file_name: &str, poll_id: &str, population: Option<&str>) -> bool {
    if let Some(population) = population {
        return file_name == output_table_name(poll_id, population) || file_name == anomaly_report_name(population);
    }
    let table_prefix = format!("{}_", poll_id);
    (file_name.starts_with(&table_prefix) && file_name.ends_with(".csv"))
        || (file_name.starts_with(ANOMALY_REPORT_PREFIX) && file_name.ends_with(".txt"))
}
