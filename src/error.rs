use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MinerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Source document not found: {}", .0.display())]
    DocumentNotFound(PathBuf),

    #[error("Malformed poll identifier '{id}': {reason}")]
    InvalidPollId { id: String, reason: String },

    #[error("Metadata descriptor required but missing: {}", .0.display())]
    MetadataMissing(PathBuf),

    #[error("Invalid metadata descriptor {}: {message}", .path.display())]
    MetadataInvalid { path: PathBuf, message: String },

    #[error("Unknown institute: {0}")]
    UnknownInstitute(String),

    #[error("Population '{population}' is not declared for institute {institute}")]
    UnknownPopulation { institute: String, population: String },

    #[error("Unrecognized document layout: {0}")]
    Layout(String),

    #[error("Candidate registry error: {0}")]
    Registry(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MinerError>;
