// Mining pipeline: metadata checks, processing stages, injected steps and the run orchestrator

pub mod metadata;
pub mod orchestrator;
pub mod processing;
pub mod steps;

pub use orchestrator::{Orchestrator, RunState, RunSummary};
pub use steps::{BuildStep, DocumentExtract, ExtractStep, Extraction, StepRegistry, TableBuild};
