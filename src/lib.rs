pub mod config;
pub mod constants;
pub mod document;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod text;
pub mod types;
