use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes the logging system with both console and file output.
pub fn init_logging() {
    // Ensure logs directory exists
    let _ = fs::create_dir_all("logs");

    // Create a non-blocking file appender for daily log rotation
    let file_appender = tracing_appender::rolling::daily("logs", "poll_miner.log");
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Create a JSON layer for file logging
    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    // Create a formatted layer for console logging
    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stdout);

    // RUST_LOG wins; otherwise LOG_LEVEL (possibly from .env) picks our crate's level
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(std::env::var("LOG_LEVEL").ok())));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    // We need to keep the guard in scope to ensure logs are flushed on exit
    std::mem::forget(_guard);
}

/// Map a LOG_LEVEL value onto a filter directive for this crate.
fn default_directive(level: Option<String>) -> String {
    let level = match level.as_deref().map(|l| l.trim().to_ascii_lowercase()) {
        Some(l) if l == "critical" => "error".to_string(),
        Some(l) if l == "warning" => "warn".to_string(),
        Some(l) if ["trace", "debug", "info", "warn", "error"].contains(&l.as_str()) => l,
        _ => "info".to_string(),
    };
    format!("poll_miner={},warn", level)
}
