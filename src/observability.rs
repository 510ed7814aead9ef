//! Shared logging configuration and initialization.

use std::env;
use std::path::Path;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::pipeline::PipelineReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub const ENV_LOG_LEVEL: &str = "FLIGHTPREP_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "FLIGHTPREP_LOG_FORMAT";
pub const ENV_LOG_TARGET: &str = "FLIGHTPREP_LOG_TARGET";

pub fn logging_config_from_env() -> LoggingConfig {
    logging_config_from_lookup(|key| env::var(key).ok())
}

/// Builds the config from any key lookup. Unset, blank or unparseable
/// values keep their defaults.
pub fn logging_config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LoggingConfig {
    let defaults = LoggingConfig::default();
    let value = |key: &str| {
        lookup(key)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
    };

    LoggingConfig {
        level: value(ENV_LOG_LEVEL).unwrap_or(defaults.level),
        format: value(ENV_LOG_FORMAT)
            .and_then(|raw| parse_log_format(&raw))
            .unwrap_or(defaults.format),
        include_target: value(ENV_LOG_TARGET)
            .and_then(|raw| parse_bool(&raw))
            .unwrap_or(defaults.include_target),
    }
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(matches!(config.format, LogFormat::Pretty));

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_app_start(config: &LoggingConfig) {
    info!(
        component = "prepare_dataset",
        event = "app.start",
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
    );
}

pub fn log_run_paths(input_dir: &Path, output_dir: &Path, config_path: Option<&Path>) {
    match config_path {
        Some(config_path) => info!(
            component = "prepare_dataset",
            event = "app.paths",
            input_dir = %input_dir.display(),
            output_dir = %output_dir.display(),
            config_path = %config_path.display()
        ),
        None => info!(
            component = "prepare_dataset",
            event = "app.paths",
            input_dir = %input_dir.display(),
            output_dir = %output_dir.display(),
            config_path = "default"
        ),
    }
}

pub fn log_run_finish(report: &PipelineReport, written_files: usize) {
    info!(
        component = "prepare_dataset",
        event = "app.finish",
        input_rows = report.quality.rows,
        dropped_rows = report.target.dropped_rows,
        drop_rate = report.target.drop_rate(),
        train_rows = report.train_rows,
        validation_rows = report.validation_rows,
        test_rows = report.test_rows,
        written_files
    );
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
