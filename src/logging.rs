use crate::error::{EtlError, Result};
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Daily-rotated `etl.<date>.log` appender under `log_dir`, creating the directory.
pub fn file_appender(log_dir: &Path) -> Result<RollingFileAppender> {
    fs::create_dir_all(log_dir).map_err(|e| {
        EtlError::Configuration(format!(
            "cannot create log directory '{}': {}",
            log_dir.display(),
            e
        ))
    })?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("etl")
        .filename_suffix("log")
        .build(log_dir)
        .map_err(|e| {
            EtlError::Configuration(format!(
                "cannot open log file in '{}': {}",
                log_dir.display(),
                e
            ))
        })
}

/// Initializes logging with console output and a JSON progress log under `log_dir`.
///
/// The returned guard flushes the file log when dropped, so the caller keeps it
/// alive for the whole run.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender(log_dir)?);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    // Respect RUST_LOG if set
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("largest_banks=info,warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| EtlError::Configuration(format!("logging already initialized: {}", e)))?;

    Ok(guard)
}
