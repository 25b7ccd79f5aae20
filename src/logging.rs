//! Logging for evsolar
//!
//! Plain human-readable lines on stdout, optionally mirrored to a daily
//! rotated file. Components log through [`StructuredLogger`], which tags
//! each line with the component name.

mod level;
mod structured;

pub use level::parse_log_level;
pub use structured::{LogContext, StructuredLogger, get_logger, get_logger_with_context};

use crate::config::LoggingConfig;
use crate::error::{EvSolarError, Result};
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Once;
use tracing::{Level, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// Keep the non-blocking worker guard alive for the entire process lifetime
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static INIT_ONCE: Once = Once::new();
static INIT_ERROR: OnceCell<String> = OnceCell::new();

/// Initialize logging system based on configuration
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    INIT_ONCE.call_once(|| {
        if let Err(e) = try_init(config) {
            let _ = INIT_ERROR.set(e.to_string());
        }
    });

    if let Some(err) = INIT_ERROR.get() {
        return Err(EvSolarError::config(err.clone()));
    }
    Ok(())
}

fn try_init(config: &LoggingConfig) -> Result<()> {
    let level = parse_log_level(&config.level)?;
    let filter = build_env_filter(level);

    let file_layer = match config.file.as_deref() {
        Some(file) if !file.trim().is_empty() => {
            let appender = rolling::Builder::new()
                .rotation(rolling::Rotation::DAILY)
                .filename_prefix(file_prefix(file))
                .filename_suffix("log")
                .max_log_files(config.backup_count.max(1) as usize)
                .build(log_dir(file))
                .map_err(|e| {
                    EvSolarError::io(format!("Failed to create log file appender: {}", e))
                })?;
            let (writer, guard) = non_blocking(appender);
            let _ = LOG_GUARD.set(guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false)
                    .with_filter(LevelFilter::from_level(level))
                    .boxed(),
            )
        }
        _ => None,
    };

    let console_layer = config.console_output.then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(false)
            .with_thread_ids(false)
            .with_filter(LevelFilter::from_level(level))
            .boxed()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| EvSolarError::config(format!("Failed to install logger: {}", e)))?;

    info!(
        "Logging initialized - level: {:?}, file: {}",
        level,
        config.file.as_deref().unwrap_or("none")
    );
    Ok(())
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("evsolar={},reqwest=warn,hyper=warn", level).into())
}

/// Directory part of the configured log path; a bare directory is used as-is
fn log_dir(file: &str) -> &Path {
    let p = Path::new(file);
    if p.extension().is_some() {
        p.parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
    } else {
        p
    }
}

fn file_prefix(file: &str) -> String {
    let p = Path::new(file);
    if p.extension().is_some() {
        p.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "evsolar".to_string())
    } else {
        "evsolar".to_string()
    }
}
