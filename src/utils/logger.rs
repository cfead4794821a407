//! Logging utilities

use crate::Result;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Registry,
};

/// Initialize logging: console plus a daily-rolling file, filtered by
/// `RUST_LOG` when set and `log_level` otherwise.
pub fn init<P: AsRef<Path>>(log_level: &str, log_file: P) -> Result<()> {
    // Create log directory if it doesn't exist
    if let Some(parent) = log_file.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Create file appender with daily rotation
    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        log_file.as_ref().parent().unwrap_or(Path::new(".")),
        log_file.as_ref().file_name().unwrap_or(std::ffi::OsStr::new("app.log")),
    );

    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    // try_init so tests embedding the crate can call this more than once
    let _ = Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    Ok(())
}
