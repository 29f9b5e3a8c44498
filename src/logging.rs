//! # Diagnostic Logging
//!
//! Installs the `tracing` subscriber: stdout plus an optional daily rolling
//! file under `logs/`. This is separate from the server log journal shown at
//! `/server/log`.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// File name prefix of the rolling trace files
pub const TRACE_FILE_PREFIX: &str = "epaper-server.trace";

/// Filter from `RUST_LOG`, falling back to the configured level
fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Initialize logging.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the lifetime of the process.
///
/// # Arguments
///
/// * `config` - Logging section of the configuration
/// * `logs_dir` - Directory for rolling trace files
pub fn init(config: &LoggingConfig, logs_dir: &Path) -> Option<WorkerGuard> {
    let stdout = fmt::layer().with_target(true);

    if config.trace_file {
        let appender = tracing_appender::rolling::daily(logs_dir, TRACE_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file = fmt::layer().with_ansi(false).with_writer(writer);

        tracing_subscriber::registry()
            .with(env_filter(config))
            .with(stdout)
            .with(file)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter(config))
            .with(stdout)
            .init();
        None
    }
}
