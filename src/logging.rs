//! Tracing setup: optional console output plus a rotating log file.

use crate::config::{EnvMode, LogRotation, LoggerSettings};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Minutely => Rotation::MINUTELY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// `RUST_LOG` wins over the configured level.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sof_stats={level},tower_http={level},info")))
}

/// Installs the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be kept alive
/// for as long as the process logs.
pub fn init_logging(settings: &LoggerSettings, env_mode: EnvMode) -> anyhow::Result<WorkerGuard> {
    let level = settings.effective_level(env_mode);

    let file_appender = RollingFileAppender::builder()
        .rotation(settings.rotation.into())
        .filename_prefix(settings.log_file.as_str())
        .max_log_files(settings.retention)
        .build(&settings.log_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = settings.log_console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_filter(build_filter(level))
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(build_filter(level));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
