//! Tracing setup: human-readable console output plus a JSON log file.

use std::path::Path;

use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// The file is appended to, one JSON object per line. When the log file
/// cannot be opened the daemon keeps running with console output only.
/// Keep the returned guard alive for the life of the process or buffered
/// lines are lost.
pub(crate) fn init_tracing(
    log_dir: &Path,
    file_name: &str,
) -> Result<Option<WorkerGuard>, TryInitError> {
    let (file_layer, guard, file_error) = match file_appender(log_dir, file_name) {
        Ok(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), Some(guard), None)
        }
        Err(e) => (None, None, Some(e)),
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_ansi(true))
        .with(file_layer)
        .try_init()?;

    if let Some(e) = file_error {
        warn!(
            dir = %log_dir.display(),
            file = file_name,
            "Log file unavailable, logging to console only: {}",
            e
        );
    }

    Ok(guard)
}

/// Open `log_dir/file_name` for appending, creating the directory first.
fn file_appender(
    log_dir: &Path,
    file_name: &str,
) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(log_dir)?;
    Ok(appender)
}
