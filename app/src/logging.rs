use std::io;
use std::path::Path;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "dbchat.log";

pub fn init_file_logging(log_dir: &Path) -> io::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)?;

    // Buffered lines are lost once the guard drops.
    info!(
        "logging initialized, writing to {}/{LOG_FILE_PREFIX}.*",
        log_dir.display()
    );
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::init_file_logging;

    #[test]
    fn file_logging_creates_missing_directory() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let log_dir = temp_dir.path().join("nested").join("logs");

        let guard = init_file_logging(&log_dir).expect("logging should initialize");
        assert!(log_dir.is_dir());
        drop(guard);
    }
}
