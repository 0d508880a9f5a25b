use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIR_ENV: &str = "CONSOLIDATOR_LOG_DIR";
const DEFAULT_LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "consolidator.log";
const DEFAULT_FILTER: &str = "consolidator=info";

/// `$CONSOLIDATOR_LOG_DIR`, or `./logs`.
pub fn log_dir() -> PathBuf {
    std::env::var_os(LOG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR))
}

/// Daily-rotated file writer under `dir`, creating the directory first.
fn open_log_writer(dir: &Path) -> io::Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}

/// Human-readable lines on stderr, JSON lines in the log directory.
///
/// Keep the returned guard alive until exit; dropping it flushes the file writer.
/// If the log directory cannot be created the run keeps going with stderr only.
pub fn init_logging() -> Option<WorkerGuard> {
    let dir = log_dir();
    let (file_layer, guard, unavailable) = match open_log_writer(&dir) {
        Ok((writer, guard)) => (Some(fmt::layer().json().with_writer(writer)), Some(guard), None),
        Err(e) => (None, None, Some(e)),
    };

    // stdout carries the run summary
    let console_layer = fmt::layer().with_target(false).with_writer(io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if let Some(e) = unavailable {
        warn!("⚠️  Cannot write logs to {}: {}; logging to stderr only", dir.display(), e);
    }
    installed.then_some(guard).flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_log_writer_creates_nested_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("a").join("logs");

        let opened = open_log_writer(&dir);

        assert!(opened.is_ok());
        assert!(dir.is_dir());
    }

    #[test]
    fn test_log_writer_reports_unusable_directory() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("taken");
        std::fs::write(&blocker, "a file, not a directory").unwrap();

        assert!(open_log_writer(&blocker.join("logs")).is_err());
    }
}
