use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::{HookError, Result};

const DEFAULT_LOG_FILTER: &str = "info";

/// Where log lines go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    Stdout,
    File(PathBuf),
}

impl LogTarget {
    /// Unset or empty means stderr, `-` means stdout, anything else is a file path.
    pub fn from_setting(setting: Option<&str>) -> Self {
        match setting.map(str::trim) {
            None | Some("") => LogTarget::Stderr,
            Some("-") => LogTarget::Stdout,
            Some(path) => LogTarget::File(PathBuf::from(path)),
        }
    }
}

pub struct FileLogger {
    log_file: PathBuf,
}

impl FileLogger {
    pub fn new(log_file: PathBuf) -> Self {
        Self { log_file }
    }

    /// Open the log file for appending behind a non-blocking writer.
    /// Keep the guard alive for as long as logs should be flushed.
    pub fn setup_file_logging(&self) -> Result<(NonBlocking, WorkerGuard)> {
        let file_name = self.log_file.file_name().ok_or_else(|| {
            HookError::ConfigError(format!(
                "Log path '{}' does not name a file",
                self.log_file.display()
            ))
        })?;
        let directory = match self.log_file.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        // Ensure log directory exists
        std::fs::create_dir_all(directory)?;

        // NEVER rotation appends to the one file, named by the prefix alone
        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(file_name.to_string_lossy())
            .build(directory)
            .map_err(|e| {
                HookError::ConfigError(format!(
                    "Failed to open log file '{}': {}",
                    self.log_file.display(),
                    e
                ))
            })?;
        Ok(tracing_appender::non_blocking(file_appender))
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Install the global subscriber for `target`.
///
/// Returns the file writer's guard when logging to a file.
pub fn setup_logging(target: &LogTarget) -> Result<Option<WorkerGuard>> {
    let registry = tracing_subscriber::registry().with(env_filter());

    match target {
        LogTarget::Stderr => {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
                .init();
            Ok(None)
        }
        LogTarget::Stdout => {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(io::stdout))
                .init();
            Ok(None)
        }
        LogTarget::File(path) => {
            let (file_writer, guard) = FileLogger::new(path.clone()).setup_file_logging()?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(file_writer)
                        .with_ansi(false), // Disable ANSI colors for file logs
                )
                .init();
            Ok(Some(guard))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_target_from_setting() {
        assert_eq!(LogTarget::from_setting(None), LogTarget::Stderr);
        assert_eq!(LogTarget::from_setting(Some("")), LogTarget::Stderr);
        assert_eq!(LogTarget::from_setting(Some("-")), LogTarget::Stdout);
        assert_eq!(
            LogTarget::from_setting(Some("/var/log/hooks.log")),
            LogTarget::File(PathBuf::from("/var/log/hooks.log"))
        );
    }

    #[test]
    fn file_logging_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let log_file = dir.path().join("nested").join("hooks.log");
        let (_writer, _guard) = FileLogger::new(log_file).setup_file_logging().unwrap();
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn file_logging_appends_to_the_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let log_file = dir.path().join("hooks.log");
        let (_writer, _guard) = FileLogger::new(log_file.clone()).setup_file_logging().unwrap();
        assert!(log_file.is_file());
    }

    #[test]
    fn unopenable_log_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let taken = dir.path().join("taken");
        std::fs::create_dir(&taken).unwrap();
        let err = FileLogger::new(taken).setup_file_logging().unwrap_err();
        assert!(matches!(err, HookError::ConfigError(_)));
    }

    #[test]
    fn file_logging_needs_a_file_name() {
        assert!(FileLogger::new(PathBuf::from("/")).setup_file_logging().is_err());
    }
}
