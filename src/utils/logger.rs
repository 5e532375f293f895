use crate::utils::error::{EtlError, Result};
use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const LOG_FILE_NAME: &str = "etl_app.log";

fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("daily_etl=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("daily_etl=info"))
    }
}

/// Non-blocking writer over `<log_dir>/etl_app.log.YYYY-MM-DD`, creating the directory.
pub fn file_writer(log_dir: impl AsRef<Path>) -> Result<(NonBlocking, WorkerGuard)> {
    let log_dir = log_dir.as_ref();
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_NAME)
        .build(log_dir)
        .map_err(|e| EtlError::ConfigError {
            message: format!("cannot open log directory {}: {}", log_dir.display(), e),
        })?;
    Ok(tracing_appender::non_blocking(appender))
}

fn file_layer<S>(writer: NonBlocking) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
}

/// Console plus a daily-rolling file under `log_dir`.
///
/// The returned guard flushes the file writer on drop; keep it alive until the
/// last line is logged and drop it before `std::process::exit`.
pub fn init_logger(verbose: bool, log_dir: impl AsRef<Path>) -> Result<WorkerGuard> {
    let (writer, guard) = file_writer(log_dir)?;

    tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .with(file_layer(writer))
        .init();

    Ok(guard)
}

/// Logs a fatal error with its classification and returns the process exit code.
pub fn log_failure(error: &EtlError) -> i32 {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        error,
        error.category(),
        error.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", error.recovery_suggestion());
    error.exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::FetchError;
    use tempfile::TempDir;

    fn read_logs(dir: &Path) -> String {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
            .collect()
    }

    #[test]
    fn test_failure_lines_are_flushed_when_guard_drops() {
        let temp_dir = TempDir::new().unwrap();
        let (writer, guard) = file_writer(temp_dir.path()).unwrap();
        let subscriber = tracing_subscriber::registry().with(file_layer(writer));

        let error = EtlError::Fetch(FetchError::RetriesExhausted {
            url: "http://127.0.0.1:1/orders".to_string(),
            attempts: 1,
            last_error: "connection refused".to_string(),
        });
        let code = tracing::subscriber::with_default(subscriber, || log_failure(&error));
        drop(guard);

        assert_eq!(code, 2);
        let logs = read_logs(temp_dir.path());
        assert!(logs.contains("Category: Extraction, Severity: Medium"), "{logs}");
        assert!(logs.contains("💡 Recovery suggestion:"), "{logs}");
    }

    #[test]
    fn test_uncreatable_log_dir_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let err = init_logger(false, blocker.join("logs")).unwrap_err();
        assert!(matches!(err, EtlError::ConfigError { .. }));
        assert_eq!(err.exit_code(), 3);
    }
}
