//! Logging setup shared by the portal binaries.
//!
//! Formatted output passes through the PII sanitizer before it reaches the
//! sink, so stray applicant identity data or key material never lands in a
//! log file.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::adapters::sanitize::SanitizingMakeWriter;

/// Initialize the global tracing subscriber.
///
/// Logs go to stdout by default; set `CLASSGLASS_LOG_MODE=file` to append to
/// `CLASSGLASS_LOG_FILE` (default `classglass.log`) instead. The returned
/// guard must be held for the lifetime of the process so the non-blocking
/// writer can flush on shutdown.
///
/// # Errors
/// Returns an error if the log file cannot be opened.
pub fn init() -> crate::Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_mode =
        std::env::var("CLASSGLASS_LOG_MODE").unwrap_or_else(|_| "stdout".to_string());

    let (writer, guard) = if log_mode == "file" {
        let log_file = std::env::var("CLASSGLASS_LOG_FILE")
            .unwrap_or_else(|_| "classglass.log".to_string());

        if let Some(parent) = std::path::Path::new(&log_file).parent() {
            // Best-effort: don't fail startup just because the directory is missing.
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stdout())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    Ok(guard)
}
