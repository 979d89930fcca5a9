//! Logging setup
//!
//! One log file per process start, named after the start time
//! (`logs/2024.05.01.09.30.12.log`), plus console output. Level defaults to
//! INFO and can be changed with `RUST_LOG`.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Local};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keeps the non-blocking file writer alive. Dropping it flushes the log.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    /// Name of the log file created for this session
    pub file_name: String,
}

/// Log file name for a session started at `started`
pub fn session_log_file_name(started: DateTime<Local>) -> String {
    format!("{}.log", started.format("%Y.%m.%d.%H.%M.%S"))
}

/// Install the global subscriber: env filter, stdout layer, file layer.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created.
pub fn init_logging(log_dir: &Path, ansi: bool) -> Result<LoggingGuard, io::Error> {
    fs::create_dir_all(log_dir)?;

    let file_name = session_log_file_name(Local::now());
    let file_appender = tracing_appender::rolling::never(log_dir, &file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(ansi)
        .compact();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
        file_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_file_name_format() {
        let started = Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 12).unwrap();
        assert_eq!(session_log_file_name(started), "2024.05.01.09.30.12.log");
    }
}
