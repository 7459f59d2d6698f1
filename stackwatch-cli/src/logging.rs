//! Tracing subscriber setup
//!
//! Plain commands log to stderr. The dashboard owns the terminal, so it logs
//! to a file in the temp dir instead.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "stackwatch_core=info,stack=info";
const LOG_FILE: &str = "stackwatch-tui.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Keep the returned guard alive for the whole run or buffered lines are lost
pub fn init_file() -> WorkerGuard {
    let appender = tracing_appender::rolling::never(std::env::temp_dir(), LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    guard
}

pub fn log_file_path() -> PathBuf {
    std::env::temp_dir().join(LOG_FILE)
}
