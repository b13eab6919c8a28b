//! Logging and tracing configuration
//!
//! Logs go to stderr so they never mix with the report printed on stdout.
//! Optionally a second, more detailed layer writes to a log file.

use std::fs::File;
use std::path::PathBuf;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::paths;

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("storage_harness=info,warn"))
}

/// Initialize tracing
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
/// When `to_file` is set, a file layer is added at
/// `~/.local/share/storage-harness/logs/harness.log` and its path returned.
pub fn init(to_file: bool) -> Option<PathBuf> {
    let (file, log_path) = if to_file { open_log_file() } else { (None, None) };

    let file_layer = file.map(|file| {
        fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
    });

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    tracing_subscriber::registry()
        .with(filter())
        .with(file_layer)
        .with(stderr_layer)
        .init();

    log_path
}

fn open_log_file() -> (Option<File>, Option<PathBuf>) {
    let Some(log_dir) = paths::log_dir() else {
        return (None, None);
    };
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Could not create log directory: {}", e);
        return (None, None);
    }

    let log_file = log_dir.join("harness.log");
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
    {
        Ok(file) => (Some(file), Some(log_file)),
        Err(e) => {
            eprintln!("Warning: Could not open log file: {}", e);
            (None, None)
        }
    }
}
