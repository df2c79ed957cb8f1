//! Tracing configuration and log routing.
//!
//! Logs go to stdout through a compact formatter and, unless disabled, to an append-only file.
//! `DRIVE_DIGEST_LOG_FILE` picks the file (default `logs/drive-digest.log`); the value `off`
//! keeps logging on stdout only.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_VAR: &str = "DRIVE_DIGEST_LOG_FILE";
const DEFAULT_LOG_FILE: &str = "logs/drive-digest.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where file logs are written.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogTarget {
    Disabled,
    File(PathBuf),
}

/// Configure tracing subscribers for stdout and optional file logging.
///
/// - Respects `RUST_LOG` for filtering (defaults to `info`).
/// - Installs a compact stdout layer and, when available, an ANSI-free file layer.
/// - Keeps the non-blocking writer guard alive for the process lifetime.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let file_layer = match log_target(std::env::var(LOG_FILE_VAR).ok().as_deref()) {
        LogTarget::Disabled => None,
        LogTarget::File(path) => open_writer(&path).map(|writer| {
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact()
        }),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

fn log_target(setting: Option<&str>) -> LogTarget {
    match setting.map(str::trim) {
        Some(value) if value.eq_ignore_ascii_case("off") => LogTarget::Disabled,
        Some(value) if !value.is_empty() => LogTarget::File(PathBuf::from(value)),
        _ => LogTarget::File(PathBuf::from(DEFAULT_LOG_FILE)),
    }
}

/// Open `path` for appending behind a non-blocking writer, creating parent directories.
///
/// Returns `None` (after reporting on stderr) when the file cannot be opened.
fn open_writer(path: &Path) -> Option<NonBlocking> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        if let Err(err) = std::fs::create_dir_all(parent) {
            eprintln!("Failed to create log directory {}: {err}", parent.display());
            return None;
        }
    }
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}
