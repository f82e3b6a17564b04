//! File logging. The terminal is in raw mode while the app runs, so nothing goes to stdout.

use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const LOG_FILE_NAME: &str = "marktree.log";

/// Keeps the background writer alive; logs are flushed when it drops.
pub struct LogGuard(#[allow(dead_code)] WorkerGuard);

/// Logs to `<dir>/marktree.log`, filtered by `RUST_LOG` (default `info`). Returns `None` when
/// the directory cannot be created or a subscriber is already installed.
pub fn init(dir: &Path) -> Option<LogGuard> {
    if let Err(err) = fs::create_dir_all(dir) {
        eprintln!("marktree: cannot create log directory {}: {err}", dir.display());
        return None;
    }
    let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);
    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .ok()?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "marktree starting");
    Some(LogGuard(guard))
}
