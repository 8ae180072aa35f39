use std::fs;
use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE: &str = "chatwrap.log";

/// Set up file-only logging in the app directory. The TUI owns the terminal,
/// so nothing is ever written to stdout/stderr.
///
/// Filter defaults to `info`; `RUST_LOG` overrides it. Returns a
/// `WorkerGuard` that must stay alive for the process lifetime or buffered
/// lines are dropped.
pub fn init(dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(dir)?;
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .compact()
        .init();

    Ok(guard)
}
