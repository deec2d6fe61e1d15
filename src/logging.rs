//! Tracing setup.
//!
//! Set `VOCSCOPE_DEBUG_LOG` to log at debug level into a file, which keeps the
//! terminal UI clean. The value names the file; an empty value uses
//! /tmp/vocscope-debug.log. Without it, warnings and up go to stderr, or
//! whatever `RUST_LOG` asks for.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const DEBUG_LOG_VAR: &str = "VOCSCOPE_DEBUG_LOG";
const DEFAULT_LOG_FILE: &str = "/tmp/vocscope-debug.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

/// Where logs go for a given `VOCSCOPE_DEBUG_LOG` value.
pub fn target_for(debug_log: Option<&str>) -> LogTarget {
    match debug_log.map(str::trim) {
        None => LogTarget::Stderr,
        Some("") | Some("1") => LogTarget::File(PathBuf::from(DEFAULT_LOG_FILE)),
        Some(path) => LogTarget::File(PathBuf::from(path)),
    }
}

/// Initialize logging. Call once at startup.
pub fn init() -> Result<()> {
    let target = target_for(std::env::var(DEBUG_LOG_VAR).ok().as_deref());

    match target {
        LogTarget::Stderr => {
            let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogTarget::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)
                .with_context(|| format!("Failed to open debug log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("vocscope=debug"))
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_thread_ids(true)
                .init();
            tracing::debug!(path = %path.display(), "debug logging initialized");
        }
    }
    Ok(())
}
