use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use crate::storage::restrict_file;

pub const LOG_ENV: &str = "KEYLEDGER_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Picks the filter directive: explicit flag, then `KEYLEDGER_LOG`, then `info`.
pub fn directive(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var(LOG_ENV).ok())
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string())
}

/// Routes tracing output to `log_path`. The terminal belongs to the UI, so
/// nothing is written to stdout or stderr.
pub fn init(log_path: &Path, directive: &str) -> Result<()> {
    let filter = EnvFilter::try_new(directive)
        .map_err(|e| anyhow!("Invalid log filter '{directive}': {e}"))?;
    let file = OpenOptions::new().create(true).append(true).open(log_path)?;
    restrict_file(log_path)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {e}"))
}
