//! Run reports under `<report_dir>/<target>.json`.
//!
//! Reports are product output: always written after a run, independent of
//! `RUST_LOG`. Only the latest run per target is kept.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::io::write_atomic;
use crate::orchestrator::RunOutcome;

/// Write `outcome` as pretty JSON, replacing any earlier report.
pub fn write_report(path: &Path, outcome: &RunOutcome) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(outcome).context("serialize run report")?;
    buf.push('\n');
    write_atomic(path, &buf).with_context(|| format!("write report {}", path.display()))?;
    debug!(path = %path.display(), attempts = outcome.attempts, "run report written");
    Ok(())
}
