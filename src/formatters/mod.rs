use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::RunReport;

pub mod json_compact;

pub use json_compact::JsonGraphFormatter;

pub const SUMMARY_FILE: &str = "run_summary.json";

/// Exports both graphs and writes the run summary next to the record streams.
///
/// On failure the error is also stored in `summary.aborted`, so the caller can
/// still report everything the run produced.
pub fn publish(report: &mut RunReport, output: &Path) -> Result<Vec<PathBuf>> {
    let published = write_outputs(report, output);
    if let Err(err) = &published {
        report.summary.aborted = Some(format!("{err:#}"));
    }
    published
}

fn write_outputs(report: &RunReport, output: &Path) -> Result<Vec<PathBuf>> {
    let mut written = JsonGraphFormatter::new().export(&report.graphs, output)?;

    let path = output.join(SUMMARY_FILE);
    let json = serde_json::to_string_pretty(&report.summary)?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    written.push(path);
    Ok(written)
}
