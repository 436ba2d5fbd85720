//! Result reporting

use anyhow::{Context, Result};
use pipebench::RunSummary;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

/// Final counters for one target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetResult {
    pub label: String,
    pub attempted: u64,
    pub failed: u64,
    /// `attempted - failed`; negative when more batches were rejected than
    /// operations executed
    pub successful: i64,
}

impl TargetResult {
    pub fn new(label: impl Into<String>, summary: RunSummary) -> Self {
        Self {
            label: label.into(),
            attempted: summary.attempted,
            failed: summary.failed,
            successful: summary.successful(),
        }
    }
}

/// Render the plain-text report
pub fn render(results: &[TargetResult]) -> String {
    let mut out = String::from("Performance Test Results:\n\n");
    for result in results {
        // Writing to a String cannot fail
        let _ = write!(
            out,
            "{}:\n  - Total Operations: {}\n  - Errors: {}\n  - Successful Operations: {}\n\n",
            result.label, result.attempted, result.failed, result.successful
        );
    }
    out
}

pub fn write_text(path: &Path, results: &[TargetResult]) -> Result<()> {
    std::fs::write(path, render(results))
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

pub fn write_json(path: &Path, results: &[TargetResult]) -> Result<()> {
    let json = serde_json::to_string_pretty(results).context("Failed to serialize results")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write JSON report to {}", path.display()))
}
