//! Persisting a [`PartitionReport`] for downstream CI steps.
//!
//! Shard files are named `shard-NN.txt` (zero-padded index) and contain
//! one rendered test entry per line, so a CI job can simply run
//! `xargs < shard-03.txt`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use super::{OutputFormat, PartitionReport};

/// File name used for a shard's test list.
pub fn shard_file_name(index: usize) -> String {
    format!("shard-{:02}.txt", index)
}

/// Writes one file per shard into `dir`, creating it if needed.
///
/// Empty shards still get an (empty) file so that every CI job finds its
/// input. Returns the written paths in shard order.
pub fn write_shard_files(
    dir: &Path,
    report: &PartitionReport,
    format: OutputFormat,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let mut written = Vec::with_capacity(report.groups.len());
    for group in &report.groups {
        let path = dir.join(shard_file_name(group.index));
        let mut content = group.render(format).join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write shard file: {}", path.display()))?;
        written.push(path);
    }

    info!("Wrote {} shard files to {}", written.len(), dir.display());
    Ok(written)
}

/// Writes the full report as pretty-printed JSON.
pub fn write_json(path: &Path, report: &PartitionReport) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;

    info!("Partition report written to: {}", path.display());
    Ok(())
}
