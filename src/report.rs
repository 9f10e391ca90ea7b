//! Partition reporting and output formatting.
//!
//! [`PartitionReport`] is the serializable view of a
//! [`PartitionResult`]: per-shard test lists plus balance statistics. The
//! [`output`] submodule persists it as shard files or JSON.

pub mod output;

use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::catalog::TestId;
use crate::partition::PartitionResult;

pub use output::{write_json, write_shard_files};

/// How a shard's test list is rendered for the downstream runner.
///
/// ```toml
/// [split]
/// format = "gradle"  # emits `--tests com.example.FooTest`
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One bare identifier per entry.
    #[default]
    List,
    /// Gradle test filter arguments.
    Gradle,
}

impl OutputFormat {
    /// Renders one identifier in this format.
    pub fn render(&self, id: &str) -> String {
        match self {
            OutputFormat::List => id.to_string(),
            OutputFormat::Gradle => format!("--tests {}", id),
        }
    }
}

/// One shard in a [`PartitionReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupReport {
    /// Zero-based shard index.
    pub index: usize,

    /// Number of tests in the shard.
    pub test_count: usize,

    /// Estimated shard time in milliseconds.
    pub total_ms: u64,

    /// Test identifiers, slowest first.
    pub tests: Vec<String>,
}

impl GroupReport {
    /// Renders the test list in the given output format.
    pub fn render(&self, format: OutputFormat) -> Vec<String> {
        self.tests.iter().map(|t| format.render(t)).collect()
    }
}

/// Summary of a partitioning run, ready for serialization.
///
/// Times are rounded down to whole milliseconds; exact values remain
/// available on the [`PartitionResult`] the report was built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionReport {
    /// Number of shards.
    pub group_count: usize,

    /// Number of tests across all shards.
    pub test_count: usize,

    /// Sum of all estimates.
    pub total_ms: u64,

    /// Slowest shard.
    pub max_ms: u64,

    /// Fastest shard.
    pub min_ms: u64,

    /// Mean shard time.
    pub mean_ms: u64,

    /// Slowest minus fastest shard.
    pub spread_ms: u64,

    /// Slowest divided by fastest shard; `None` when a shard is idle while
    /// another has work.
    pub imbalance_ratio: Option<f64>,

    /// SHA-256 of the assignment. Equal fingerprints mean equal plans.
    pub fingerprint: String,

    /// Per-shard details, ordered by index.
    pub groups: Vec<GroupReport>,
}

impl PartitionReport {
    /// Builds the report for a partition result.
    pub fn summarize(result: &PartitionResult) -> Self {
        let groups = result
            .groups()
            .iter()
            .map(|group| GroupReport {
                index: group.index(),
                test_count: group.len(),
                total_ms: millis(group.total()),
                tests: group.tests().iter().map(TestId::to_string).collect(),
            })
            .collect();

        let ratio = result.imbalance_ratio();

        Self {
            group_count: result.len(),
            test_count: result.test_count(),
            total_ms: millis(result.total()),
            max_ms: millis(result.max_total()),
            min_ms: millis(result.min_total()),
            mean_ms: millis(result.mean_total()),
            spread_ms: millis(result.spread()),
            imbalance_ratio: ratio.is_finite().then_some(ratio),
            fingerprint: fingerprint(result),
            groups,
        }
    }

    /// Looks up one shard.
    pub fn group(&self, index: usize) -> Option<&GroupReport> {
        self.groups.get(index)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn fingerprint(result: &PartitionResult) -> String {
    let mut hasher = Sha256::new();
    for group in result.groups() {
        hasher.update(format!("#{}:{}\n", group.index(), group.total().as_nanos()));
        for test in group.tests() {
            hasher.update(test.as_str());
            hasher.update(b"\n");
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Formats a duration as `MMmSSs`, rounding to the nearest second.
///
/// ```
/// use std::time::Duration;
/// use split_tests::report::format_time;
///
/// assert_eq!(format_time(Duration::from_secs(0)), "00m00s");
/// assert_eq!(format_time(Duration::from_millis(153_457)), "02m33s");
/// assert_eq!(format_time(Duration::from_secs(3725)), "62m05s");
/// ```
pub fn format_time(duration: Duration) -> String {
    let secs = duration.as_secs_f64().round() as u64;
    format!("{:02}m{:02}s", secs / 60, secs % 60)
}

/// Prints a summary of the plan to stderr.
///
/// Stdout is reserved for the shard test lists, so the summary never mixes
/// with output a CI step might capture.
pub fn print_summary(report: &PartitionReport) -> io::Result<()> {
    let term = console::Term::stderr();
    for line in summary_lines(report) {
        term.write_line(&line)?;
    }
    Ok(())
}

/// Renders the summary printed by [`print_summary`], one entry per line.
pub fn summary_lines(report: &PartitionReport) -> Vec<String> {
    let ms = Duration::from_millis;

    let mut lines = vec![
        String::new(),
        "Test Split Plan:".to_string(),
        format!("  Shards:  {}", report.group_count),
        format!("  Tests:   {}", report.test_count),
        format!("  Total:   {}", format_time(ms(report.total_ms))),
        format!(
            "  Slowest: {}",
            console::style(format_time(ms(report.max_ms))).red()
        ),
        format!(
            "  Fastest: {}",
            console::style(format_time(ms(report.min_ms))).green()
        ),
        match report.imbalance_ratio {
            Some(ratio) => format!("  Imbalance: {:.3}", ratio),
            None => format!(
                "  Imbalance: {}",
                console::style("unbounded (idle shards)").yellow()
            ),
        },
        String::new(),
    ];

    for group in &report.groups {
        let line = format!(
            "  #{:02}  {:>4} tests  {}",
            group.index,
            group.test_count,
            format_time(ms(group.total_ms))
        );
        if group.tests.is_empty() {
            lines.push(console::style(line).dim().to_string());
        } else {
            lines.push(line);
        }
    }
    lines.push(String::new());
    lines.push(format!(
        "  Fingerprint: {}",
        console::style(&report.fingerprint).dim()
    ));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ResolvedDurations;
    use crate::partition::partition;

    fn scenario(groups: usize) -> PartitionResult {
        let resolved = ResolvedDurations::from_estimates(
            [("A", 500), ("B", 500), ("C", 300), ("D", 200)]
                .map(|(id, ms)| (TestId::parse(id).unwrap(), Duration::from_millis(ms))),
        );
        partition(&resolved, groups).unwrap()
    }

    #[test]
    fn test_summarize_scenario() {
        let report = PartitionReport::summarize(&scenario(2));

        assert_eq!(report.group_count, 2);
        assert_eq!(report.test_count, 4);
        assert_eq!(report.total_ms, 1500);
        assert_eq!(report.max_ms, 800);
        assert_eq!(report.min_ms, 700);
        assert_eq!(report.mean_ms, 750);
        assert_eq!(report.spread_ms, 100);
        assert_eq!(report.groups[0].tests, vec!["A", "C"]);
        assert_eq!(report.groups[1].tests, vec!["B", "D"]);
        assert_eq!(report.groups[1].total_ms, 700);

        let ratio = report.imbalance_ratio.unwrap();
        assert!((ratio - 1.142857).abs() < 1e-6);
    }

    #[test]
    fn test_idle_shard_has_no_ratio() {
        let report = PartitionReport::summarize(&scenario(5));
        assert_eq!(report.imbalance_ratio, None);
        assert_eq!(report.groups[4].test_count, 0);
    }

    #[test]
    fn test_empty_plan_ratio_is_one() {
        let result = partition(&ResolvedDurations::default(), 3).unwrap();
        let report = PartitionReport::summarize(&result);
        assert_eq!(report.imbalance_ratio, Some(1.0));
        assert_eq!(report.groups.len(), 3);
    }

    #[test]
    fn test_summary_lines() {
        let report = PartitionReport::summarize(&scenario(5));
        let lines: Vec<String> = summary_lines(&report)
            .iter()
            .map(|line| console::strip_ansi_codes(line).into_owned())
            .collect();

        assert_eq!(lines[1], "Test Split Plan:");
        assert!(lines.contains(&"  Shards:  5".to_string()));
        assert!(lines.contains(&"  Tests:   4".to_string()));
        assert!(lines.contains(&"  Imbalance: unbounded (idle shards)".to_string()));
        assert!(lines.contains(&"  #00     1 tests  00m01s".to_string()));
        assert!(lines.contains(&"  #04     0 tests  00m00s".to_string()));
        assert_eq!(
            lines.last().unwrap(),
            &format!("  Fingerprint: {}", report.fingerprint)
        );
    }

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let a = PartitionReport::summarize(&scenario(2));
        let b = PartitionReport::summarize(&scenario(2));
        let c = PartitionReport::summarize(&scenario(3));

        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
        assert_eq!(a.fingerprint.len(), 64);
    }

    #[test]
    fn test_render_formats() {
        let report = PartitionReport::summarize(&scenario(2));
        let group = report.group(0).unwrap();
        assert_eq!(group.render(OutputFormat::List), vec!["A", "C"]);
        assert_eq!(
            group.render(OutputFormat::Gradle),
            vec!["--tests A", "--tests C"]
        );
    }

    #[test]
    fn test_serialize_report() {
        let report = PartitionReport::summarize(&scenario(2));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["groups"][0]["tests"][1], "C");
        assert_eq!(json["max_ms"], 800);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(Duration::from_millis(2374)), "00m02s");
        assert_eq!(format_time(Duration::from_millis(59_600)), "01m00s");
        assert_eq!(format_time(Duration::from_secs(600)), "10m00s");
    }
}
