//! Configuration schema definitions for split-tests.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── SplitConfig            - Shard count, output format, estimate policies
//! ├── DiscoveryConfig        - Tagged enum selecting discovery type
//! │   ├── Java               - Java source scan
//! │   └── Generic            - Custom shell-based discovery
//! ├── HistoryConfig          - Where JUnit timing reports live
//! └── ReportConfig           - Plan output locations
//! ```
//!
//! Every section is optional. A `[discovery]` section must name its `type`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::duration::{Aggregation, ModelOptions, NewTestTime};
use crate::history::JunitFormat;
use crate::report::OutputFormat;

/// Root configuration structure for split-tests.
///
/// # TOML Structure
///
/// ```toml
/// [split]
/// total = 4
/// format = "gradle"
///
/// [discovery]
/// type = "java"
/// glob = "**/src/test/java/**/*Test.java"
///
/// [history]
/// junit_glob = "**/build/test-results/**/TEST-*.xml"
///
/// [report]
/// output_dir = "test-splits"
/// ```
///
/// # Example
///
/// ```
/// use split_tests::config::{Config, DiscoveryConfig};
///
/// let config: Config = toml::from_str(r#"
///     [split]
///     total = 3
///
///     [discovery]
///     type = "generic"
///     discover_command = "cat tests.txt"
/// "#).unwrap();
///
/// assert_eq!(config.split.total, Some(3));
/// assert!(matches!(config.discovery, DiscoveryConfig::Generic(_)));
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Shard count, output format and estimate policies.
    #[serde(default)]
    pub split: SplitConfig,

    /// How tests are found.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Where timing history comes from.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Where `plan` writes its output.
    #[serde(default)]
    pub report: ReportConfig,
}

/// Core split settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `total` | None (must be given on the command line) |
/// | `format` | `"list"` |
/// | `new_test_time` | `"median"` |
/// | `aggregation` | `"max"` |
/// | `max_parallel` | 16 |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SplitConfig {
    /// Number of shards.
    pub total: Option<usize>,

    /// How test identifiers are printed.
    #[serde(default)]
    pub format: OutputFormat,

    /// Estimate for tests without history.
    #[serde(default)]
    pub new_test_time: NewTestTime,

    /// How repeated samples of one test are combined.
    #[serde(default)]
    pub aggregation: Aggregation,

    /// Maximum number of files read concurrently during discovery and
    /// history loading.
    ///
    /// Default: 16
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl SplitConfig {
    /// Estimate policies for the duration model.
    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            aggregation: self.aggregation,
            new_test_time: self.new_test_time,
        }
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            total: None,
            format: OutputFormat::default(),
            new_test_time: NewTestTime::default(),
            aggregation: Aggregation::default(),
            max_parallel: default_max_parallel(),
        }
    }
}

fn default_max_parallel() -> usize {
    16
}

/// Test discovery configuration.
///
/// Uses the `type` field to select the discovery implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DiscoveryConfig {
    /// Scan Java sources for JUnit test classes.
    Java(JavaDiscoveryConfig),

    /// List tests with a custom shell command.
    Generic(GenericDiscoveryConfig),
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig::Java(JavaDiscoveryConfig::default())
    }
}

/// Configuration for Java test class discovery.
///
/// ```toml
/// [discovery]
/// type = "java"
/// glob = "**/src/test/java/**/*Test.java"
/// exclude_glob = "**/integration/**"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct JavaDiscoveryConfig {
    /// Glob selecting test source files, relative to the working directory.
    ///
    /// Default: `"**/src/test/java/**/*Test.java"`
    #[serde(default = "default_java_glob")]
    pub glob: String,

    /// Glob for files to leave out even if `glob` matches them.
    pub exclude_glob: Option<String>,
}

impl Default for JavaDiscoveryConfig {
    fn default() -> Self {
        Self {
            glob: default_java_glob(),
            exclude_glob: None,
        }
    }
}

fn default_java_glob() -> String {
    "**/src/test/java/**/*Test.java".to_string()
}

/// Configuration for custom discovery commands.
///
/// ```toml
/// [discovery]
/// type = "generic"
/// discover_command = "go test -list '.*' ./... | grep '^Test'"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GenericDiscoveryConfig {
    /// Command to discover test IDs.
    ///
    /// Should output one test ID per line to stdout. Lines starting with `#`
    /// are ignored (treated as comments).
    ///
    /// Run via shell: `sh -c "{discover_command}"`
    pub discover_command: String,

    /// Working directory for the discovery command.
    pub working_dir: Option<PathBuf>,
}

/// Timing history location.
///
/// Without `junit_glob` every test gets the same fallback estimate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct HistoryConfig {
    /// Glob selecting JUnit XML reports, relative to the working directory.
    pub junit_glob: Option<String>,

    /// Whether samples come from `<testsuite>` or `<testcase>` elements.
    #[serde(default)]
    pub format: JunitFormat,
}

/// Plan output settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `output_dir` | `"test-splits"` |
/// | `json` | None (no JSON report) |
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReportConfig {
    /// Directory `plan` writes `shard-NN.txt` files into.
    ///
    /// Created automatically if it doesn't exist.
    #[serde(default = "default_report_dir")]
    pub output_dir: PathBuf,

    /// Path of the JSON plan report.
    pub json: Option<PathBuf>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_report_dir(),
            json: None,
        }
    }
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("test-splits")
}
