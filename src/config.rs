//! Configuration loading and schema definitions for split-tests.
//!
//! Configuration lives in `split-tests.toml` and is entirely optional:
//! every value has a default and every value can be overridden on the
//! command line. See [`schema`] for the full format.

pub mod schema;

pub use schema::*;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::discovery::walk::compile_glob;

/// Starter configuration written by `split-tests init`.
pub const STARTER_CONFIG: &str = r#"# split-tests configuration

[split]
# Number of shards. Can also be passed with --split-total.
# total = 4
format = "list"            # list | gradle
new_test_time = "median"   # median | average | min | max | zero
aggregation = "max"        # max | mean | latest

[discovery]
type = "java"
glob = "**/src/test/java/**/*Test.java"
# exclude_glob = "**/integration/**"

[history]
# junit_glob = "**/build/test-results/**/TEST-*.xml"
format = "suite"           # suite | case

[report]
output_dir = "test-splits"
# json = "test-splits/plan.json"
"#;

/// Loads split-tests configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
///
/// # Example
///
/// ```no_run
/// use split_tests::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("split-tests.toml"))?;
/// println!("Max parallel: {}", config.split.max_parallel);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config.expand_paths())
}

/// Loads split-tests configuration from a TOML string.
///
/// # Example
///
/// ```
/// use split_tests::config::load_config_str;
///
/// let config = load_config_str(r#"
///     [split]
///     total = 4
/// "#)?;
///
/// assert_eq!(config.split.total, Some(4));
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    Ok(config.expand_paths())
}

/// Loads `path` if it exists, otherwise returns the defaults.
///
/// With `required` set, a missing file is an error; use this when the
/// user named the file explicitly.
pub fn load_or_default(path: &Path, required: bool) -> Result<Config> {
    if path.exists() || required {
        return load_config(path);
    }
    tracing::debug!("No config file at {}, using defaults", path.display());
    Ok(Config::default())
}

/// Expands a leading `~` to the home directory.
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

impl Config {
    fn expand_paths(mut self) -> Self {
        if let DiscoveryConfig::Generic(generic) = &mut self.discovery
            && let Some(dir) = &generic.working_dir
        {
            generic.working_dir = Some(expand_path(dir));
        }
        self.report.output_dir = expand_path(&self.report.output_dir);
        self.report.json = self.report.json.as_deref().map(expand_path);
        self
    }

    /// Checks values serde cannot: shard count, parallelism and globs.
    pub fn validate(&self) -> Result<()> {
        if self.split.total == Some(0) {
            bail!("split.total must be at least 1");
        }
        if self.split.max_parallel == 0 {
            bail!("split.max_parallel must be at least 1");
        }
        if let DiscoveryConfig::Java(java) = &self.discovery {
            compile_glob(&java.glob)
                .with_context(|| format!("Invalid discovery.glob: {}", java.glob))?;
            if let Some(exclude) = &java.exclude_glob {
                compile_glob(exclude)
                    .with_context(|| format!("Invalid discovery.exclude_glob: {}", exclude))?;
            }
        }
        if let Some(glob) = &self.history.junit_glob {
            compile_glob(glob).with_context(|| format!("Invalid history.junit_glob: {}", glob))?;
        }
        Ok(())
    }
}
