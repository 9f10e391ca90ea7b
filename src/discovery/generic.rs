//! Generic test discovery implementation.
//!
//! Runs a user-provided shell command and treats each line of its stdout as
//! a test identifier. Works for any build tool that can list its tests.

use async_trait::async_trait;

use super::{DiscoveryError, DiscoveryResult, TestDiscoverer};
use crate::config::GenericDiscoveryConfig;

/// Generic test discoverer that uses a user-provided command.
pub struct GenericDiscoverer {
    config: GenericDiscoveryConfig,
}

impl GenericDiscoverer {
    /// Create a new generic discoverer with the given configuration.
    pub fn new(config: GenericDiscoveryConfig) -> Self {
        Self { config }
    }

    /// Parse discovery command output.
    ///
    /// Expects one test ID per line. Blank lines and `#` comments are skipped.
    fn parse_discover_output(output: &str) -> Vec<String> {
        output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect()
    }
}

#[async_trait]
impl TestDiscoverer for GenericDiscoverer {
    async fn discover(&self) -> DiscoveryResult<Vec<String>> {
        // Run through the shell to support pipes, globs, etc.
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c");
        cmd.arg(&self.config.discover_command);

        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!("Running discovery command: {}", self.config.discover_command);
        let output = cmd
            .output()
            .await
            .map_err(|e| DiscoveryError::DiscoveryFailed(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(DiscoveryError::DiscoveryFailed(format!(
                "Discovery command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let tests = Self::parse_discover_output(&stdout);

        if tests.is_empty() {
            tracing::warn!("No tests discovered. stderr: {}", stderr.trim());
        }

        Ok(tests)
    }

    fn name(&self) -> &'static str {
        "generic"
    }
}
