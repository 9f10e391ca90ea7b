//! Test discovery traits and implementations.
//!
//! A discoverer turns a project into the raw list of test identifiers the
//! [`TestCatalog`](crate::catalog::TestCatalog) is built from. The catalog
//! validates and deduplicates, so discoverers only need to find candidates.
//!
//! | Discoverer | Source | Identifier |
//! |------------|--------|------------|
//! | [`JavaDiscoverer`] | `*.java` files matched by glob | fully-qualified class name |
//! | [`GenericDiscoverer`] | output of a shell command | one identifier per line |

pub mod generic;
pub mod java;
pub mod walk;

use async_trait::async_trait;

pub use generic::GenericDiscoverer;
pub use java::JavaDiscoverer;

/// Result type for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Errors that can occur during test discovery.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Failed to discover tests: {0}")]
    DiscoveryFailed(String),

    #[error("Failed to parse test source {path}: {message}")]
    ParseError {
        path: std::path::PathBuf,
        message: String,
    },

    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(#[from] globset::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A test discoverer finds the tests a project contains.
///
/// Output order does not need to be stable across calls; the partitioner
/// sorts deterministically.
#[async_trait]
pub trait TestDiscoverer: Send + Sync {
    /// Returns raw identifiers for every schedulable test.
    async fn discover(&self) -> DiscoveryResult<Vec<String>>;

    /// Discoverer name (for logging).
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T: TestDiscoverer + ?Sized> TestDiscoverer for Box<T> {
    async fn discover(&self) -> DiscoveryResult<Vec<String>> {
        (**self).discover().await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// A boxed, type-erased test discoverer.
pub type DynDiscoverer = Box<dyn TestDiscoverer>;
