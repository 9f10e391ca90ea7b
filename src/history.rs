//! Historical timing sources.
//!
//! A [`HistoryReader`] produces the [`DurationSample`]s the
//! [`DurationModel`](crate::duration::DurationModel) is built from. Report
//! formats stay behind this trait so the model never sees XML.

pub mod junit;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::duration::{DurationError, DurationSample};

pub use junit::{JunitFormat, JunitReader};

/// Result type for history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Errors that can occur while loading timing history.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Invalid report glob: {0}")]
    InvalidGlob(#[from] globset::Error),

    #[error("Failed to read report {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse report {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error(transparent)]
    Malformed(#[from] DurationError),
}

/// A source of historical test durations.
#[async_trait]
pub trait HistoryReader: Send + Sync {
    /// Returns every sample found. Order is significant for
    /// [`Aggregation::Latest`](crate::duration::Aggregation::Latest).
    async fn read(&self) -> HistoryResult<Vec<DurationSample>>;

    /// Reader name (for logging).
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T: HistoryReader + ?Sized> HistoryReader for Box<T> {
    async fn read(&self) -> HistoryResult<Vec<DurationSample>> {
        (**self).read().await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// A boxed, type-erased history reader.
pub type DynHistoryReader = Box<dyn HistoryReader>;

/// Reader used when no report location is configured.
///
/// Every test then gets the default fallback estimate, which spreads tests
/// round-robin.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

#[async_trait]
impl HistoryReader for NoHistory {
    async fn read(&self) -> HistoryResult<Vec<DurationSample>> {
        tracing::info!("No timing history configured, tests will be spread evenly");
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}
