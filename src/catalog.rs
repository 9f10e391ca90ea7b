//! Test catalog construction and duration resolution.
//!
//! The catalog is the deduplicated, ordered set of test identifiers that
//! will be distributed across shards. It is built from the raw strings a
//! [`TestDiscoverer`](crate::discovery::TestDiscoverer) produces and joined
//! with a [`DurationModel`] to give every entry exactly one estimate.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use split_tests::catalog::TestCatalog;
//! use split_tests::duration::{DurationModel, DurationSample};
//!
//! let catalog = TestCatalog::build(["com.example.FooTest", "com.example.BarTest"])?;
//! let samples = vec![DurationSample::from_secs_f64("com.example.FooTest", 4.0, "TEST-foo.xml")?];
//! let model = DurationModel::build(samples);
//!
//! let resolved = catalog.resolve_durations(&model);
//! assert_eq!(resolved.len(), 2);
//! assert_eq!(resolved.fallback_count(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::duration::DurationModel;
use crate::report::format_time;

/// Errors raised while building a [`TestCatalog`].
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// An identifier was empty or contained only whitespace.
    #[error("Invalid test identifier at position {position}: identifier is empty")]
    InvalidIdentifier { position: usize },
}

/// Stable key naming one schedulable test unit.
///
/// Usually a fully-qualified class name, optionally with a method suffix.
/// Surrounding whitespace is trimmed on construction; comparison is
/// case-sensitive and byte-wise, so ordering never depends on locale.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TestId(String);

impl TestId {
    /// Parses a raw identifier, returning `None` if it is blank.
    ///
    /// ```
    /// use split_tests::catalog::TestId;
    ///
    /// assert_eq!(TestId::parse("  a.b.CTest ").unwrap().as_str(), "a.b.CTest");
    /// assert!(TestId::parse(" \t").is_none());
    /// ```
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Returns the canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TestId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The ordered, deduplicated set of tests to schedule.
///
/// Order is discovery order. It only matters for reproducing log output;
/// the partitioner re-sorts entries deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestCatalog {
    ids: Vec<TestId>,
}

impl TestCatalog {
    /// Builds a catalog from raw identifier strings.
    ///
    /// Duplicates keep their first position. Any blank entry aborts the
    /// whole build.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidIdentifier`] with the zero-based input
    /// position of the first blank entry.
    pub fn build<I, S>(raw: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();

        for (position, entry) in raw.into_iter().enumerate() {
            let id = TestId::parse(entry.as_ref())
                .ok_or(CatalogError::InvalidIdentifier { position })?;
            if seen.insert(id.clone()) {
                ids.push(id);
            } else {
                debug!("Ignoring duplicate test {}", id);
            }
        }

        if ids.is_empty() {
            warn!("Test catalog is empty; every shard will be empty");
        }

        Ok(Self { ids })
    }

    /// Number of tests in the catalog.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if no tests were discovered.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterates over the identifiers in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &TestId> {
        self.ids.iter()
    }

    /// Returns `true` if the catalog contains the given identifier.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|candidate| candidate.as_str() == id)
    }

    /// Joins the catalog with a duration model.
    ///
    /// The join is total: identifiers without history receive the fallback
    /// estimate, computed over the catalog entries that do have history.
    /// History for tests that are no longer in the catalog is ignored, both
    /// for scheduling and for the fallback.
    pub fn resolve_durations(&self, model: &DurationModel) -> ResolvedDurations {
        let known: HashSet<&str> = self.ids.iter().map(TestId::as_str).collect();
        for (id, _) in model.iter() {
            if !known.contains(id.as_str()) {
                debug!("Skipping test {} from history (not in catalog)", id);
            }
        }

        let fallback = model.fallback_for(self.ids.iter());
        let mut fallback_count = 0;
        let entries: Vec<(TestId, Duration)> = self
            .ids
            .iter()
            .map(|id| match model.estimate(id.as_str()) {
                Some(estimate) => (id.clone(), estimate),
                None => {
                    fallback_count += 1;
                    debug!("Test {} has no history, estimating {}", id, format_time(fallback));
                    (id.clone(), fallback)
                }
            })
            .collect();

        if fallback_count > 0 && !model.is_empty() {
            info!(
                "Estimating {} for {} tests without history",
                format_time(fallback),
                fallback_count
            );
        }

        ResolvedDurations {
            entries,
            fallback_count,
        }
    }
}

/// Every catalog entry paired with the estimate the partitioner will use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedDurations {
    entries: Vec<(TestId, Duration)>,
    fallback_count: usize,
}

impl ResolvedDurations {
    /// Creates resolved durations from explicit estimates.
    ///
    /// Duplicate identifiers keep their first estimate. Use this when the
    /// estimates come from somewhere other than a [`DurationModel`].
    pub fn from_estimates<I>(estimates: I) -> Self
    where
        I: IntoIterator<Item = (TestId, Duration)>,
    {
        let mut seen = HashSet::new();
        let entries = estimates
            .into_iter()
            .filter(|(id, _)| seen.insert(id.clone()))
            .collect();
        Self {
            entries,
            fallback_count: 0,
        }
    }

    /// Number of resolved tests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there is nothing to schedule.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many entries received the fallback estimate.
    pub fn fallback_count(&self) -> usize {
        self.fallback_count
    }

    /// Looks up the estimate for one identifier.
    pub fn get(&self, id: &str) -> Option<Duration> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate.as_str() == id)
            .map(|(_, estimate)| *estimate)
    }

    /// Iterates over `(identifier, estimate)` pairs in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (&TestId, Duration)> {
        self.entries.iter().map(|(id, estimate)| (id, *estimate))
    }

    /// Sum of all estimates.
    pub fn total(&self) -> Duration {
        self.entries.iter().map(|(_, estimate)| *estimate).sum()
    }
}
