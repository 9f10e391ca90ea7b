//! Historical duration model.
//!
//! Turns raw [`DurationSample`]s from past test runs into one estimate per
//! test identifier, plus a fallback estimate for tests with no history.
//!
//! # Policies
//!
//! | Setting | Values | Default |
//! |---------|--------|---------|
//! | [`Aggregation`] | `max`, `mean`, `latest` | `max` |
//! | [`NewTestTime`] | `median`, `average`, `min`, `max`, `zero` | `median` |
//!
//! Taking the maximum sample biases the plan toward worst-case shard time
//! rather than an optimistic average.
//!
//! The fallback is computed over the tests that are actually being
//! scheduled ([`DurationModel::fallback_for`]), so history left behind by
//! deleted tests never skews it. When none of them has history the fallback
//! is always [`DEFAULT_FALLBACK`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::TestId;
use crate::report::format_time;

/// Fallback estimate used when no test in the run has any history.
pub const DEFAULT_FALLBACK: Duration = Duration::from_millis(1);

/// Errors raised while turning report values into samples.
#[derive(Debug, thiserror::Error)]
pub enum DurationError {
    /// A sample was negative, non-finite, unparsable or unnamed.
    #[error("Malformed report {origin}: {reason}")]
    MalformedReport { origin: String, reason: String },
}

impl DurationError {
    pub(crate) fn malformed(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        DurationError::MalformedReport {
            origin: origin.into(),
            reason: reason.into(),
        }
    }
}

/// One observed execution time for a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationSample {
    /// The test the sample belongs to.
    pub id: TestId,

    /// Observed execution time.
    pub duration: Duration,

    /// Where the sample came from (usually a report file path).
    pub origin: String,
}

impl DurationSample {
    /// Creates a sample from an already-validated duration.
    ///
    /// # Errors
    ///
    /// Returns [`DurationError::MalformedReport`] if `id` is blank.
    pub fn new(
        id: &str,
        duration: Duration,
        origin: impl Into<String>,
    ) -> Result<Self, DurationError> {
        let origin = origin.into();
        let id = TestId::parse(id)
            .ok_or_else(|| DurationError::malformed(origin.clone(), "test name is empty"))?;
        Ok(Self {
            id,
            duration,
            origin,
        })
    }

    /// Creates a sample from fractional seconds, as JUnit reports record them.
    ///
    /// # Errors
    ///
    /// Returns [`DurationError::MalformedReport`] for negative, NaN or
    /// infinite values, or a blank `id`.
    ///
    /// ```
    /// use split_tests::duration::DurationSample;
    ///
    /// let sample = DurationSample::from_secs_f64("a.FooTest", 1.5, "TEST-a.FooTest.xml")?;
    /// assert_eq!(sample.duration.as_millis(), 1500);
    /// assert!(DurationSample::from_secs_f64("a.FooTest", -1.0, "x.xml").is_err());
    /// assert!(DurationSample::from_secs_f64("a.FooTest", f64::NAN, "x.xml").is_err());
    /// # Ok::<(), split_tests::duration::DurationError>(())
    /// ```
    pub fn from_secs_f64(
        id: &str,
        secs: f64,
        origin: impl Into<String>,
    ) -> Result<Self, DurationError> {
        let origin = origin.into();
        let duration = checked_secs(secs).ok_or_else(|| {
            DurationError::malformed(
                origin.clone(),
                format!("invalid duration {} for test {}", secs, id.trim()),
            )
        })?;
        Self::new(id, duration, origin)
    }

    /// Creates a sample from fractional milliseconds.
    ///
    /// # Errors
    ///
    /// Same as [`from_secs_f64`](Self::from_secs_f64).
    pub fn from_millis_f64(
        id: &str,
        millis: f64,
        origin: impl Into<String>,
    ) -> Result<Self, DurationError> {
        let origin = origin.into();
        let duration = checked_secs(millis / 1000.0).ok_or_else(|| {
            DurationError::malformed(
                origin.clone(),
                format!("invalid duration {}ms for test {}", millis, id.trim()),
            )
        })?;
        Self::new(id, duration, origin)
    }
}

fn checked_secs(secs: f64) -> Option<Duration> {
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    // abs() folds -0.0 into 0.0
    Duration::try_from_secs_f64(secs.abs()).ok()
}

/// How multiple samples for the same test collapse into one estimate.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Slowest observed run.
    #[default]
    Max,
    /// Arithmetic mean of all runs.
    Mean,
    /// Last sample in input order.
    Latest,
}

/// Estimate given to tests that have no history.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum NewTestTime {
    /// Median of all known estimates.
    #[default]
    Median,
    /// Mean of all known estimates.
    Average,
    /// Fastest known estimate.
    Min,
    /// Slowest known estimate.
    Max,
    /// Zero; new tests are treated as free.
    Zero,
}

/// Policy knobs for [`DurationModel::build_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelOptions {
    pub aggregation: Aggregation,
    pub new_test_time: NewTestTime,
}

/// Per-test duration estimates derived from historical samples.
///
/// Built once per invocation and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationModel {
    estimates: BTreeMap<TestId, Duration>,
    new_test_time: NewTestTime,
}

impl DurationModel {
    /// Builds a model with the default policies (max, median fallback).
    ///
    /// ```
    /// use std::time::Duration;
    /// use split_tests::duration::{DurationModel, DurationSample};
    ///
    /// let model = DurationModel::build(vec![
    ///     DurationSample::from_secs_f64("a.ATest", 2.0, "run1")?,
    ///     DurationSample::from_secs_f64("a.ATest", 5.0, "run2")?,
    ///     DurationSample::from_secs_f64("a.BTest", 1.0, "run1")?,
    /// ]);
    ///
    /// assert_eq!(model.estimate("a.ATest"), Some(Duration::from_secs(5)));
    /// assert_eq!(model.fallback(), Duration::from_secs(3));
    /// # Ok::<(), split_tests::duration::DurationError>(())
    /// ```
    pub fn build(samples: impl IntoIterator<Item = DurationSample>) -> Self {
        Self::build_with(samples, ModelOptions::default())
    }

    /// Builds a model with explicit aggregation and fallback policies.
    pub fn build_with(
        samples: impl IntoIterator<Item = DurationSample>,
        options: ModelOptions,
    ) -> Self {
        let mut grouped: BTreeMap<TestId, Vec<Duration>> = BTreeMap::new();
        for sample in samples {
            debug!(
                "Recorded {} [{}] from {}",
                sample.id,
                format_time(sample.duration),
                sample.origin
            );
            grouped.entry(sample.id).or_default().push(sample.duration);
        }

        let estimates: BTreeMap<TestId, Duration> = grouped
            .into_iter()
            .map(|(id, durations)| {
                let estimate = aggregate(&durations, options.aggregation);
                (id, estimate)
            })
            .collect();

        if estimates.is_empty() {
            info!(
                "No test history available, estimating {} for every test",
                format_time(DEFAULT_FALLBACK)
            );
        }

        let model = Self {
            estimates,
            new_test_time: options.new_test_time,
        };
        if let (Some((fastest, fast)), Some((slowest, slow))) = (model.fastest(), model.slowest())
        {
            debug!(
                "Found {} tests with history; fastest {} ({}), slowest {} ({})",
                model.len(),
                fastest,
                format_time(fast),
                slowest,
                format_time(slow)
            );
        }
        model
    }

    /// Returns the estimate for a test with history.
    pub fn estimate(&self, id: &str) -> Option<Duration> {
        self.estimates.get(id).copied()
    }

    /// Fallback over every test with history.
    pub fn fallback(&self) -> Duration {
        self.fallback_for(self.estimates.keys())
    }

    /// Estimate for tests without history, derived from the given tests
    /// that do have history.
    ///
    /// Identifiers without history are skipped. If none has history the
    /// result is [`DEFAULT_FALLBACK`].
    ///
    /// ```
    /// use std::time::Duration;
    /// use split_tests::catalog::TestCatalog;
    /// use split_tests::duration::{DurationModel, DurationSample};
    ///
    /// let model = DurationModel::build(vec![
    ///     DurationSample::from_secs_f64("a.ATest", 1.0, "run1")?,
    ///     DurationSample::from_secs_f64("a.BTest", 3.0, "run1")?,
    ///     DurationSample::from_secs_f64("a.GoneTest", 100.0, "run1")?,
    /// ]);
    /// let catalog = TestCatalog::build(["a.ATest", "a.BTest", "a.NewTest"])?;
    ///
    /// assert_eq!(model.fallback_for(catalog.iter()), Duration::from_secs(2));
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn fallback_for<'a>(&self, ids: impl IntoIterator<Item = &'a TestId>) -> Duration {
        let known: Vec<Duration> = ids
            .into_iter()
            .filter_map(|id| self.estimates.get(id).copied())
            .collect();
        fallback_estimate(known, self.new_test_time)
    }

    /// Number of tests with history.
    pub fn len(&self) -> usize {
        self.estimates.len()
    }

    /// Returns `true` if no test has history.
    pub fn is_empty(&self) -> bool {
        self.estimates.is_empty()
    }

    /// Iterates over known estimates in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&TestId, Duration)> {
        self.estimates.iter().map(|(id, estimate)| (id, *estimate))
    }

    /// Test with the smallest estimate; ties go to the smaller identifier.
    pub fn fastest(&self) -> Option<(&TestId, Duration)> {
        self.iter().min_by_key(|(id, estimate)| (*estimate, *id))
    }

    /// Test with the largest estimate; ties go to the smaller identifier.
    pub fn slowest(&self) -> Option<(&TestId, Duration)> {
        self.iter()
            .min_by(|(a_id, a), (b_id, b)| b.cmp(a).then_with(|| a_id.cmp(b_id)))
    }
}

fn aggregate(durations: &[Duration], aggregation: Aggregation) -> Duration {
    match aggregation {
        Aggregation::Max => durations.iter().copied().max().unwrap_or_default(),
        Aggregation::Mean => mean(durations),
        Aggregation::Latest => durations.last().copied().unwrap_or_default(),
    }
}

fn fallback_estimate(mut values: Vec<Duration>, policy: NewTestTime) -> Duration {
    if values.is_empty() {
        return DEFAULT_FALLBACK;
    }
    values.sort_unstable();

    match policy {
        NewTestTime::Median => median(&values),
        NewTestTime::Average => mean(&values),
        NewTestTime::Min => values.first().copied().unwrap_or_default(),
        NewTestTime::Max => values.last().copied().unwrap_or_default(),
        NewTestTime::Zero => Duration::ZERO,
    }
}

/// Median of a sorted slice; even lengths average the two middle values.
fn median(sorted: &[Duration]) -> Duration {
    let len = sorted.len();
    if len == 0 {
        return Duration::ZERO;
    }
    let mid = len / 2;
    if len % 2 == 1 {
        sorted[mid]
    } else {
        mean(&sorted[mid - 1..=mid])
    }
}

fn mean(durations: &[Duration]) -> Duration {
    if durations.is_empty() {
        return Duration::ZERO;
    }
    let total: u128 = durations.iter().map(Duration::as_nanos).sum();
    let nanos = total / durations.len() as u128;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}
