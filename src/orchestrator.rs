//! Split planning pipeline.
//!
//! Ties the collaborators to the pure core:
//!
//! ```text
//!   TestDiscoverer            HistoryReader
//!        │ discover()              │ read()
//!        ▼                         ▼
//!   Vec<String>            Vec<DurationSample>
//!        │                         │
//!        ▼                         ▼
//!   TestCatalog::build      DurationModel::build_with
//!        │                         │
//!        └──── resolve_durations ──┘
//!                     │
//!                     ▼
//!             ResolvedDurations
//!                     │ partition(n)
//!                     ▼
//!              PartitionResult ──► PartitionReport
//! ```
//!
//! Discovery and history loading run concurrently. Everything after them is
//! synchronous and deterministic: the same identifiers, samples and group
//! count always produce the same plan, whatever order the collaborators
//! returned them in.
//!
//! # Example
//!
//! ```no_run
//! use split_tests::discovery::JavaDiscoverer;
//! use split_tests::duration::ModelOptions;
//! use split_tests::history::JunitReader;
//! use split_tests::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let discoverer = JavaDiscoverer::new(".", Default::default());
//!     let history = JunitReader::new(".", "**/TEST-*.xml");
//!
//!     let orchestrator = Orchestrator::new(discoverer, history, ModelOptions::default());
//!     let plan = orchestrator.run(4).await?;
//!
//!     for group in plan.result.groups() {
//!         println!("{}: {} tests", group.index(), group.len());
//!     }
//!     Ok(())
//! }
//! ```

use tracing::{debug, info};

use crate::catalog::{CatalogError, ResolvedDurations, TestCatalog};
use crate::discovery::{DiscoveryError, TestDiscoverer};
use crate::duration::{DurationError, DurationModel, DurationSample, ModelOptions};
use crate::history::{HistoryError, HistoryReader};
use crate::partition::{self, PartitionError, PartitionResult};
use crate::report::{PartitionReport, format_time};

/// Any failure along the planning pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Duration(#[from] DurationError),

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error("Test discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Loading timing history failed: {0}")]
    History(#[from] HistoryError),
}

/// Every intermediate value of one planning run.
#[derive(Debug, Clone)]
pub struct Plan {
    pub catalog: TestCatalog,
    pub model: DurationModel,
    pub resolved: ResolvedDurations,
    pub result: PartitionResult,
}

impl Plan {
    /// Serializable summary of the partition.
    pub fn report(&self) -> PartitionReport {
        PartitionReport::summarize(&self.result)
    }

    /// Suggests a shard count for this catalog. See
    /// [`partition::optimal_group_count`].
    pub fn optimal_group_count(&self, max_calculations: usize) -> Option<usize> {
        partition::optimal_group_count(&self.resolved, max_calculations)
    }
}

/// Builds a plan from already-collected inputs.
///
/// The group count is checked before anything else, so an invalid count
/// never costs a catalog build.
///
/// # Errors
///
/// Returns the first [`CatalogError`] or [`PartitionError`] encountered.
///
/// # Example
///
/// ```
/// use split_tests::duration::{DurationSample, ModelOptions};
/// use split_tests::orchestrator::plan;
///
/// let samples = vec![
///     DurationSample::from_millis_f64("A", 500.0, "run-1")?,
///     DurationSample::from_millis_f64("B", 500.0, "run-1")?,
///     DurationSample::from_millis_f64("C", 300.0, "run-1")?,
///     DurationSample::from_millis_f64("D", 200.0, "run-1")?,
/// ];
/// let plan = plan(["D", "C", "B", "A"], samples, 2, ModelOptions::default())?;
///
/// let report = plan.report();
/// assert_eq!(report.groups[0].tests, vec!["A", "C"]);
/// assert_eq!(report.groups[1].tests, vec!["B", "D"]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn plan<I, S>(
    identifiers: I,
    samples: Vec<DurationSample>,
    group_count: usize,
    options: ModelOptions,
) -> Result<Plan, SplitError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    partition::validate_group_count(group_count)?;

    let catalog = TestCatalog::build(identifiers)?;
    let model = DurationModel::build_with(samples, options);
    let resolved = catalog.resolve_durations(&model);
    let result = partition::partition(&resolved, group_count)?;

    if let Some(slowest) = result.slowest() {
        info!(
            "Split {} tests into {} groups, slowest group #{:02} takes {}",
            result.test_count(),
            result.len(),
            slowest.index(),
            format_time(slowest.total())
        );
    }
    for group in result.groups() {
        debug!(
            "Group #{:02}: {} tests, {}",
            group.index(),
            group.len(),
            format_time(group.total())
        );
    }

    Ok(Plan {
        catalog,
        model,
        resolved,
        result,
    })
}

/// Runs discovery and history loading, then plans.
pub struct Orchestrator<D, H> {
    discoverer: D,
    history: H,
    options: ModelOptions,
}

impl<D, H> Orchestrator<D, H>
where
    D: TestDiscoverer,
    H: HistoryReader,
{
    /// Creates a new orchestrator.
    pub fn new(discoverer: D, history: H, options: ModelOptions) -> Self {
        Self {
            discoverer,
            history,
            options,
        }
    }

    /// Discovers tests and returns the validated catalog.
    ///
    /// # Errors
    ///
    /// Fails if discovery fails or an identifier is blank.
    pub async fn collect(&self) -> Result<TestCatalog, SplitError> {
        info!("Discovering tests with {} discoverer", self.discoverer.name());
        let identifiers = self.discoverer.discover().await?;
        Ok(TestCatalog::build(identifiers)?)
    }

    /// Discovers tests, loads history and partitions into `group_count`
    /// groups.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionError::InvalidGroupCount`] before doing any I/O if
    /// `group_count` is zero. Otherwise the first collaborator or
    /// validation failure.
    pub async fn run(&self, group_count: usize) -> Result<Plan, SplitError> {
        partition::validate_group_count(group_count)?;

        info!(
            "Discovering tests with {} discoverer, loading history with {} reader",
            self.discoverer.name(),
            self.history.name()
        );
        let (identifiers, samples) =
            tokio::join!(self.discoverer.discover(), self.history.read());
        let identifiers = identifiers?;
        let samples = samples?;

        info!(
            "Found {} tests and {} timing samples",
            identifiers.len(),
            samples.len()
        );
        plan(identifiers, samples, group_count, self.options)
    }
}
