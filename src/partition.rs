//! Balanced partitioning of tests into shards.
//!
//! Uses the Longest-Processing-Time-first greedy heuristic: tests are
//! sorted by estimate (slowest first) and each one is handed to the shard
//! with the smallest running total. The result is within
//! `4/3 - 1/(3·groups)` of the optimal makespan.
//!
//! # Determinism
//!
//! Every ordering decision has a total tie-break, so identical inputs
//! always produce an identical [`PartitionResult`] regardless of the order
//! in which tests were discovered:
//!
//! | Decision | Primary key | Tie-breaks |
//! |----------|-------------|------------|
//! | Test order | estimate, descending | identifier, ascending |
//! | Target group | running total, ascending | group index, ascending |
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use split_tests::catalog::{ResolvedDurations, TestId};
//! use split_tests::partition::partition;
//!
//! let resolved = ResolvedDurations::from_estimates(
//!     [("A", 500), ("B", 500), ("C", 300), ("D", 200)]
//!         .map(|(id, ms)| (TestId::parse(id).unwrap(), Duration::from_millis(ms))),
//! );
//!
//! let result = partition(&resolved, 2)?;
//! let names = |i: usize| {
//!     result.groups()[i].tests().iter().map(|t| t.as_str()).collect::<Vec<_>>()
//! };
//! assert_eq!(names(0), ["A", "C"]);
//! assert_eq!(names(1), ["B", "D"]);
//! assert_eq!(result.max_total(), Duration::from_millis(800));
//! # Ok::<(), split_tests::partition::PartitionError>(())
//! ```

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::catalog::{ResolvedDurations, TestId};
use crate::report::format_time;

/// Errors raised by the partitioner.
#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    /// The requested number of groups was zero.
    #[error("Invalid group count {0}: at least one group is required")]
    InvalidGroupCount(usize),
}

/// One shard: the tests assigned to it, in assignment order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    index: usize,
    tests: Vec<TestId>,
    total: Duration,
}

impl Group {
    fn new(index: usize) -> Self {
        Self {
            index,
            tests: Vec::new(),
            total: Duration::ZERO,
        }
    }

    fn add(&mut self, id: TestId, estimate: Duration) {
        self.tests.push(id);
        self.total += estimate;
    }

    /// Zero-based group index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Assigned tests, slowest first.
    pub fn tests(&self) -> &[TestId] {
        &self.tests
    }

    /// Sum of the estimates of the assigned tests.
    pub fn total(&self) -> Duration {
        self.total
    }

    /// Number of assigned tests.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns `true` if nothing was assigned to this group.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

/// The outcome of one partitioning pass.
///
/// Always holds at least one group. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionResult {
    groups: Vec<Group>,
}

impl PartitionResult {
    /// All groups, ordered by index.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Looks up a group by index.
    pub fn group(&self, index: usize) -> Option<&Group> {
        self.groups.get(index)
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Always `false`; a result has at least one group.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of tests across all groups.
    pub fn test_count(&self) -> usize {
        self.groups.iter().map(Group::len).sum()
    }

    /// Sum of all group totals.
    pub fn total(&self) -> Duration {
        self.groups.iter().map(Group::total).sum()
    }

    /// Largest group total (the makespan).
    pub fn max_total(&self) -> Duration {
        self.groups.iter().map(Group::total).max().unwrap_or_default()
    }

    /// Smallest group total.
    pub fn min_total(&self) -> Duration {
        self.groups.iter().map(Group::total).min().unwrap_or_default()
    }

    /// Average group total.
    pub fn mean_total(&self) -> Duration {
        if self.groups.is_empty() {
            return Duration::ZERO;
        }
        let nanos = self.total().as_nanos() / self.groups.len() as u128;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Difference between the slowest and fastest group.
    pub fn spread(&self) -> Duration {
        self.max_total() - self.min_total()
    }

    /// Ratio of the largest to the smallest group total.
    ///
    /// `1.0` when every group is empty (or all totals are zero), and
    /// `f64::INFINITY` when some group has no work while another does.
    pub fn imbalance_ratio(&self) -> f64 {
        let max = self.max_total();
        let min = self.min_total();
        if max.is_zero() {
            1.0
        } else if min.is_zero() {
            f64::INFINITY
        } else {
            max.as_secs_f64() / min.as_secs_f64()
        }
    }

    /// The group with the smallest total (ties: fewer tests, lower index).
    pub fn fastest(&self) -> Option<&Group> {
        self.groups
            .iter()
            .min_by_key(|g| (g.total, g.tests.len(), g.index))
    }

    /// The group with the largest total (ties: more tests, higher index).
    pub fn slowest(&self) -> Option<&Group> {
        self.groups
            .iter()
            .max_by_key(|g| (g.total, g.tests.len(), g.index))
    }
}

/// Rejects a group count of zero.
///
/// # Errors
///
/// Returns [`PartitionError::InvalidGroupCount`] if `group_count` is zero.
pub fn validate_group_count(group_count: usize) -> Result<(), PartitionError> {
    if group_count == 0 {
        return Err(PartitionError::InvalidGroupCount(group_count));
    }
    Ok(())
}

/// Distributes resolved tests across `group_count` groups.
///
/// Surplus groups (more groups than tests) stay empty. An empty input
/// yields `group_count` empty groups.
///
/// # Errors
///
/// Returns [`PartitionError::InvalidGroupCount`] if `group_count` is zero.
/// Nothing is partitioned in that case.
pub fn partition(
    resolved: &ResolvedDurations,
    group_count: usize,
) -> Result<PartitionResult, PartitionError> {
    validate_group_count(group_count)?;
    debug!("Splitting {} tests into {} groups", resolved.len(), group_count);
    Ok(assign(resolved, group_count))
}

fn assign(resolved: &ResolvedDurations, group_count: usize) -> PartitionResult {
    let mut ordered: Vec<(&TestId, Duration)> = resolved.iter().collect();
    ordered.sort_by(|(a_id, a), (b_id, b)| b.cmp(a).then_with(|| a_id.cmp(b_id)));

    let mut groups: Vec<Group> = (0..group_count).map(Group::new).collect();

    // Min-heap keyed on (total, index); every key is unique.
    let mut loads: BinaryHeap<Reverse<(Duration, usize)>> = groups
        .iter()
        .map(|g| Reverse((g.total, g.index)))
        .collect();

    for (id, estimate) in ordered {
        let Some(Reverse((_, index))) = loads.pop() else {
            break;
        };
        let group = &mut groups[index];
        debug!("Adding test {} to group #{:02}", id, index);
        group.add(id.clone(), estimate);
        loads.push(Reverse((group.total, group.index)));
    }

    PartitionResult { groups }
}

/// Finds the smallest group count beyond which adding groups stops
/// reducing the slowest group's total.
///
/// Partitions with 1, 2, 3, … groups and stops as soon as the makespan no
/// longer shrinks. Returns `None` if `max_calculations` group counts were
/// tried without reaching that point.
///
/// ```
/// use std::time::Duration;
/// use split_tests::catalog::{ResolvedDurations, TestId};
/// use split_tests::partition::optimal_group_count;
///
/// // One test dominates: beyond two groups nothing gets faster.
/// let resolved = ResolvedDurations::from_estimates(
///     [("Slow", 100), ("A", 10), ("B", 10)]
///         .map(|(id, s)| (TestId::parse(id).unwrap(), Duration::from_secs(s))),
/// );
/// assert_eq!(optimal_group_count(&resolved, 50), Some(2));
/// assert_eq!(optimal_group_count(&resolved, 1), None);
/// ```
pub fn optimal_group_count(resolved: &ResolvedDurations, max_calculations: usize) -> Option<usize> {
    let mut group_count = 1;
    let mut last_slowest: Option<Duration> = None;

    loop {
        let slowest = assign(resolved, group_count).max_total();
        if last_slowest == Some(slowest) {
            let optimal = group_count - 1;
            info!("The optimal group count for this test suite is {}", optimal);
            return Some(optimal);
        }
        debug!(
            "The slowest group with {} groups takes {}",
            group_count,
            format_time(slowest)
        );
        if group_count >= max_calculations {
            warn!(
                "{} calculations were not enough to find the optimal group count",
                max_calculations
            );
            return None;
        }
        group_count += 1;
        last_slowest = Some(slowest);
    }
}
