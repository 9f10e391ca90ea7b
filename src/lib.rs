//! split-tests: balanced CI test sharding from historical timings.
//!
//! Splits a test suite into N shards of roughly equal wall-clock time so
//! that parallel CI jobs finish together. Each job runs the same command
//! with its own shard index and gets its own share of the tests.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Discovery**: Find the tests a project contains (Java sources, generic command)
//! - **History**: Load past execution times (JUnit XML reports)
//! - **Duration**: Collapse samples into one estimate per test, with a fallback for new tests
//! - **Catalog**: Validate and deduplicate identifiers, then join them with estimates
//! - **Partition**: Assign tests to shards with the longest-processing-time-first heuristic
//! - **Report**: Summarize, print and persist the plan
//!
//! Everything from the catalog onwards is synchronous, pure and
//! deterministic.
//!
//! # Example
//!
//! ```
//! use split_tests::duration::{DurationSample, ModelOptions};
//! use split_tests::orchestrator::plan;
//!
//! let samples = vec![
//!     DurationSample::from_secs_f64("a.SlowTest", 90.0, "TEST-a.SlowTest.xml")?,
//!     DurationSample::from_secs_f64("a.FastTest", 1.0, "TEST-a.FastTest.xml")?,
//! ];
//! // a.NewTest has no history and is estimated at the median, 45.5s.
//! let plan = plan(["a.SlowTest", "a.FastTest", "a.NewTest"], samples, 2, ModelOptions::default())?;
//!
//! assert_eq!(plan.result.group(0).unwrap().len(), 1);
//! assert_eq!(plan.result.group(1).unwrap().len(), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod catalog;
pub mod config;
pub mod discovery;
pub mod duration;
pub mod history;
pub mod orchestrator;
pub mod partition;
pub mod report;

// Re-export commonly used types
pub use catalog::{TestCatalog, TestId};
pub use config::{Config, load_config};
pub use discovery::TestDiscoverer;
pub use duration::{DurationModel, DurationSample};
pub use history::HistoryReader;
pub use orchestrator::{Orchestrator, Plan, SplitError};
pub use partition::{PartitionResult, partition};
pub use report::PartitionReport;
