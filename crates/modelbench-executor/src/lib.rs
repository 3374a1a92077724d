//! ModelBench executor
//!
//! Fan-out execution of evaluation jobs: an ordered work queue, a bounded
//! worker pool, executor-owned retry with jittered backoff, budget
//! enforcement, fail-fast cancellation, per-target quarantine, and the
//! reduction of outcomes into an aggregated job report.

pub mod aggregate;
pub mod budget;
pub mod executor;
pub mod schedule;
pub mod target_state;

pub use aggregate::{aggregate, build_report};
pub use budget::Budget;
pub use executor::{ConnectorFactory, Executor, WireConnectorFactory};
pub use schedule::{WorkItem, work_items};
pub use target_state::{Phase, TargetState};
