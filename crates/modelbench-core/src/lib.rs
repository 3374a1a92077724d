//! ModelBench Core
//!
//! Shared data model for the evaluation harness:
//! - Provider targets, test cases, and execution configuration
//! - Call outcomes and aggregated job reports
//! - Decision records for the audit trail
//! - Error taxonomy and boundary validation

pub mod cache;
pub mod decision;
pub mod error;
pub mod outcome;
pub mod plan;
pub mod report;
pub mod types;
pub mod validate;

pub use cache::TtlCache;
pub use decision::{
    ConfidenceFactor, Constraint, DecisionRecord, ExecutionRef, TelemetryEvent,
};
pub use error::{Error, Result};
pub use outcome::{CallOutcome, ErrorKind, FinishReason, TargetRef};
pub use plan::{JobPlan, PriorityOrder};
pub use report::{AggregatedStats, GroupStats, JobReport};
pub use types::{ExecutionConfig, ProviderName, ProviderTarget, TestCase};
pub use validate::{FieldError, ValidationError, Validator};
