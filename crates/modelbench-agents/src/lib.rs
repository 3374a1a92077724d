//! ModelBench evaluation agents
//!
//! Thirteen thin strategies over the shared executor, statistics, and
//! similarity kernels. Every agent exposes a fixed I/O contract, validates
//! its input by hand, and emits exactly one decision record per
//! invocation through the write-behind pipeline.

pub mod adversarial;
pub mod benchmark;
pub mod bias;
pub mod comparator;
pub mod consistency;
pub mod faithfulness;
pub mod golden;
pub mod hallucination;
pub mod quality;
pub mod registry;
pub mod regression;
pub mod sensitivity;
pub mod stress;
pub mod synthetic;

pub use registry::{Agent, AgentContext, AgentOutcome, AgentRegistry};

use modelbench_core::{Error, Result, ValidationError};
use serde::de::DeserializeOwned;

/// Parse an agent input body; malformed JSON shapes surface as validation
/// errors so the boundary can answer 400.
pub(crate) fn parse_input<T: DeserializeOwned>(input: &serde_json::Value) -> Result<T> {
    serde_json::from_value(input.clone())
        .map_err(|e| Error::Validation(ValidationError::single("input", e.to_string())))
}
