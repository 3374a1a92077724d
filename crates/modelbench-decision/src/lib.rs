//! ModelBench decision pipeline
//!
//! Deterministic input hashing, decision record assembly, and write-behind
//! persistence to the durable-store gateway.

pub mod canonical;
pub mod gateway;
pub mod pipeline;

pub use canonical::{canonicalize, inputs_hash};
pub use gateway::{GatewayClient, GatewayConfig, GatewayHealth};
pub use pipeline::{DecisionPipeline, PipelineConfig, new_decision};
