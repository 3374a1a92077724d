//! ModelBench observability
//!
//! - Structured logging via `tracing` with env-filter configuration
//! - Prometheus metrics for agent requests, decisions, and persistence
//! - The `/metrics` scrape endpoint

pub mod logging;
pub mod metrics;

pub use logging::{LogFormat, init_tracing};
pub use metrics::{Metrics, metrics_router};
