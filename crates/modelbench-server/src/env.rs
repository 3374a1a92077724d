//! Startup environment snapshot
//!
//! The process refuses to start unless every required variable is present
//! and the deployment coordinates match this build. The snapshot is taken
//! once; nothing else reads the environment at runtime except provider key
//! resolution in the wire layer.

use modelbench_core::{Error, Result};

pub const REQUIRED_PHASE: &str = "phase1";
pub const REQUIRED_LAYER: &str = "layer1";

#[derive(Debug, Clone)]
pub struct EnvSnapshot {
    pub ruvector_service_url: String,
    pub ruvector_api_key: String,
    pub agent_name: String,
    pub agent_domain: String,
    pub agent_phase: String,
    pub agent_layer: String,
}

fn require(name: &str, missing: &mut Vec<String>) -> String {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => {
            missing.push(name.to_string());
            String::new()
        }
    }
}

impl EnvSnapshot {
    pub fn from_env() -> Result<Self> {
        let mut missing = Vec::new();
        let snapshot = Self {
            ruvector_service_url: require("RUVECTOR_SERVICE_URL", &mut missing),
            ruvector_api_key: require("RUVECTOR_API_KEY", &mut missing),
            agent_name: require("AGENT_NAME", &mut missing),
            agent_domain: require("AGENT_DOMAIN", &mut missing),
            agent_phase: require("AGENT_PHASE", &mut missing),
            agent_layer: require("AGENT_LAYER", &mut missing),
        };
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required environment: {}",
                missing.join(", ")
            )));
        }
        if snapshot.agent_phase != REQUIRED_PHASE {
            return Err(Error::Config(format!(
                "AGENT_PHASE must be {}, got {}",
                REQUIRED_PHASE, snapshot.agent_phase
            )));
        }
        if snapshot.agent_layer != REQUIRED_LAYER {
            return Err(Error::Config(format!(
                "AGENT_LAYER must be {}, got {}",
                REQUIRED_LAYER, snapshot.agent_layer
            )));
        }
        Ok(snapshot)
    }
}
