//! Agent trait, shared context, and the dispatch registry

use async_trait::async_trait;
use modelbench_core::{ConfidenceFactor, Constraint, Result};
use modelbench_decision::{DecisionPipeline, new_decision};
use modelbench_executor::Executor;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// What a successful agent invocation returns to the HTTP surface.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub decision_id: String,
    pub data: Value,
}

/// Dependencies threaded through every agent constructor. Nothing here is
/// process-global: tests build their own context around stub connectors
/// and a mock gateway.
#[derive(Clone)]
pub struct AgentContext {
    pub executor: Arc<Executor>,
    pub pipeline: Arc<DecisionPipeline>,
}

impl AgentContext {
    pub fn new(executor: Arc<Executor>, pipeline: Arc<DecisionPipeline>) -> Self {
        Self { executor, pipeline }
    }

    /// Build the decision record for one agent run, emit it through the
    /// pipeline, and hand the caller its id plus the output payload.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn emit(
        &self,
        agent_id: &'static str,
        agent_version: &'static str,
        decision_type: &'static str,
        inputs: &Value,
        inputs_summary: Value,
        outputs: Value,
        confidence_factors: Vec<ConfidenceFactor>,
        constraints_applied: Vec<Constraint>,
        started: Instant,
    ) -> AgentOutcome {
        let record = new_decision(
            agent_id,
            agent_version,
            decision_type,
            inputs,
            inputs_summary,
            outputs.clone(),
            confidence_factors,
            constraints_applied,
            started.elapsed().as_millis() as u64,
        );
        let decision_id = record.decision_id.clone();
        self.pipeline.emit(record);
        AgentOutcome { decision_id, data: outputs }
    }
}

/// A named evaluation strategy with a fixed I/O contract.
#[async_trait]
pub trait Agent: Send + Sync {
    fn agent_id(&self) -> &'static str;

    fn agent_version(&self) -> &'static str {
        "1.0.0"
    }

    fn decision_type(&self) -> &'static str;

    /// Run one evaluation. Exactly one decision record is emitted on
    /// success; validation failures emit nothing.
    async fn handle(&self, input: Value) -> Result<AgentOutcome>;
}

/// Maps agent ids to implementations for the dispatch server.
pub struct AgentRegistry {
    agents: BTreeMap<&'static str, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn empty() -> Self {
        Self {
            agents: BTreeMap::new(),
        }
    }

    /// All thirteen evaluation agents over one shared context.
    pub fn with_default_agents(ctx: AgentContext) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(crate::benchmark::BenchmarkAgent::new(ctx.clone())));
        registry.register(Arc::new(crate::consistency::ConsistencyAgent::new(
            ctx.clone(),
        )));
        registry.register(Arc::new(crate::sensitivity::SensitivityAgent::new(
            ctx.clone(),
        )));
        registry.register(Arc::new(crate::golden::GoldenDatasetAgent::new(ctx.clone())));
        registry.register(Arc::new(crate::hallucination::HallucinationAgent::new(
            ctx.clone(),
        )));
        registry.register(Arc::new(crate::regression::RegressionAgent::new(ctx.clone())));
        registry.register(Arc::new(crate::comparator::ComparatorAgent::new(ctx.clone())));
        registry.register(Arc::new(crate::bias::BiasAgent::new(ctx.clone())));
        registry.register(Arc::new(crate::faithfulness::FaithfulnessAgent::new(
            ctx.clone(),
        )));
        registry.register(Arc::new(crate::quality::QualityAgent::new(ctx.clone())));
        registry.register(Arc::new(crate::adversarial::AdversarialAgent::new(
            ctx.clone(),
        )));
        registry.register(Arc::new(crate::synthetic::SyntheticDataAgent::new(
            ctx.clone(),
        )));
        registry.register(Arc::new(crate::stress::StressTestAgent::new(ctx)));
        registry
    }

    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.agent_id(), agent);
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(agent_id).cloned()
    }

    /// Registered ids in stable order.
    pub fn ids(&self) -> Vec<&'static str> {
        self.agents.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
