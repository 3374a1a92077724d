//! Job plans: what the executor is given

use crate::types::{ExecutionConfig, ProviderTarget, TestCase};
use crate::validate::{ValidationError, Validator};
use serde::{Deserialize, Serialize};

/// Order in which `(target, test, iteration)` tuples are queued.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriorityOrder {
    #[default]
    ByTargetThenTest,
    ByTestThenTarget,
    Interleaved,
}

/// A complete evaluation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobPlan {
    pub targets: Vec<ProviderTarget>,
    pub tests: Vec<TestCase>,
    #[serde(default)]
    pub config: ExecutionConfig,
    #[serde(default)]
    pub priority_order: PriorityOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl JobPlan {
    pub fn new(targets: Vec<ProviderTarget>, tests: Vec<TestCase>, config: ExecutionConfig) -> Self {
        Self {
            targets,
            tests,
            config,
            priority_order: PriorityOrder::default(),
            correlation_id: None,
        }
    }

    /// Total main-phase work items (excludes warm-up).
    pub fn work_item_count(&self) -> u64 {
        self.targets.len() as u64
            * self.tests.len() as u64
            * u64::from(self.config.iterations_per_test)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();
        v.require(!self.targets.is_empty(), "targets", "must not be empty");
        v.require(!self.tests.is_empty(), "tests", "must not be empty");
        for (i, target) in self.targets.iter().enumerate() {
            v.nested(&format!("targets[{}]", i), target.validate());
        }
        for (i, test) in self.tests.iter().enumerate() {
            v.nested(&format!("tests[{}]", i), test.validate());
        }
        v.nested("config", self.config.validate());
        v.finish()
    }
}
