//! Work-queue ordering

use modelbench_core::{JobPlan, PriorityOrder};

/// One unit of work: indices into the plan's targets and tests plus the
/// iteration number, which stays authoritative even when workers finish
/// out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub target_idx: usize,
    pub test_idx: usize,
    pub iteration: u32,
}

/// Materialize the plan's work queue in the order `priority_order` dictates.
pub fn work_items(plan: &JobPlan) -> Vec<WorkItem> {
    let iterations = plan.config.iterations_per_test;
    let mut items =
        Vec::with_capacity(plan.targets.len() * plan.tests.len() * iterations as usize);
    match plan.priority_order {
        PriorityOrder::ByTargetThenTest => {
            for target_idx in 0..plan.targets.len() {
                for test_idx in 0..plan.tests.len() {
                    for iteration in 0..iterations {
                        items.push(WorkItem {
                            target_idx,
                            test_idx,
                            iteration,
                        });
                    }
                }
            }
        }
        PriorityOrder::ByTestThenTarget => {
            for test_idx in 0..plan.tests.len() {
                for target_idx in 0..plan.targets.len() {
                    for iteration in 0..iterations {
                        items.push(WorkItem {
                            target_idx,
                            test_idx,
                            iteration,
                        });
                    }
                }
            }
        }
        PriorityOrder::Interleaved => {
            // Finest-grained alternation across targets so no backend sees
            // a long homogeneous burst
            for iteration in 0..iterations {
                for test_idx in 0..plan.tests.len() {
                    for target_idx in 0..plan.targets.len() {
                        items.push(WorkItem {
                            target_idx,
                            test_idx,
                            iteration,
                        });
                    }
                }
            }
        }
    }
    items
}
