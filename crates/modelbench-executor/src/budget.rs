//! Atomic budget counters
//!
//! Three bounds guard a job: wall-clock duration, cumulative cost, and
//! completed request count. The dispatcher checks them before every
//! dispatch; workers add to them as outcomes complete. Cost is tracked in
//! integer micro-USD so the counter stays a plain atomic.

use modelbench_core::{Constraint, ExecutionConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const MICRO: f64 = 1_000_000.0;

#[derive(Debug)]
pub struct Budget {
    started: Instant,
    max_duration: Option<Duration>,
    max_cost_micro_usd: Option<u64>,
    max_requests: Option<u64>,
    cost_micro_usd: AtomicU64,
    completed_requests: AtomicU64,
}

impl Budget {
    pub fn new(config: &ExecutionConfig) -> Self {
        Self {
            started: Instant::now(),
            max_duration: config.max_duration_ms.map(Duration::from_millis),
            max_cost_micro_usd: config
                .max_total_cost_usd
                .map(|usd| (usd * MICRO).round() as u64),
            max_requests: config.max_total_requests,
            cost_micro_usd: AtomicU64::new(0),
            completed_requests: AtomicU64::new(0),
        }
    }

    /// First crossed bound, if any. Checked by the dispatcher before each
    /// dispatch; reads are relaxed because the dispatcher is the only
    /// decision point and a slightly stale value only delays the stop by
    /// one item.
    pub fn exceeded(&self) -> Option<Constraint> {
        if let Some(max) = self.max_duration {
            if self.started.elapsed() >= max {
                return Some(Constraint::MaxDurationExceeded);
            }
        }
        if let Some(max) = self.max_cost_micro_usd {
            if self.cost_micro_usd.load(Ordering::Relaxed) >= max {
                return Some(Constraint::MaxCostExceeded);
            }
        }
        if let Some(max) = self.max_requests {
            if self.completed_requests.load(Ordering::Relaxed) >= max {
                return Some(Constraint::MaxSamplesExceeded);
            }
        }
        None
    }

    /// Record a completed main-phase outcome.
    pub fn record_outcome(&self, cost_usd: f64) {
        self.add_cost(cost_usd);
        self.completed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Warm-up spend counts against the cost budget but not the request
    /// budget: warm-up outcomes are never aggregated.
    pub fn add_cost(&self, cost_usd: f64) {
        if cost_usd > 0.0 {
            self.cost_micro_usd
                .fetch_add((cost_usd * MICRO).round() as u64, Ordering::Relaxed);
        }
    }

    pub fn completed_requests(&self) -> u64 {
        self.completed_requests.load(Ordering::Relaxed)
    }

    /// Remaining wall-clock time before the duration bound, if one is set.
    pub fn remaining_duration(&self) -> Option<Duration> {
        self.max_duration
            .map(|max| max.saturating_sub(self.started.elapsed()))
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
