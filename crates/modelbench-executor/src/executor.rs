//! Bounded-concurrency job execution
//!
//! The executor owns a worker pool sized to `config.concurrency`, drains
//! an ordered queue of `(target, test, iteration)` tuples, and publishes
//! each outcome exactly once over a bounded channel to a single reducer.
//! Retry, backoff, budget enforcement, fail-fast cancellation, and target
//! quarantine all live here so the wire adapters stay retry-free.

use crate::aggregate::build_report;
use crate::budget::Budget;
use crate::schedule::{WorkItem, work_items};
use crate::target_state::TargetState;
use modelbench_catalog::Catalog;
use modelbench_core::{
    CallOutcome, Constraint, Error, ErrorKind, JobPlan, JobReport, ProviderTarget, Result,
    TargetRef,
};
use modelbench_wire::{
    CallContext, Connector, HttpClientConfig, connector_for, create_client,
};
use rand::Rng;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const BACKOFF_BASE_MS: u64 = 100;
const BACKOFF_FACTOR: u32 = 2;
const BACKOFF_JITTER: f64 = 0.2;

/// Builds one connector per target. Injected so tests can substitute stub
/// providers without any HTTP.
pub trait ConnectorFactory: Send + Sync {
    fn connector(&self, target: &ProviderTarget) -> Arc<dyn Connector>;
}

/// Production factory: real wire connectors sharing one pooled HTTP client.
pub struct WireConnectorFactory {
    client: reqwest::Client,
    catalog: &'static Catalog,
}

impl WireConnectorFactory {
    pub fn new(catalog: &'static Catalog) -> Result<Self> {
        let client = create_client(&HttpClientConfig::default())
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self { client, catalog })
    }
}

impl ConnectorFactory for WireConnectorFactory {
    fn connector(&self, target: &ProviderTarget) -> Arc<dyn Connector> {
        connector_for(target, self.catalog, self.client.clone())
    }
}

/// State shared by the dispatcher and every worker for one job.
struct JobShared {
    plan: JobPlan,
    budget: Budget,
    targets: Vec<TargetState>,
    connectors: Vec<Arc<dyn Connector>>,
    constraints: Mutex<BTreeSet<Constraint>>,
    cancel: CancellationToken,
    semaphore: Arc<Semaphore>,
}

impl JobShared {
    fn add_constraint(&self, constraint: Constraint) {
        self.constraints
            .lock()
            .expect("constraint set poisoned")
            .insert(constraint);
    }

    fn target_ref(&self, item: WorkItem) -> TargetRef {
        let target = &self.plan.targets[item.target_idx];
        TargetRef {
            provider_name: target.provider_name,
            model_id: target.model_id.clone(),
        }
    }

    fn call_context(&self, item: WorkItem) -> CallContext {
        let target = &self.plan.targets[item.target_idx];
        let mut timeout = Duration::from_millis(target.timeout_ms);
        if let Some(remaining) = self.budget.remaining_duration() {
            // In-flight work past the duration bound finishes under its
            // per-call deadline, but never extends beyond the job deadline
            timeout = timeout.min(remaining.max(Duration::from_millis(1)));
        }
        CallContext {
            timeout,
            want_ttft: true,
            save_response: self.plan.config.save_responses,
            iteration: item.iteration,
        }
    }

    fn cancelled_outcome(&self, item: WorkItem) -> CallOutcome {
        CallOutcome::failure(
            self.target_ref(item),
            self.plan.tests[item.test_idx].test_id.clone(),
            item.iteration,
            ErrorKind::Timeout,
            "cancelled by fail-fast",
        )
    }
}

pub struct Executor {
    factory: Arc<dyn ConnectorFactory>,
}

impl Executor {
    pub fn new(factory: Arc<dyn ConnectorFactory>) -> Self {
        Self { factory }
    }

    /// Executor wired to the real providers and the built-in catalog.
    pub fn with_wire_defaults() -> Result<Self> {
        Ok(Self::new(Arc::new(WireConnectorFactory::new(
            Catalog::builtin(),
        )?)))
    }

    /// Run a job to completion. Fails only on invalid plans: per-call
    /// failures, budget exhaustion, and cancellation are all recorded in
    /// the report instead.
    pub async fn run(&self, plan: &JobPlan) -> Result<JobReport> {
        plan.validate()?;
        let started_at = chrono::Utc::now();

        let shared = Arc::new(JobShared {
            budget: Budget::new(&plan.config),
            targets: plan.targets.iter().map(|_| TargetState::new()).collect(),
            connectors: plan
                .targets
                .iter()
                .map(|t| self.factory.connector(t))
                .collect(),
            constraints: Mutex::new(BTreeSet::new()),
            cancel: CancellationToken::new(),
            semaphore: Arc::new(Semaphore::new(plan.config.concurrency)),
            plan: plan.clone(),
        });

        info!(
            targets = plan.targets.len(),
            tests = plan.tests.len(),
            iterations = plan.config.iterations_per_test,
            concurrency = plan.config.concurrency,
            "starting job"
        );

        self.run_warm_up(&shared).await;

        let (tx, mut rx) = mpsc::channel::<CallOutcome>(2 * plan.config.concurrency);
        let reducer = tokio::spawn(async move {
            let mut outcomes = Vec::new();
            while let Some(outcome) = rx.recv().await {
                outcomes.push(outcome);
            }
            outcomes
        });

        let mut join_set = JoinSet::new();
        let mut first_dispatch = true;
        for item in work_items(plan) {
            // Acquire the worker slot first: budget counters are only
            // current once the previous worker on this slot has finished
            let permit = tokio::select! {
                biased;
                _ = shared.cancel.cancelled() => break,
                permit = shared.semaphore.clone().acquire_owned() => {
                    permit.expect("semaphore closed")
                }
            };
            if shared.cancel.is_cancelled() {
                break;
            }
            if let Some(constraint) = shared.budget.exceeded() {
                debug!(?constraint, "budget exhausted, stopping dispatch");
                shared.add_constraint(constraint);
                break;
            }
            if let Some(delay_ms) = plan.config.request_delay_ms {
                if !first_dispatch {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
            first_dispatch = false;

            let shared = Arc::clone(&shared);
            let tx = tx.clone();
            join_set.spawn(async move {
                let _permit = permit;
                run_item(shared, item, tx).await;
            });
        }

        while join_set.join_next().await.is_some() {}
        drop(tx);
        let outcomes = reducer.await.expect("reducer drains without panicking");

        for state in &shared.targets {
            state.mark_drained();
        }

        let constraints: Vec<Constraint> = shared
            .constraints
            .lock()
            .expect("constraint set poisoned")
            .iter()
            .copied()
            .collect();

        Ok(build_report(
            plan.correlation_id.clone(),
            outcomes,
            constraints,
            started_at,
        ))
    }

    /// Warm-up phase: `warm_up_runs` calls per target against the first
    /// test, completed fully before the main phase. Outcomes are neither
    /// aggregated nor saved; spend still counts against the cost budget.
    async fn run_warm_up(&self, shared: &Arc<JobShared>) {
        let runs = shared.plan.config.warm_up_runs;
        if runs == 0 {
            return;
        }
        if shared.budget.exceeded().is_some() || shared.cancel.is_cancelled() {
            shared.add_constraint(Constraint::WarmUpSkipped);
            return;
        }

        debug!(runs, "running warm-up phase");
        let mut join_set = JoinSet::new();
        for target_idx in 0..shared.plan.targets.len() {
            for run in 0..runs {
                let permit = shared
                    .semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("semaphore closed");
                let shared = Arc::clone(shared);
                join_set.spawn(async move {
                    let _permit = permit;
                    let item = WorkItem {
                        target_idx,
                        test_idx: 0,
                        iteration: run,
                    };
                    let state = &shared.targets[item.target_idx];
                    if state.quarantined_kind().is_some() {
                        return;
                    }
                    state.mark_active();
                    let target = &shared.plan.targets[item.target_idx];
                    let test = &shared.plan.tests[0];
                    let ctx = shared.call_context(item);
                    let result = shared.connectors[item.target_idx]
                        .invoke(target, test, &ctx)
                        .await;
                    shared.budget.add_cost(result.outcome.total_cost_usd());
                    if result.outcome.error_kind == Some(ErrorKind::AuthenticationError) {
                        state.quarantine(ErrorKind::AuthenticationError);
                        shared.add_constraint(Constraint::ProviderUnavailable);
                    }
                });
            }
        }
        while join_set.join_next().await.is_some() {}
    }
}

/// One worker's handling of one work item: quarantine short-circuit,
/// invoke, classify, retry with backoff, publish exactly one outcome.
async fn run_item(shared: Arc<JobShared>, item: WorkItem, tx: mpsc::Sender<CallOutcome>) {
    if shared.cancel.is_cancelled() {
        finish(&shared, shared.cancelled_outcome(item), &tx).await;
        return;
    }

    let state = &shared.targets[item.target_idx];
    if let Some(kind) = state.quarantined_kind() {
        shared.add_constraint(Constraint::ProviderUnavailable);
        let outcome = CallOutcome::failure(
            shared.target_ref(item),
            shared.plan.tests[item.test_idx].test_id.clone(),
            item.iteration,
            kind,
            "target quarantined",
        );
        finish(&shared, outcome, &tx).await;
        return;
    }
    state.mark_active();

    let target = &shared.plan.targets[item.target_idx];
    let test = &shared.plan.tests[item.test_idx];
    let connector = Arc::clone(&shared.connectors[item.target_idx]);

    let mut attempt: u32 = 0;
    loop {
        let ctx = shared.call_context(item);
        let result = connector.invoke(target, test, &ctx).await;
        for constraint in &result.constraints {
            shared.add_constraint(*constraint);
        }

        if result.outcome.success {
            state.reset_connection_errors();
            finish(&shared, result.outcome, &tx).await;
            return;
        }

        let kind = result.outcome.error_kind.unwrap_or(ErrorKind::Unknown);
        match kind {
            ErrorKind::AuthenticationError => {
                warn!(target = %shared.target_ref(item), "authentication failed, quarantining target");
                state.quarantine(kind);
                shared.add_constraint(Constraint::ProviderUnavailable);
            }
            ErrorKind::ConnectionError => {
                if state.record_connection_error() {
                    warn!(target = %shared.target_ref(item), "sustained connection failures, quarantining target");
                    state.quarantine(kind);
                    shared.add_constraint(Constraint::ProviderUnavailable);
                }
            }
            _ => state.reset_connection_errors(),
        }
        if kind == ErrorKind::RateLimited {
            shared.add_constraint(Constraint::RateLimitApplied);
        }
        if kind == ErrorKind::Timeout {
            shared.add_constraint(Constraint::TimeoutExceeded);
        }

        let may_retry = kind.retryable()
            && attempt < target.max_retries
            && state.quarantined_kind().is_none()
            && !shared.cancel.is_cancelled();
        if !may_retry {
            finish(&shared, result.outcome, &tx).await;
            return;
        }

        let delay = backoff_delay(attempt, result.retry_after, shared.budget.remaining_duration());
        debug!(
            target = %shared.target_ref(item),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "retrying after {kind:?}"
        );
        attempt += 1;
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => {
                finish(&shared, shared.cancelled_outcome(item), &tx).await;
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Publish the final outcome for a work item and update the budget. The
/// first failure under `fail_fast` triggers job-wide cancellation.
async fn finish(shared: &Arc<JobShared>, outcome: CallOutcome, tx: &mpsc::Sender<CallOutcome>) {
    shared.budget.record_outcome(outcome.total_cost_usd());
    if !outcome.success && shared.plan.config.fail_fast && !shared.cancel.is_cancelled() {
        shared.add_constraint(Constraint::FailFastTriggered);
        shared.cancel.cancel();
    }
    // The reducer always drains; a send fails only after it stopped,
    // which cannot happen while workers hold senders
    let _ = tx.send(outcome).await;
}

/// Exponential backoff: base 100 ms, factor 2, jitter ±20 %, floored by a
/// provider `retry-after` hint and capped by the remaining job deadline.
fn backoff_delay(
    attempt: u32,
    retry_after: Option<Duration>,
    remaining: Option<Duration>,
) -> Duration {
    let exp = BACKOFF_BASE_MS.saturating_mul(u64::from(BACKOFF_FACTOR.pow(attempt)));
    let jitter = rand::rng().random_range((1.0 - BACKOFF_JITTER)..=(1.0 + BACKOFF_JITTER));
    let mut delay = Duration::from_millis(exp).mul_f64(jitter);
    if let Some(hint) = retry_after {
        delay = delay.max(hint);
    }
    if let Some(remaining) = remaining {
        delay = delay.min(remaining);
    }
    delay
}
