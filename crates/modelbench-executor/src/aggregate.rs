//! Outcome aggregation into the job report

use modelbench_core::{AggregatedStats, CallOutcome, Constraint, GroupStats, JobReport};
use modelbench_stats as stats;
use std::collections::BTreeMap;

/// Group outcomes by `(provider, model)` and reduce each group.
///
/// Latency statistics are computed over successful calls only; when a
/// group has no successes they are all zero. Cost and token totals cover
/// every outcome, including failures that accrued prompt cost.
pub fn aggregate(outcomes: &[CallOutcome]) -> Vec<GroupStats> {
    let mut by_group: BTreeMap<(modelbench_core::ProviderName, String), Vec<&CallOutcome>> =
        BTreeMap::new();
    for outcome in outcomes {
        by_group
            .entry((
                outcome.target_ref.provider_name,
                outcome.target_ref.model_id.clone(),
            ))
            .or_default()
            .push(outcome);
    }

    by_group
        .into_iter()
        .map(|((provider_name, model_id), group)| GroupStats {
            provider_name,
            model_id,
            stats: reduce(&group),
        })
        .collect()
}

fn reduce(group: &[&CallOutcome]) -> AggregatedStats {
    let total = group.len() as u64;
    let succeeded = group.iter().filter(|o| o.success).count() as u64;
    let failed = total - succeeded;

    let latencies: Vec<f64> = group
        .iter()
        .filter(|o| o.success)
        .map(|o| o.latency_ms as f64)
        .collect();

    let total_tokens: u64 = group.iter().map(|o| o.total_tokens()).sum();
    let total_cost_usd: f64 = group.iter().map(|o| o.total_cost_usd()).sum();
    let throughputs: Vec<f64> = group
        .iter()
        .filter(|o| o.success)
        .filter_map(|o| o.tokens_per_second)
        .collect();

    AggregatedStats {
        total,
        succeeded,
        failed,
        success_rate: if total > 0 {
            succeeded as f64 / total as f64
        } else {
            0.0
        },
        p50_latency_ms: stats::percentile(&latencies, 50.0),
        p95_latency_ms: stats::percentile(&latencies, 95.0),
        p99_latency_ms: stats::percentile(&latencies, 99.0),
        mean_latency_ms: stats::mean(&latencies),
        min_latency_ms: if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().copied().fold(f64::INFINITY, f64::min)
        },
        max_latency_ms: latencies.iter().copied().fold(0.0, f64::max),
        stddev_latency_ms: stats::stddev(&latencies),
        total_tokens,
        avg_tokens_per_request: if total > 0 {
            total_tokens as f64 / total as f64
        } else {
            0.0
        },
        total_cost_usd,
        avg_cost_per_request_usd: if total > 0 {
            total_cost_usd / total as f64
        } else {
            0.0
        },
        avg_tokens_per_second: stats::mean(&throughputs),
    }
}

/// Assemble the final report from drained outcomes. Outcomes are sorted
/// by `(target, test, iteration)` so two identical runs produce identical
/// reports regardless of worker completion order.
pub fn build_report(
    correlation_id: Option<String>,
    mut outcomes: Vec<CallOutcome>,
    constraints: Vec<Constraint>,
    started_at: chrono::DateTime<chrono::Utc>,
) -> JobReport {
    outcomes.sort_by(|a, b| {
        (&a.target_ref, &a.test_ref, a.iteration).cmp(&(&b.target_ref, &b.test_ref, b.iteration))
    });
    let groups = aggregate(&outcomes);
    let completed_at = chrono::Utc::now();
    JobReport {
        correlation_id,
        outcomes,
        groups,
        constraints_applied: constraints,
        started_at,
        completed_at,
        duration_ms: (completed_at - started_at).num_milliseconds().max(0) as u64,
    }
}
