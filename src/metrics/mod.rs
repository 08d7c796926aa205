//! # Metrics Module
//!
//! Spend limiter telemetry and Prometheus export.
//!
//! ## Metrics Tracked
//!
//! **Counters:**
//! - `tollgate_rate_limit_total{mode, method}` - Requests denied by the global budget
//! - `tollgate_daily_unique_spending_plans{tier}` - Plans with a first expense today
//! - `tollgate_cache_operations_total{operation, outcome}` - Cache calls by outcome
//!
//! **Gauges:**
//! - `tollgate_remaining_budget` - Global budget left in the current window
//! - `tollgate_average_daily_spending_plan_usage{tier}` - Mean spend per active plan
//!
//! The rate-limit, unique-plan and average-usage series are daily: they are
//! zeroed on every global budget rollover.

pub mod handler;

pub use metrics_exporter_prometheus::PrometheusBuilder;

use crate::store::SubscriptionTier;
use dashmap::DashSet;
use std::sync::LazyLock;

pub const RATE_LIMIT_TOTAL: &str = "tollgate_rate_limit_total";
pub const REMAINING_BUDGET: &str = "tollgate_remaining_budget";
pub const DAILY_UNIQUE_SPENDING_PLANS: &str = "tollgate_daily_unique_spending_plans";
pub const AVERAGE_DAILY_SPENDING_PLAN_USAGE: &str =
    "tollgate_average_daily_spending_plan_usage";
pub const CACHE_OPERATIONS_TOTAL: &str = "tollgate_cache_operations_total";

/// `(mode, method)` label pairs the rate-limit counter has been emitted with,
/// so the daily reset can zero every series.
static RATE_LIMIT_LABELS: LazyLock<DashSet<(String, String)>> = LazyLock::new(DashSet::new);

/// Count a request denied because the global budget is exhausted.
pub fn record_rate_limit_hit(mode: &str, method: &str) {
    RATE_LIMIT_LABELS.insert((mode.to_string(), method.to_string()));
    metrics::counter!(
        RATE_LIMIT_TOTAL,
        "mode" => mode.to_string(),
        "method" => method.to_string()
    )
    .increment(1);
}

pub fn set_remaining_budget(remaining: i64) {
    metrics::gauge!(REMAINING_BUDGET).set(remaining as f64);
}

/// Count a plan that recorded its first expense of the window.
pub fn record_unique_plan_use(tier: SubscriptionTier) {
    metrics::counter!(DAILY_UNIQUE_SPENDING_PLANS, "tier" => tier.label()).increment(1);
}

pub fn set_average_usage(tier: SubscriptionTier, average: f64) {
    metrics::gauge!(AVERAGE_DAILY_SPENDING_PLAN_USAGE, "tier" => tier.label()).set(average);
}

pub fn record_cache_operation(operation: &str, outcome: &'static str) {
    metrics::counter!(
        CACHE_OPERATIONS_TOTAL,
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Zero the daily series and publish the restored budget.
pub fn reset_daily_metrics(total_budget: i64) {
    for entry in RATE_LIMIT_LABELS.iter() {
        let (mode, method) = entry.key();
        metrics::counter!(
            RATE_LIMIT_TOTAL,
            "mode" => mode.clone(),
            "method" => method.clone()
        )
        .absolute(0);
    }
    for tier in SubscriptionTier::ALL {
        metrics::counter!(DAILY_UNIQUE_SPENDING_PLANS, "tier" => tier.label()).absolute(0);
        metrics::gauge!(AVERAGE_DAILY_SPENDING_PLAN_USAGE, "tier" => tier.label()).set(0.0);
    }
    set_remaining_budget(total_budget);
}

/// Install the global Prometheus recorder.
///
/// Returns a PrometheusHandle that can be used to render metrics.
pub fn setup_metrics(
) -> Result<metrics_exporter_prometheus::PrometheusHandle, Box<dyn std::error::Error>> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}

/// A handle on the global recorder, or on a detached one if a recorder is
/// already installed (tests, repeated startup in one process).
pub fn prometheus_handle() -> metrics_exporter_prometheus::PrometheusHandle {
    setup_metrics().unwrap_or_else(|e| {
        tracing::debug!("Metrics already initialized, creating new handle: {}", e);
        PrometheusBuilder::new().build_recorder().handle()
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::get_test_handle;
    use super::*;

    #[test]
    fn test_rate_limit_hits_are_rendered_with_labels() {
        let handle = get_test_handle();
        record_rate_limit_hit("metrics-test-mode", "eth_sendRawTransaction");

        let rendered = handle.render();
        assert!(rendered.contains(RATE_LIMIT_TOTAL));
        assert!(rendered.contains("mode=\"metrics-test-mode\""));
        assert!(rendered.contains("method=\"eth_sendRawTransaction\""));
    }

    #[test]
    fn test_reset_daily_metrics_zeroes_rate_limit_series() {
        let handle = get_test_handle();
        record_rate_limit_hit("reset-test-mode", "eth_call");
        reset_daily_metrics(1000);

        let rendered = handle.render();
        let line = rendered
            .lines()
            .find(|l| l.starts_with(RATE_LIMIT_TOTAL) && l.contains("reset-test-mode"))
            .unwrap();
        assert!(line.ends_with(" 0"), "unexpected line: {}", line);
    }

    #[test]
    fn test_average_usage_gauge_per_tier() {
        let handle = get_test_handle();
        set_average_usage(SubscriptionTier::Privileged, 42.0);

        let rendered = handle.render();
        assert!(rendered.contains(AVERAGE_DAILY_SPENDING_PLAN_USAGE));
        assert!(rendered.contains("tier=\"privileged\""));
    }
}
