//! Observability for evaluation runs
//!
//! Provides:
//! - Prometheus metrics (run duration, accounts evaluated, fetch failures,
//!   folded events, last organization score)
//! - Structured JSON logging of run milestones with tracing

use crate::models::ResourceKind;
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for run durations (in seconds)
const RUN_DURATION_BUCKETS: &[f64] = &[1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<RunMetricsInner> = OnceLock::new();

struct RunMetricsInner {
    evaluation_duration_seconds: Histogram,
    accounts_evaluated: IntGauge,
    account_fetch_failures: IntCounter,
    events_folded: IntCounterVec,
    org_flexibility_score: Gauge,
    last_success_timestamp: IntGauge,
}

impl RunMetricsInner {
    fn new() -> Self {
        Self {
            evaluation_duration_seconds: register_histogram!(
                "flexscore_evaluation_duration_seconds",
                "Wall time of a full daily evaluation run",
                RUN_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register evaluation_duration_seconds"),

            accounts_evaluated: register_int_gauge!(
                "flexscore_accounts_evaluated",
                "Number of accounts scored by the last run"
            )
            .expect("Failed to register accounts_evaluated"),

            account_fetch_failures: register_int_counter!(
                "flexscore_account_fetch_failures_total",
                "Total number of per-account fetch failures"
            )
            .expect("Failed to register account_fetch_failures"),

            events_folded: register_int_counter_vec!(
                "flexscore_events_folded_total",
                "Audit events folded into resources",
                &["kind"]
            )
            .expect("Failed to register events_folded"),

            org_flexibility_score: register_gauge!(
                "flexscore_org_flexibility_score",
                "Organization Flexibility Score of the last successful run"
            )
            .expect("Failed to register org_flexibility_score"),

            last_success_timestamp: register_int_gauge!(
                "flexscore_last_success_timestamp_seconds",
                "Unix time of the last successful run"
            )
            .expect("Failed to register last_success_timestamp"),
        }
    }
}

/// Handle to the process-wide run metrics.
///
/// Clones share the same underlying collectors.
#[derive(Clone)]
pub struct RunMetrics {
    _private: (),
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(RunMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &RunMetricsInner {
        GLOBAL_METRICS.get_or_init(RunMetricsInner::new)
    }

    pub fn observe_run_duration(&self, duration_secs: f64) {
        self.inner().evaluation_duration_seconds.observe(duration_secs);
    }

    pub fn set_accounts_evaluated(&self, count: i64) {
        self.inner().accounts_evaluated.set(count);
    }

    pub fn inc_account_fetch_failures(&self) {
        self.inner().account_fetch_failures.inc();
    }

    pub fn add_events_folded(&self, kind: ResourceKind, count: u64) {
        self.inner()
            .events_folded
            .with_label_values(&[kind.as_str()])
            .inc_by(count);
    }

    /// Record the outcome of a successful run
    pub fn record_success(&self, org_flexibility_score: f64, finished_at: i64) {
        self.inner().org_flexibility_score.set(org_flexibility_score);
        self.inner().last_success_timestamp.set(finished_at);
    }
}

/// Structured logger for evaluation run milestones
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            agent_version = %version,
            "Flexibility score agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Flexibility score agent shutting down"
        );
    }

    pub fn log_run_started(&self, window_start: &str, window_end: &str, accounts: usize) {
        info!(
            event = "run_started",
            instance = %self.instance,
            window_start = %window_start,
            window_end = %window_end,
            accounts = accounts,
            "Evaluation run started"
        );
    }

    pub fn log_account_fetched(&self, account_id: &str, regions: usize, instances: usize, groups: usize) {
        info!(
            event = "account_fetched",
            instance = %self.instance,
            account_id = %account_id,
            regions = regions,
            instances = instances,
            scaling_groups = groups,
            "Account resources reconstructed"
        );
    }

    pub fn log_account_failed(&self, account_id: &str, error: &str, skipped: bool) {
        if skipped {
            warn!(
                event = "account_failed",
                instance = %self.instance,
                account_id = %account_id,
                error = %error,
                skipped = true,
                "Account fetch failed, excluding it from this run"
            );
        } else {
            error!(
                event = "account_failed",
                instance = %self.instance,
                account_id = %account_id,
                error = %error,
                skipped = false,
                "Account fetch failed"
            );
        }
    }

    pub fn log_scores_computed(&self, accounts: usize, org_flexibility_score: f64) {
        info!(
            event = "scores_computed",
            instance = %self.instance,
            accounts = accounts,
            org_flexibility_score = org_flexibility_score,
            "Daily scores computed"
        );
    }

    pub fn log_metrics_published(&self, namespace: &str, datapoints: usize) {
        info!(
            event = "metrics_published",
            instance = %self.instance,
            namespace = %namespace,
            datapoints = datapoints,
            "Published daily metrics"
        );
    }

    pub fn log_snapshot_archived(&self, bucket: &str, key: &str) {
        info!(
            event = "snapshot_archived",
            instance = %self.instance,
            bucket = %bucket,
            key = %key,
            "Archived metrics snapshot"
        );
    }

    pub fn log_snapshot_archive_failed(&self, bucket: &str, error: &str) {
        warn!(
            event = "snapshot_archive_failed",
            instance = %self.instance,
            bucket = %bucket,
            error = %error,
            "Metrics published but snapshot was not archived"
        );
    }

    pub fn log_run_finished(&self, duration_secs: f64, accounts: usize) {
        info!(
            event = "run_finished",
            instance = %self.instance,
            duration_secs = duration_secs,
            accounts = accounts,
            "Evaluation run finished"
        );
    }

    pub fn log_run_failed(&self, duration_secs: f64, error: &str) {
        error!(
            event = "run_failed",
            instance = %self.instance,
            duration_secs = duration_secs,
            error = %error,
            "Evaluation run failed, nothing was published"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_metrics_shared_registration() {
        let metrics = RunMetrics::new();
        let again = RunMetrics::new();

        metrics.observe_run_duration(12.0);
        metrics.set_accounts_evaluated(3);
        metrics.inc_account_fetch_failures();
        again.add_events_folded(ResourceKind::Instance, 42);
        again.record_success(6.25, 1_710_000_000);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "flexscore_events_folded_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("flexscore-test");
        assert_eq!(logger.instance, "flexscore-test");
    }
}
