//! Daily evaluation run: resolve, fetch, score, publish, archive
//!
//! Publishing the metric batch commits the run. The snapshot archive follows
//! it and cannot fail the run once metrics are out.

use super::{fetch_accounts, resolve_accounts, AccountDirectory, AccountFetcher, FetchOutcome};
use crate::aggregate::{org_scores, ORG_DIMENSION_VALUE};
use crate::error::{FlexError, Result};
use crate::health::{HealthRegistry, Stage};
use crate::models::Account;
use crate::observability::{RunMetrics, StructuredLogger};
use crate::publish::{archive_snapshot, metric_data, MetricSink, ObjectStore, Snapshot};
use crate::scores::{daily_scores, MetricName, ScoreRecord, ScoreWeights};
use crate::time_window::TimeWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_NAMESPACE: &str = "FlexibilityScore";
pub const DEFAULT_BUCKET: &str = "flex-metrics";
pub const DEFAULT_MEMBER_ROLE_NAME: &str = "OrganizationAccountAccessRole";

/// What to do when an account worker fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the run; nothing is published
    #[default]
    FailRun,
    /// Leave the failed accounts out and score the rest
    SkipFailedAccounts,
}

/// Settings of an evaluation run
#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    pub namespace: String,
    pub bucket: String,
    pub member_role_name: String,
    pub lookback_days: u32,
    /// The evaluated day is this many days before the run
    pub days_before: u32,
    pub failure_policy: FailurePolicy,
    pub weights: ScoreWeights,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            member_role_name: DEFAULT_MEMBER_ROLE_NAME.to_string(),
            lookback_days: super::DEFAULT_LOOKBACK_DAYS,
            days_before: 1,
            failure_policy: FailurePolicy::default(),
            weights: ScoreWeights::default(),
        }
    }
}

/// Accounts of one run after every worker has joined.
///
/// Built once per run and read-only from then on.
#[derive(Debug)]
pub struct RunContext {
    pub window: TimeWindow,
    pub started_at: DateTime<Utc>,
    pub accounts: BTreeMap<String, Account>,
}

impl RunContext {
    pub fn new(window: TimeWindow, started_at: DateTime<Utc>, accounts: Vec<Account>) -> Self {
        Self {
            window,
            started_at,
            accounts: accounts.into_iter().map(|a| (a.id.clone(), a)).collect(),
        }
    }

    /// Daily record of every account plus the organization entry
    pub fn daily_snapshot(&self, weights: &ScoreWeights) -> Snapshot {
        let mut snapshot: Snapshot = self
            .accounts
            .iter()
            .map(|(id, account)| (id.clone(), daily_scores(account)))
            .collect();

        let org = org_scores(&snapshot, weights);
        snapshot.insert(ORG_DIMENSION_VALUE.to_string(), org);
        snapshot
    }
}

/// Summary of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub window: TimeWindow,
    pub snapshot: Snapshot,
    /// `None` when the metrics were published but the archive write failed
    pub snapshot_key: Option<String>,
    pub datapoints: usize,
    pub skipped_accounts: Vec<String>,
    pub duration_secs: f64,
}

impl RunReport {
    pub fn org_scores(&self) -> Option<&ScoreRecord> {
        self.snapshot.get(ORG_DIMENSION_VALUE)
    }
}

/// Drives evaluation runs against a fixed set of collaborators
pub struct Evaluator {
    config: EvaluationConfig,
    directory: Arc<dyn AccountDirectory>,
    fetcher: Arc<AccountFetcher>,
    sink: Arc<dyn MetricSink>,
    store: Arc<dyn ObjectStore>,
    metrics: RunMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl Evaluator {
    pub fn new(
        config: EvaluationConfig,
        directory: Arc<dyn AccountDirectory>,
        fetcher: AccountFetcher,
        sink: Arc<dyn MetricSink>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let fetcher = fetcher.with_lookback_days(config.lookback_days);
        Self {
            config,
            directory,
            fetcher: Arc::new(fetcher),
            sink,
            store,
            metrics: RunMetrics::new(),
            logger: StructuredLogger::new("flexscore"),
            health: None,
        }
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Evaluate the configured day before `now`
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunReport> {
        let window = TimeWindow::days_before(now, self.config.days_before);
        self.run_window(window, now).await
    }

    /// Evaluate an explicit window
    pub async fn run_window(&self, window: TimeWindow, now: DateTime<Utc>) -> Result<RunReport> {
        let started = Instant::now();
        let result = self.evaluate(window, now, started).await;
        let duration_secs = started.elapsed().as_secs_f64();
        self.metrics.observe_run_duration(duration_secs);

        match &result {
            Ok(report) => {
                let org = report
                    .org_scores()
                    .and_then(|r| r.flexibility_score())
                    .unwrap_or(0.0);
                self.metrics.record_success(org, now.timestamp());
                self.logger
                    .log_run_finished(duration_secs, report.snapshot.len().saturating_sub(1));
            }
            Err(e) => {
                self.logger.log_run_failed(duration_secs, &e.to_string());
                self.mark_failed(e).await;
            }
        }

        result
    }

    async fn evaluate(
        &self,
        window: TimeWindow,
        now: DateTime<Utc>,
        started: Instant,
    ) -> Result<RunReport> {
        let accounts = resolve_accounts(self.directory.as_ref()).await?;
        self.logger.log_run_started(
            &window.start().to_rfc3339(),
            &window.end().to_rfc3339(),
            accounts.len(),
        );

        let results = fetch_accounts(Arc::clone(&self.fetcher), accounts, &window, now).await;
        let (fetched, skipped_accounts) = self.collect_outcomes(results)?;
        self.set_health(Stage::Fetcher, &skipped_accounts).await;

        let context = RunContext::new(window, now, fetched);
        self.metrics.set_accounts_evaluated(context.accounts.len() as i64);

        let snapshot = context.daily_snapshot(&self.config.weights);
        let org = snapshot
            .get(ORG_DIMENSION_VALUE)
            .and_then(|r| r.get(MetricName::FlexibilityScore))
            .unwrap_or(0.0);
        self.logger.log_scores_computed(context.accounts.len(), org);
        self.set_health(Stage::Scorer, &[]).await;

        let data = metric_data(&snapshot, now);
        let datapoints = data.len();
        self.sink.publish(&self.config.namespace, data).await?;
        self.logger
            .log_metrics_published(&self.config.namespace, datapoints);

        // Metrics are already out; a failed archive only degrades the publisher
        let snapshot_key =
            match archive_snapshot(self.store.as_ref(), &self.config.bucket, &snapshot, now).await {
                Ok(key) => {
                    self.logger.log_snapshot_archived(&self.config.bucket, &key);
                    self.set_health(Stage::Publisher, &[]).await;
                    Some(key)
                }
                Err(e) => {
                    self.logger
                        .log_snapshot_archive_failed(&self.config.bucket, &e.to_string());
                    if let Some(health) = &self.health {
                        health
                            .set_degraded(Stage::Publisher, format!("snapshot not archived: {e}"))
                            .await;
                    }
                    None
                }
            };

        Ok(RunReport {
            window,
            snapshot,
            snapshot_key,
            datapoints,
            skipped_accounts,
            duration_secs: started.elapsed().as_secs_f64(),
        })
    }

    /// Apply the failure policy to joined worker results
    fn collect_outcomes(
        &self,
        results: Vec<(String, Result<FetchOutcome>)>,
    ) -> Result<(Vec<Account>, Vec<String>)> {
        let mut fetched = Vec::with_capacity(results.len());
        let mut skipped = Vec::new();

        for (account_id, result) in results {
            match result {
                Ok(outcome) => {
                    for (kind, stats) in &outcome.stats {
                        self.metrics.add_events_folded(*kind, stats.folded as u64);
                    }
                    self.logger.log_account_fetched(
                        &account_id,
                        outcome.regions,
                        outcome.account.instances.len(),
                        outcome.account.scaling_groups.len(),
                    );
                    fetched.push(outcome.account);
                }
                Err(e) => {
                    self.metrics.inc_account_fetch_failures();
                    match self.config.failure_policy {
                        FailurePolicy::FailRun => {
                            self.logger
                                .log_account_failed(&account_id, &e.to_string(), false);
                            return Err(e);
                        }
                        FailurePolicy::SkipFailedAccounts => {
                            self.logger
                                .log_account_failed(&account_id, &e.to_string(), true);
                            skipped.push(account_id);
                        }
                    }
                }
            }
        }

        Ok((fetched, skipped))
    }

    async fn set_health(&self, stage: Stage, skipped: &[String]) {
        let Some(health) = &self.health else {
            return;
        };
        if skipped.is_empty() {
            health.set_healthy(stage).await;
        } else {
            health
                .set_degraded(stage, format!("skipped accounts: {}", skipped.join(", ")))
                .await;
        }
    }

    async fn mark_failed(&self, error: &FlexError) {
        let Some(health) = &self.health else {
            return;
        };
        let stage = match error {
            FlexError::Publish(_) | FlexError::Storage(_) | FlexError::Serialization(_) => {
                Stage::Publisher
            }
            _ => Stage::Fetcher,
        };
        health.set_unhealthy(stage, error.to_string()).await;
    }
}
