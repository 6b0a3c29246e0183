//! Per-account fetch-and-fold workers

use super::{AccountSession, AuditLog, AuditQuery, CredentialBroker, RegionCatalog};
use crate::error::{FlexError, Result};
use crate::events::{
    EVENT_BID_EVICTED, INSTANCE_EVENT_NAMES, LAUNCH_TEMPLATE_EVENT_NAMES,
    SCALING_GROUP_EVENT_NAMES, SCALING_POLICY_EVENT_NAMES,
};
use crate::models::{Account, AuditEvent, ResourceKind};
use crate::resources::{
    fold, FoldStats, InstanceReconstructor, LaunchTemplateReconstructor, Reconstructor,
    ScalingGroupReconstructor,
};
use crate::time_window::TimeWindow;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// How far back from "now" lifecycle-defining events are looked up
pub const DEFAULT_LOOKBACK_DAYS: u32 = 90;

/// Result of one account worker
#[derive(Debug)]
pub struct FetchOutcome {
    pub account: Account,
    pub regions: usize,
    pub stats: BTreeMap<ResourceKind, FoldStats>,
}

/// Fetches and folds the resources of one account at a time
pub struct AccountFetcher {
    audit_log: Arc<dyn AuditLog>,
    regions: Arc<dyn RegionCatalog>,
    broker: Arc<dyn CredentialBroker>,
    lookback_days: u32,
}

impl AccountFetcher {
    pub fn new(
        audit_log: Arc<dyn AuditLog>,
        regions: Arc<dyn RegionCatalog>,
        broker: Arc<dyn CredentialBroker>,
    ) -> Self {
        Self {
            audit_log,
            regions,
            broker,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    /// Audit lookup range: from the lookback horizon to the end of `window`
    pub fn lookup_range(&self, window: &TimeWindow, now: DateTime<Utc>) -> Result<TimeWindow> {
        let horizon = now - Duration::days(i64::from(self.lookback_days));
        TimeWindow::new(horizon.min(window.start()), window.end())
    }

    async fn session(&self, account: &Account) -> Result<AccountSession> {
        let credentials = if account.is_master {
            None
        } else {
            Some(self.broker.assume_role(&account.id).await?)
        };

        Ok(AccountSession {
            account_id: account.id.clone(),
            credentials,
        })
    }

    /// Reconstruct every resource of `account` relevant to `window`
    pub async fn fetch(
        &self,
        mut account: Account,
        window: &TimeWindow,
        now: DateTime<Utc>,
    ) -> Result<FetchOutcome> {
        let session = self.session(&account).await?;
        let regions = self.regions.regions(&session).await?;
        let range = self.lookup_range(window, now)?;

        let mut stats: BTreeMap<ResourceKind, FoldStats> = BTreeMap::new();

        for region in &regions {
            debug!(account_id = %account.id, region = %region, "Fetching region");

            // Launch templates
            let events = self
                .lookup(&session, ResourceKind::LaunchTemplate, LAUNCH_TEMPLATE_EVENT_NAMES, region, &range)
                .await?;
            let mut templates = LaunchTemplateReconstructor::new();
            stats.entry(ResourceKind::LaunchTemplate).or_default().add(fold(&mut templates, events));
            account.launch_templates.merge(templates.finish(window));

            // Scaling groups and their policies
            let mut groups = ScalingGroupReconstructor::new();
            let events = self
                .lookup(&session, ResourceKind::ScalingGroup, SCALING_GROUP_EVENT_NAMES, region, &range)
                .await?;
            stats.entry(ResourceKind::ScalingGroup).or_default().add(fold(&mut groups, events));
            let events = self
                .lookup(&session, ResourceKind::ScalingPolicy, SCALING_POLICY_EVENT_NAMES, region, &range)
                .await?;
            stats.entry(ResourceKind::ScalingPolicy).or_default().add(fold(&mut groups, events));
            account.scaling_groups.extend(groups.finish(window));

            // Instances; evictions are not indexed under the instance resource type
            let mut events = self
                .lookup(&session, ResourceKind::Instance, INSTANCE_EVENT_NAMES, region, &range)
                .await?;
            let evictions = AuditQuery::by_event_name(EVENT_BID_EVICTED, region, range);
            events.extend(self.audit_log.query(&session, &evictions).await?);
            let mut instances = InstanceReconstructor::new();
            stats.entry(ResourceKind::Instance).or_default().add(fold(&mut instances, events));
            account.instances.extend(instances.finish(window));
        }

        info!(
            account_id = %account.id,
            regions = regions.len(),
            instances = account.instances.len(),
            launch_templates = account.launch_templates.len(),
            scaling_groups = account.scaling_groups.len(),
            "Account resources reconstructed"
        );

        Ok(FetchOutcome {
            account,
            regions: regions.len(),
            stats,
        })
    }

    async fn lookup(
        &self,
        session: &AccountSession,
        kind: ResourceKind,
        event_names: &[&str],
        region: &str,
        range: &TimeWindow,
    ) -> Result<Vec<AuditEvent>> {
        let query = AuditQuery::by_resource_type(kind.resource_type(), event_names, region, *range);
        let events = self.audit_log.query(session, &query).await?;
        debug!(
            account_id = %session.account_id,
            region = %region,
            kind = kind.as_str(),
            events = events.len(),
            "Audit events fetched"
        );
        Ok(events)
    }
}

/// Run one worker per account and wait for all of them.
///
/// Results come back in the order of `accounts`. A worker error is wrapped in
/// [`FlexError::AccountFetch`]; a worker that panics yields
/// [`FlexError::WorkerJoin`].
pub async fn fetch_accounts(
    fetcher: Arc<AccountFetcher>,
    accounts: Vec<Account>,
    window: &TimeWindow,
    now: DateTime<Utc>,
) -> Vec<(String, Result<FetchOutcome>)> {
    let handles: Vec<_> = accounts
        .into_iter()
        .map(|account| {
            let account_id = account.id.clone();
            let fetcher = Arc::clone(&fetcher);
            let window = *window;
            let handle = tokio::spawn(async move { fetcher.fetch(account, &window, now).await });
            (account_id, handle)
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (account_id, handle) in handles {
        let result = match handle.await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(FlexError::AccountFetch {
                account_id: account_id.clone(),
                source: Box::new(e),
            }),
            Err(e) => Err(FlexError::WorkerJoin {
                account_id: account_id.clone(),
                reason: e.to_string(),
            }),
        };
        results.push((account_id, result));
    }

    results
}
