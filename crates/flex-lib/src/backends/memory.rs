//! In-process collaborator implementations

use crate::error::{FlexError, Result};
use crate::models::{AccountInfo, AuditEvent, Credentials, MetricDatum};
use crate::orchestrator::{
    async_trait, AccountDirectory, AccountSession, AuditLog, AuditQuery, CredentialBroker,
    RegionCatalog,
};
use crate::publish::{MetricSink, MetricSource, ObjectStore};
use crate::time_window::TimeWindow;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

/// Session name used when assuming member roles
pub const ROLE_SESSION_NAME: &str = "FlexibilityScore";

/// Object store backed by a concurrent map
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<(String, String), Vec<u8>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.objects
            .insert((bucket.to_string(), key.to_string()), bytes);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FlexError::Storage(format!("no object {key} in bucket {bucket}")))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().0 == bucket && entry.key().1.starts_with(prefix))
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Metric store keeping every published batch
#[derive(Debug, Default)]
pub struct MemoryMetricStore {
    batches: RwLock<Vec<(String, Vec<MetricDatum>)>>,
}

impl MemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `publish` calls received
    pub async fn batch_count(&self) -> usize {
        self.batches.read().await.len()
    }

    /// Every datapoint published to `namespace`
    pub async fn datapoints(&self, namespace: &str) -> Vec<MetricDatum> {
        self.batches
            .read()
            .await
            .iter()
            .filter(|(ns, _)| ns == namespace)
            .flat_map(|(_, data)| data.iter().cloned())
            .collect()
    }
}

#[async_trait]
impl MetricSink for MemoryMetricStore {
    async fn publish(&self, namespace: &str, data: Vec<MetricDatum>) -> Result<()> {
        self.batches.write().await.push((namespace.to_string(), data));
        Ok(())
    }
}

#[async_trait]
impl MetricSource for MemoryMetricStore {
    async fn query(&self, namespace: &str, range: &TimeWindow) -> Result<Vec<MetricDatum>> {
        Ok(self
            .datapoints(namespace)
            .await
            .into_iter()
            .filter(|d| range.contains(&d.timestamp))
            .collect())
    }
}

/// Audit log holding events per account and region
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    events: BTreeMap<String, BTreeMap<String, Vec<AuditEvent>>>,
    failing: HashSet<String>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add events to one region of one account, registering the region
    pub fn with_events(mut self, account_id: &str, region: &str, events: Vec<AuditEvent>) -> Self {
        self.events
            .entry(account_id.to_string())
            .or_default()
            .entry(region.to_string())
            .or_default()
            .extend(events);
        self
    }

    /// Make every lookup for `account_id` fail
    pub fn failing_for(mut self, account_id: &str) -> Self {
        self.failing.insert(account_id.to_string());
        self
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn query(&self, session: &AccountSession, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        if self.failing.contains(&session.account_id) {
            return Err(FlexError::AuditLog(format!(
                "lookup denied for account {}",
                session.account_id
            )));
        }

        Ok(self
            .events
            .get(&session.account_id)
            .and_then(|regions| regions.get(&query.region))
            .map(|events| events.iter().filter(|e| query.matches(e)).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl RegionCatalog for MemoryAuditLog {
    async fn regions(&self, session: &AccountSession) -> Result<Vec<String>> {
        Ok(self
            .events
            .get(&session.account_id)
            .map(|regions| regions.keys().cloned().collect())
            .unwrap_or_default())
    }
}

/// Account directory with a fixed account list
#[derive(Debug, Clone)]
pub struct StaticDirectory {
    accounts: Vec<AccountInfo>,
    caller_account_id: String,
    organizations_enabled: bool,
}

impl StaticDirectory {
    pub fn new(caller_account_id: impl Into<String>, accounts: Vec<AccountInfo>) -> Self {
        Self {
            accounts,
            caller_account_id: caller_account_id.into(),
            organizations_enabled: true,
        }
    }

    /// A directory whose caller does not belong to an organization
    pub fn without_organizations(caller_account_id: impl Into<String>) -> Self {
        Self {
            accounts: Vec::new(),
            caller_account_id: caller_account_id.into(),
            organizations_enabled: false,
        }
    }
}

#[async_trait]
impl AccountDirectory for StaticDirectory {
    async fn list_accounts(&self) -> Result<Vec<AccountInfo>> {
        if !self.organizations_enabled {
            return Err(FlexError::OrganizationsNotInUse);
        }
        Ok(self.accounts.clone())
    }

    async fn caller_account_id(&self) -> Result<String> {
        Ok(self.caller_account_id.clone())
    }
}

/// Credential broker issuing role-based credentials without a remote call
#[derive(Debug, Clone)]
pub struct RoleArnBroker {
    role_name: String,
    session_duration: Duration,
    denied: HashSet<String>,
}

impl RoleArnBroker {
    pub fn new(role_name: impl Into<String>) -> Self {
        Self {
            role_name: role_name.into(),
            session_duration: Duration::hours(1),
            denied: HashSet::new(),
        }
    }

    /// Refuse to assume the role in `account_id`
    pub fn deny(mut self, account_id: &str) -> Self {
        self.denied.insert(account_id.to_string());
        self
    }

    pub fn role_arn(&self, account_id: &str) -> String {
        format!("arn:aws:iam::{}:role/{}", account_id, self.role_name)
    }
}

#[async_trait]
impl CredentialBroker for RoleArnBroker {
    async fn assume_role(&self, account_id: &str) -> Result<Credentials> {
        if self.denied.contains(account_id) {
            return Err(FlexError::Credentials {
                account_id: account_id.to_string(),
                reason: format!("not authorized to assume {}", self.role_arn(account_id)),
            });
        }

        Ok(Credentials {
            account_id: account_id.to_string(),
            role_arn: self.role_arn(account_id),
            session_name: ROLE_SESSION_NAME.to_string(),
            expires_at: Some(Utc::now() + self.session_duration),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_object_store_list_is_sorted_and_scoped() {
        let store = MemoryObjectStore::new();
        store.put("b", "2024/03/11/040000.json", vec![2]).await.unwrap();
        store.put("b", "2024/03/10/040000.json", vec![1]).await.unwrap();
        store.put("other", "2024/03/12/040000.json", vec![3]).await.unwrap();

        let keys = store.list("b", "2024/03").await.unwrap();
        assert_eq!(keys, vec!["2024/03/10/040000.json", "2024/03/11/040000.json"]);
        assert_eq!(store.get("b", &keys[1]).await.unwrap(), vec![2]);
        assert!(matches!(
            store.get("b", "missing").await,
            Err(FlexError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_metric_store_filters_namespace_and_range() {
        let store = MemoryMetricStore::new();
        let datum = |day: u32| MetricDatum {
            name: "vcpuh".to_string(),
            value: 1.0,
            unit: "None".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, day, 4, 0, 0).unwrap(),
            dimensions: Vec::new(),
        };

        store.publish("ns", vec![datum(9), datum(10)]).await.unwrap();
        store.publish("elsewhere", vec![datum(10)]).await.unwrap();

        let range = TimeWindow::day(chrono::NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        assert_eq!(store.query("ns", &range).await.unwrap(), vec![datum(10)]);
        assert_eq!(store.batch_count().await, 2);
    }

    #[tokio::test]
    async fn test_directory_and_broker() {
        let directory = StaticDirectory::without_organizations("123456789012");
        assert!(matches!(
            directory.list_accounts().await,
            Err(FlexError::OrganizationsNotInUse)
        ));
        assert_eq!(directory.caller_account_id().await.unwrap(), "123456789012");

        let broker = RoleArnBroker::new("OrganizationAccountAccessRole").deny("999999999999");
        let credentials = broker.assume_role("210987654321").await.unwrap();
        assert_eq!(
            credentials.role_arn,
            "arn:aws:iam::210987654321:role/OrganizationAccountAccessRole"
        );
        assert!(broker.assume_role("999999999999").await.is_err());
    }
}
