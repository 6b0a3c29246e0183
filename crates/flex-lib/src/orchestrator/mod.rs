//! Fetch orchestration
//!
//! An evaluation run resolves the accounts to evaluate, fans out one worker
//! per account, and joins every worker before scoring begins. Each worker
//! walks the account's regions sequentially and folds the three resource
//! kinds one after another, so it only ever writes into its own [`Account`].
//!
//! All cloud access goes through the collaborator traits defined here.

mod evaluator;
mod fetcher;


pub use evaluator::{
    EvaluationConfig, Evaluator, FailurePolicy, RunContext, RunReport, DEFAULT_BUCKET,
    DEFAULT_MEMBER_ROLE_NAME, DEFAULT_NAMESPACE,
};
pub use fetcher::{fetch_accounts, AccountFetcher, FetchOutcome, DEFAULT_LOOKBACK_DAYS};

use crate::error::{FlexError, Result};
use crate::models::{Account, AccountInfo, AuditEvent, Credentials};
use crate::time_window::TimeWindow;
use tracing::{info, warn};

pub use async_trait::async_trait;

/// Lookup attribute of an audit log query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupAttribute {
    ResourceType(String),
    EventName(String),
}

/// One audit log lookup within a region
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub attribute: LookupAttribute,
    /// Only events with one of these names are returned; empty keeps all
    pub event_names: Vec<String>,
    pub region: String,
    pub range: TimeWindow,
}

impl AuditQuery {
    pub fn by_resource_type(resource_type: &str, event_names: &[&str], region: &str, range: TimeWindow) -> Self {
        Self {
            attribute: LookupAttribute::ResourceType(resource_type.to_string()),
            event_names: event_names.iter().map(|n| n.to_string()).collect(),
            region: region.to_string(),
            range,
        }
    }

    pub fn by_event_name(event_name: &str, region: &str, range: TimeWindow) -> Self {
        Self {
            attribute: LookupAttribute::EventName(event_name.to_string()),
            event_names: Vec::new(),
            region: region.to_string(),
            range,
        }
    }

    /// Whether `event` satisfies the lookup attribute, name filter and range
    pub fn matches(&self, event: &AuditEvent) -> bool {
        let attribute = match &self.attribute {
            LookupAttribute::ResourceType(ty) => event.resources.iter().any(|r| &r.resource_type == ty),
            LookupAttribute::EventName(name) => &event.event_name == name,
        };
        let named = self.event_names.is_empty() || self.event_names.iter().any(|n| n == &event.event_name);

        attribute && named && self.range.contains(&event.event_time)
    }
}

/// Identity under which one account's collaborators are called.
///
/// `credentials` is `None` for the master account, which uses ambient
/// credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSession {
    pub account_id: String,
    pub credentials: Option<Credentials>,
}

/// Source of audit events
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn query(&self, session: &AccountSession, query: &AuditQuery) -> Result<Vec<AuditEvent>>;
}

/// Organization account listing
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Every account of the organization.
    ///
    /// Returns [`FlexError::OrganizationsNotInUse`] when the caller does not
    /// belong to an organization.
    async fn list_accounts(&self) -> Result<Vec<AccountInfo>>;

    async fn caller_account_id(&self) -> Result<String>;
}

/// Scoped credentials for member accounts
#[async_trait]
pub trait CredentialBroker: Send + Sync {
    async fn assume_role(&self, account_id: &str) -> Result<Credentials>;
}

/// Enabled regions of an account
#[async_trait]
pub trait RegionCatalog: Send + Sync {
    async fn regions(&self, session: &AccountSession) -> Result<Vec<String>>;
}

/// Accounts to evaluate.
///
/// Falls back to the caller account alone, marked as master, when the
/// directory reports that organizations are not in use.
pub async fn resolve_accounts(directory: &dyn AccountDirectory) -> Result<Vec<Account>> {
    let infos = match directory.list_accounts().await {
        Ok(infos) => infos,
        Err(FlexError::OrganizationsNotInUse) => {
            let caller = directory.caller_account_id().await?;
            warn!(
                account_id = %caller,
                "Organizations not in use, evaluating the caller account only"
            );
            vec![AccountInfo {
                id: caller,
                name: None,
                is_master: true,
            }]
        }
        Err(e) => return Err(e),
    };

    info!(accounts = infos.len(), "Resolved accounts to evaluate");
    Ok(infos.iter().map(Account::new).collect())
}
