//! Core data models shared by the reconstruction and scoring pipeline

use crate::resources::{Instance, LaunchTemplateCatalog, ScalingGroup};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Audit resource type of instances
pub const RESOURCE_TYPE_INSTANCE: &str = "AWS::EC2::Instance";
/// Audit resource type of launch templates
pub const RESOURCE_TYPE_LAUNCH_TEMPLATE: &str = "AWS::EC2::LaunchTemplate";
/// Audit resource type of scaling groups
pub const RESOURCE_TYPE_SCALING_GROUP: &str = "AWS::AutoScaling::AutoScalingGroup";
/// Audit resource type of scaling policies
pub const RESOURCE_TYPE_SCALING_POLICY: &str = "AWS::AutoScaling::ScalingPolicy";

/// Resource kinds whose audit events are folded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Instance,
    LaunchTemplate,
    ScalingGroup,
    ScalingPolicy,
}

impl ResourceKind {
    /// Resource type string used by the audit log
    pub fn resource_type(&self) -> &'static str {
        match self {
            ResourceKind::Instance => RESOURCE_TYPE_INSTANCE,
            ResourceKind::LaunchTemplate => RESOURCE_TYPE_LAUNCH_TEMPLATE,
            ResourceKind::ScalingGroup => RESOURCE_TYPE_SCALING_GROUP,
            ResourceKind::ScalingPolicy => RESOURCE_TYPE_SCALING_POLICY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Instance => "instance",
            ResourceKind::LaunchTemplate => "launch_template",
            ResourceKind::ScalingGroup => "scaling_group",
            ResourceKind::ScalingPolicy => "scaling_policy",
        }
    }
}

/// Whether the API call behind an audit event succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Error,
}

/// A resource named by an audit event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub resource_type: String,
    pub resource_name: String,
}

/// A single audit record as returned by the audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    #[serde(default)]
    pub event_id: Option<String>,
    pub event_name: String,
    pub event_time: DateTime<Utc>,
    #[serde(default)]
    pub resources: Vec<ResourceRef>,
    pub payload: serde_json::Value,
}

impl AuditEvent {
    /// Failed calls carry an `errorCode` in their payload
    pub fn outcome(&self) -> Outcome {
        if self.payload.get("errorCode").is_some() {
            Outcome::Error
        } else {
            Outcome::Ok
        }
    }

    /// Resource kind implied by the event name, if it is one we fold
    pub fn resource_kind(&self) -> Option<ResourceKind> {
        crate::events::kind_of(&self.event_name)
    }

    /// Name of the n-th referenced resource
    pub fn resource_name(&self, index: usize) -> Option<&str> {
        self.resources.get(index).map(|r| r.resource_name.as_str())
    }
}

/// Account entry from the account directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_master: bool,
}

/// Credentials scoped to one member account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub account_id: String,
    pub role_arn: String,
    pub session_name: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Name/value pair attached to a published metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

/// A single datapoint handed to the metric sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDatum {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub dimensions: Vec<Dimension>,
}

impl MetricDatum {
    /// Value of the named dimension, if present
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }
}

/// Resources reconstructed for one account during one evaluation run
#[derive(Debug, Clone, Default)]
pub struct Account {
    pub id: String,
    pub name: Option<String>,
    pub is_master: bool,
    pub instances: BTreeMap<String, Instance>,
    pub launch_templates: LaunchTemplateCatalog,
    pub scaling_groups: BTreeMap<String, ScalingGroup>,
}

impl Account {
    pub fn new(info: &AccountInfo) -> Self {
        Self {
            id: info.id.clone(),
            name: info.name.clone(),
            is_master: info.is_master,
            ..Default::default()
        }
    }

    /// Total utilization-hours across the account's instances
    pub fn utilization_hours(&self) -> u64 {
        self.instances.values().map(|i| i.utilization_hours).sum()
    }
}
