//! Audit event normalization and typing
//!
//! Raw audit records carry an opaque JSON payload. This module turns them
//! into a [`TypedEvent`] per resource kind so the reconstructors can match
//! on exactly what each event means.

mod normalizer;

pub use normalizer::normalize;

use crate::error::{FlexError, Result};
use crate::models::{AuditEvent, ResourceKind};
use crate::resources::{Overrides, TemplateRef, VersionKey};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub const EVENT_RUN_INSTANCES: &str = "RunInstances";
pub const EVENT_START_INSTANCES: &str = "StartInstances";
pub const EVENT_STOP_INSTANCES: &str = "StopInstances";
pub const EVENT_TERMINATE_INSTANCES: &str = "TerminateInstances";
pub const EVENT_BID_EVICTED: &str = "BidEvictedEvent";

pub const EVENT_CREATE_LAUNCH_TEMPLATE: &str = "CreateLaunchTemplate";
pub const EVENT_CREATE_LAUNCH_TEMPLATE_VERSION: &str = "CreateLaunchTemplateVersion";
pub const EVENT_MODIFY_LAUNCH_TEMPLATE: &str = "ModifyLaunchTemplate";

pub const EVENT_CREATE_SCALING_GROUP: &str = "CreateAutoScalingGroup";
pub const EVENT_UPDATE_SCALING_GROUP: &str = "UpdateAutoScalingGroup";
pub const EVENT_DELETE_SCALING_GROUP: &str = "DeleteAutoScalingGroup";

pub const EVENT_PUT_SCALING_POLICY: &str = "PutScalingPolicy";
pub const EVENT_DELETE_POLICY: &str = "DeletePolicy";

/// Instance events looked up by resource type (evictions are looked up by name)
pub const INSTANCE_EVENT_NAMES: &[&str] = &[
    EVENT_RUN_INSTANCES,
    EVENT_START_INSTANCES,
    EVENT_STOP_INSTANCES,
    EVENT_TERMINATE_INSTANCES,
    EVENT_BID_EVICTED,
];
pub const LAUNCH_TEMPLATE_EVENT_NAMES: &[&str] = &[
    EVENT_CREATE_LAUNCH_TEMPLATE,
    EVENT_CREATE_LAUNCH_TEMPLATE_VERSION,
    EVENT_MODIFY_LAUNCH_TEMPLATE,
];
pub const SCALING_GROUP_EVENT_NAMES: &[&str] = &[
    EVENT_CREATE_SCALING_GROUP,
    EVENT_UPDATE_SCALING_GROUP,
    EVENT_DELETE_SCALING_GROUP,
];
pub const SCALING_POLICY_EVENT_NAMES: &[&str] = &[EVENT_PUT_SCALING_POLICY, EVENT_DELETE_POLICY];

/// Instance state codes reported in lifecycle payloads
pub const STATE_CODE_PENDING: i64 = 0;
pub const STATE_CODE_RUNNING: i64 = 16;

const MARKET_SPOT: &str = "spot";
const DEFAULT_POLICY_TYPE: &str = "SimpleScaling";

pub const TAG_SCALING_GROUP_NAME: &str = "aws:autoscaling:groupName";
pub const TAG_LAUNCH_TEMPLATE_ID: &str = "aws:ec2launchtemplate:id";
pub const TAG_LAUNCH_TEMPLATE_VERSION: &str = "aws:ec2launchtemplate:version";

/// Map an event name to the resource kind it belongs to
pub fn kind_of(event_name: &str) -> Option<ResourceKind> {
    if INSTANCE_EVENT_NAMES.contains(&event_name) {
        Some(ResourceKind::Instance)
    } else if LAUNCH_TEMPLATE_EVENT_NAMES.contains(&event_name) {
        Some(ResourceKind::LaunchTemplate)
    } else if SCALING_GROUP_EVENT_NAMES.contains(&event_name) {
        Some(ResourceKind::ScalingGroup)
    } else if SCALING_POLICY_EVENT_NAMES.contains(&event_name) {
        Some(ResourceKind::ScalingPolicy)
    } else {
        None
    }
}

/// A typed audit event, one variant per folded resource kind
#[derive(Debug, Clone, PartialEq)]
pub enum TypedEvent {
    Instance(InstanceEvent),
    LaunchTemplate(TemplateEvent),
    ScalingGroup(GroupEvent),
    ScalingPolicy(PolicyEvent),
}

impl TypedEvent {
    /// Parse a normalized audit event. Events of unknown names yield `None`.
    pub fn parse(event: &AuditEvent) -> Result<Option<Self>> {
        let parsed = match kind_of(&event.event_name) {
            Some(ResourceKind::Instance) => Self::Instance(InstanceEvent::parse(event)?),
            Some(ResourceKind::LaunchTemplate) => Self::LaunchTemplate(TemplateEvent::parse(event)?),
            Some(ResourceKind::ScalingGroup) => Self::ScalingGroup(GroupEvent::parse(event)?),
            Some(ResourceKind::ScalingPolicy) => Self::ScalingPolicy(PolicyEvent::parse(event)?),
            None => return Ok(None),
        };
        Ok(Some(parsed))
    }
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceAction {
    Run,
    Start,
    Stop,
    Terminate,
    /// Spot capacity reclaimed by the provider
    BidEvicted,
}

impl InstanceAction {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            EVENT_RUN_INSTANCES => Some(Self::Run),
            EVENT_START_INSTANCES => Some(Self::Start),
            EVENT_STOP_INSTANCES => Some(Self::Stop),
            EVENT_TERMINATE_INSTANCES => Some(Self::Terminate),
            EVENT_BID_EVICTED => Some(Self::BidEvicted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Run => EVENT_RUN_INSTANCES,
            Self::Start => EVENT_START_INSTANCES,
            Self::Stop => EVENT_STOP_INSTANCES,
            Self::Terminate => EVENT_TERMINATE_INSTANCES,
            Self::BidEvicted => EVENT_BID_EVICTED,
        }
    }
}

/// Per-instance slice of an instance event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceFragment {
    pub instance_id: String,
    pub instance_type: Option<String>,
    pub architecture: Option<String>,
    pub is_spot: bool,
    pub tags: BTreeMap<String, String>,
    pub previous_state: Option<i64>,
    pub current_state: Option<i64>,
}

impl InstanceFragment {
    /// Scaling group the instance was launched into, from its tags
    pub fn scaling_group_name(&self) -> Option<&str> {
        self.tags.get(TAG_SCALING_GROUP_NAME).map(String::as_str)
    }

    /// Launch template reference, from its tags
    pub fn template_ref(&self) -> Option<TemplateRef> {
        let id = self.tags.get(TAG_LAUNCH_TEMPLATE_ID)?;
        let version = self
            .tags
            .get(TAG_LAUNCH_TEMPLATE_VERSION)
            .and_then(|v| VersionKey::parse(v))
            .unwrap_or(VersionKey::Default);
        Some(TemplateRef::new(id.clone(), version))
    }
}

/// An instance event with one fragment per referenced instance
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceEvent {
    pub action: InstanceAction,
    pub time: DateTime<Utc>,
    pub fragments: Vec<InstanceFragment>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInstanceItem {
    instance_id: String,
    instance_type: Option<String>,
    architecture: Option<String>,
    instance_lifecycle: Option<String>,
    tag_set: Option<RawTagSet>,
    previous_state: Option<RawState>,
    current_state: Option<RawState>,
}

#[derive(Deserialize)]
struct RawTagSet {
    #[serde(default)]
    items: Vec<RawTag>,
}

#[derive(Deserialize)]
struct RawTag {
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
struct RawState {
    code: i64,
}

impl From<RawInstanceItem> for InstanceFragment {
    fn from(item: RawInstanceItem) -> Self {
        Self {
            instance_id: item.instance_id,
            instance_type: item.instance_type,
            architecture: item.architecture,
            is_spot: item.instance_lifecycle.as_deref() == Some(MARKET_SPOT),
            tags: item
                .tag_set
                .map(|set| set.items.into_iter().map(|t| (t.key, t.value)).collect())
                .unwrap_or_default(),
            previous_state: item.previous_state.map(|s| s.code),
            current_state: item.current_state.map(|s| s.code),
        }
    }
}

impl InstanceEvent {
    pub fn parse(event: &AuditEvent) -> Result<Self> {
        let action = InstanceAction::from_name(&event.event_name)
            .ok_or_else(|| FlexError::malformed(&event.event_name, "not an instance event"))?;

        let fragments = match action {
            InstanceAction::BidEvicted => {
                let ids = event
                    .payload
                    .pointer("/serviceEventDetails/instanceIdSet")
                    .and_then(Value::as_array)
                    .ok_or_else(|| {
                        FlexError::malformed(&event.event_name, "missing instanceIdSet")
                    })?;
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(|id| InstanceFragment {
                        instance_id: id.to_string(),
                        ..Default::default()
                    })
                    .collect()
            }
            _ => {
                let items = event
                    .payload
                    .pointer("/responseElements/instancesSet/items")
                    .cloned()
                    .ok_or_else(|| {
                        FlexError::malformed(&event.event_name, "missing instancesSet")
                    })?;
                let items: Vec<RawInstanceItem> = serde_json::from_value(items)
                    .map_err(|e| FlexError::malformed(&event.event_name, e.to_string()))?;
                items.into_iter().map(InstanceFragment::from).collect()
            }
        };

        Ok(Self {
            action,
            time: event.event_time,
            fragments,
        })
    }
}

// ---------------------------------------------------------------------------
// Launch templates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateAction {
    /// Template created; its first version is number 1 and the default
    Create { uses_heterogeneous_requirements: bool },
    CreateVersion {
        version_number: u32,
        is_default: bool,
        uses_heterogeneous_requirements: bool,
    },
    /// Default version repointed
    Modify { default_version: Option<u32> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateEvent {
    pub template_id: String,
    pub template_name: String,
    pub time: DateTime<Utc>,
    pub action: TemplateAction,
}

fn version_number(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl TemplateEvent {
    pub fn parse(event: &AuditEvent) -> Result<Self> {
        let name = &event.event_name;
        let template_name = event
            .resource_name(0)
            .ok_or_else(|| FlexError::malformed(name, "missing template name"))?
            .to_string();
        let template_id = event
            .resource_name(1)
            .ok_or_else(|| FlexError::malformed(name, "missing template id"))?
            .to_string();

        let payload = &event.payload;
        let action = match name.as_str() {
            EVENT_CREATE_LAUNCH_TEMPLATE => TemplateAction::Create {
                uses_heterogeneous_requirements: payload
                    .pointer("/requestParameters/CreateLaunchTemplateRequest/LaunchTemplateData/InstanceRequirements")
                    .is_some(),
            },
            EVENT_CREATE_LAUNCH_TEMPLATE_VERSION => {
                let version = payload
                    .pointer("/responseElements/CreateLaunchTemplateVersionResponse/launchTemplateVersion")
                    .ok_or_else(|| FlexError::malformed(name, "missing launchTemplateVersion"))?;
                TemplateAction::CreateVersion {
                    version_number: version_number(version.get("versionNumber"))
                        .ok_or_else(|| FlexError::malformed(name, "missing versionNumber"))?,
                    is_default: version
                        .get("defaultVersion")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                    uses_heterogeneous_requirements: payload
                        .pointer("/requestParameters/CreateLaunchTemplateVersionRequest/LaunchTemplateData/InstanceRequirements")
                        .is_some(),
                }
            }
            EVENT_MODIFY_LAUNCH_TEMPLATE => TemplateAction::Modify {
                default_version: version_number(payload.pointer(
                    "/responseElements/ModifyLaunchTemplateResponse/launchTemplate/defaultVersionNumber",
                )),
            },
            _ => return Err(FlexError::malformed(name, "not a launch template event")),
        };

        Ok(Self {
            template_id,
            template_name,
            time: event.event_time,
            action,
        })
    }
}

// ---------------------------------------------------------------------------
// Scaling groups and policies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupAction {
    Create,
    Update,
    Delete,
}

/// Template configuration carried by a group event
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTemplate {
    pub template: TemplateRef,
    pub overrides: Overrides,
}

/// Launch configuration source named by a group event
#[derive(Debug, Clone, PartialEq)]
pub enum GroupConfig {
    Template(GroupTemplate),
    LaunchConfiguration(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupEvent {
    pub group_name: String,
    pub time: DateTime<Utc>,
    pub action: GroupAction,
    /// `None` when the event leaves the launch configuration untouched
    pub config: Option<GroupConfig>,
}

fn template_spec(spec: &Value) -> Option<TemplateRef> {
    let key = spec
        .get("launchTemplateId")
        .or_else(|| spec.get("launchTemplateName"))
        .and_then(Value::as_str)?;
    let version = spec
        .get("version")
        .and_then(Value::as_str)
        .and_then(VersionKey::parse)
        .unwrap_or(VersionKey::Default);
    Some(TemplateRef::new(key.to_string(), version))
}

fn overrides(list: Option<&Value>) -> Overrides {
    let mut overrides = Overrides::default();
    let mut fixed_types = 0u32;

    for entry in list.and_then(Value::as_array).into_iter().flatten() {
        if entry.get("instanceRequirements").is_some() {
            overrides.uses_heterogeneous_requirements = true;
        } else if entry.get("instanceType").is_some() {
            fixed_types += 1;
        }
    }

    if fixed_types != 0 {
        overrides.fixed_instance_type_count = Some(fixed_types);
    }
    overrides
}

impl GroupEvent {
    pub fn parse(event: &AuditEvent) -> Result<Self> {
        let name = &event.event_name;
        let action = match name.as_str() {
            EVENT_CREATE_SCALING_GROUP => GroupAction::Create,
            EVENT_UPDATE_SCALING_GROUP => GroupAction::Update,
            EVENT_DELETE_SCALING_GROUP => GroupAction::Delete,
            _ => return Err(FlexError::malformed(name, "not a scaling group event")),
        };
        let group_name = event
            .resource_name(0)
            .ok_or_else(|| FlexError::malformed(name, "missing group name"))?
            .to_string();

        let params = event.payload.get("requestParameters");
        let mixed = params.and_then(|p| p.pointer("/mixedInstancesPolicy/launchTemplate"));
        let plain = params.and_then(|p| p.get("launchTemplate"));
        let launch_configuration = params
            .and_then(|p| p.get("launchConfigurationName"))
            .and_then(Value::as_str);

        let config = if let Some(mixed) = mixed {
            mixed
                .get("launchTemplateSpecification")
                .and_then(template_spec)
                .map(|template| {
                    GroupConfig::Template(GroupTemplate {
                        template,
                        overrides: overrides(mixed.get("overrides")),
                    })
                })
        } else if let Some(plain) = plain {
            template_spec(plain).map(|template| {
                GroupConfig::Template(GroupTemplate {
                    template,
                    overrides: Overrides::default(),
                })
            })
        } else {
            launch_configuration.map(|name| GroupConfig::LaunchConfiguration(name.to_string()))
        };

        Ok(Self {
            group_name,
            time: event.event_time,
            action,
            config,
        })
    }
}

/// Scaling policy change keyed by group name
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyEvent {
    Put {
        group_name: String,
        policy_type: String,
    },
    Delete {
        group_name: String,
    },
}

impl PolicyEvent {
    pub fn parse(event: &AuditEvent) -> Result<Self> {
        let name = &event.event_name;
        let params = event.payload.get("requestParameters");
        let group_name = params
            .and_then(|p| p.get("autoScalingGroupName"))
            .and_then(Value::as_str)
            .ok_or_else(|| FlexError::malformed(name, "missing autoScalingGroupName"))?
            .to_string();

        match name.as_str() {
            EVENT_PUT_SCALING_POLICY => Ok(Self::Put {
                group_name,
                policy_type: params
                    .and_then(|p| p.get("policyType"))
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_POLICY_TYPE)
                    .to_string(),
            }),
            EVENT_DELETE_POLICY => Ok(Self::Delete { group_name }),
            _ => Err(FlexError::malformed(name, "not a scaling policy event")),
        }
    }

    pub fn group_name(&self) -> &str {
        match self {
            Self::Put { group_name, .. } | Self::Delete { group_name } => group_name,
        }
    }
}
