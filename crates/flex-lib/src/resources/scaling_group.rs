//! Scaling group and scaling policy reconstruction

use super::{Reconstructor, TemplateRef};
use crate::events::{GroupAction, GroupConfig, GroupEvent, PolicyEvent, TypedEvent};
use crate::time_window::TimeWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Instance overrides of a mixed-instances group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    pub uses_heterogeneous_requirements: bool,
    /// Number of explicitly listed instance types, `None` if there are none
    pub fixed_instance_type_count: Option<u32>,
}

/// Scaling policy type attached to a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyType {
    Predictive,
    TargetTracking,
    Simple,
    Step,
    Other(String),
}

impl PolicyType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "PredictiveScaling" => Self::Predictive,
            "TargetTrackingScaling" => Self::TargetTracking,
            "SimpleScaling" => Self::Simple,
            "StepScaling" => Self::Step,
            other => Self::Other(other.to_string()),
        }
    }

    /// Contribution of the policy to the policy score
    pub fn weight(&self) -> f64 {
        match self {
            Self::Predictive => 3.0,
            Self::TargetTracking => 2.0,
            Self::Simple | Self::Step => 1.0,
            Self::Other(_) => 0.0,
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Predictive => write!(f, "PredictiveScaling"),
            Self::TargetTracking => write!(f, "TargetTrackingScaling"),
            Self::Simple => write!(f, "SimpleScaling"),
            Self::Step => write!(f, "StepScaling"),
            Self::Other(raw) => write!(f, "{}", raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingGroup {
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// `None` for launch-configuration groups
    pub template: Option<TemplateRef>,
    pub launch_configuration: Option<String>,
    pub overrides: Overrides,
    pub policy_type: Option<PolicyType>,
}

impl ScalingGroup {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            created_at: None,
            deleted_at: None,
            template: None,
            launch_configuration: None,
            overrides: Overrides::default(),
            policy_type: None,
        }
    }

    pub fn hydrate(&mut self, event: &GroupEvent) {
        match event.action {
            GroupAction::Create => self.created_at = Some(event.time),
            GroupAction::Delete => self.deleted_at = Some(event.time),
            GroupAction::Update => {}
        }

        match &event.config {
            Some(GroupConfig::Template(config)) => {
                self.template = Some(config.template.clone());
                self.overrides = config.overrides.clone();
                self.launch_configuration = None;
            }
            Some(GroupConfig::LaunchConfiguration(name)) => {
                self.template = None;
                self.overrides = Overrides::default();
                self.launch_configuration = Some(name.clone());
            }
            None => {}
        }
    }

    /// Still existed at some point of `window`
    pub fn alive_during(&self, window: &TimeWindow) -> bool {
        self.deleted_at
            .map_or(true, |deleted| !window.after(&deleted))
    }
}

/// Folds group lifecycle events and, out of band, policy events keyed by group name
#[derive(Debug, Default)]
pub struct ScalingGroupReconstructor {
    groups: BTreeMap<String, ScalingGroup>,
    policies: BTreeMap<String, Option<PolicyType>>,
}

impl ScalingGroupReconstructor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reconstructor for ScalingGroupReconstructor {
    type Output = BTreeMap<String, ScalingGroup>;

    fn apply(&mut self, event: TypedEvent) {
        match event {
            TypedEvent::ScalingGroup(event) => {
                self.groups
                    .entry(event.group_name.clone())
                    .or_insert_with(|| ScalingGroup::new(&event.group_name))
                    .hydrate(&event);
            }
            TypedEvent::ScalingPolicy(PolicyEvent::Put {
                group_name,
                policy_type,
            }) => {
                self.policies
                    .insert(group_name, Some(PolicyType::parse(&policy_type)));
            }
            TypedEvent::ScalingPolicy(PolicyEvent::Delete { group_name }) => {
                self.policies.insert(group_name, None);
            }
            TypedEvent::Instance(_) | TypedEvent::LaunchTemplate(_) => {}
        }
    }

    fn finish(self, window: &TimeWindow) -> BTreeMap<String, ScalingGroup> {
        let folded = self.groups.len();
        let mut groups: BTreeMap<String, ScalingGroup> = self
            .groups
            .into_iter()
            .filter(|(_, group)| group.alive_during(window))
            .collect();

        for (name, policy) in self.policies {
            if let Some(group) = groups.get_mut(&name) {
                group.policy_type = policy;
            }
        }

        debug!(folded = folded, kept = groups.len(), "Scaling groups reconstructed");
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::GroupTemplate;
    use crate::resources::VersionKey;
    use chrono::{NaiveDate, TimeZone};

    fn at(day: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, h, 0, 0).unwrap()
    }

    fn window() -> TimeWindow {
        TimeWindow::day(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap())
    }

    fn group_event(name: &str, time: DateTime<Utc>, action: GroupAction, config: Option<GroupConfig>) -> TypedEvent {
        TypedEvent::ScalingGroup(GroupEvent {
            group_name: name.to_string(),
            time,
            action,
            config,
        })
    }

    fn template_config(count: Option<u32>) -> GroupConfig {
        GroupConfig::Template(GroupTemplate {
            template: TemplateRef::new("lt-1".to_string(), VersionKey::Default),
            overrides: Overrides {
                uses_heterogeneous_requirements: false,
                fixed_instance_type_count: count,
            },
        })
    }

    #[test]
    fn test_policy_type_weights() {
        assert_eq!(PolicyType::parse("PredictiveScaling").weight(), 3.0);
        assert_eq!(PolicyType::parse("TargetTrackingScaling").weight(), 2.0);
        assert_eq!(PolicyType::parse("StepScaling").weight(), 1.0);
        assert_eq!(PolicyType::parse("SimpleScaling").weight(), 1.0);
        assert_eq!(PolicyType::parse("Custom").weight(), 0.0);
        assert_eq!(PolicyType::parse("Custom").to_string(), "Custom");
    }

    #[test]
    fn test_update_without_config_keeps_template() {
        let mut reconstructor = ScalingGroupReconstructor::new();
        reconstructor.apply(group_event("web", at(9, 0), GroupAction::Create, Some(template_config(Some(4)))));
        reconstructor.apply(group_event("web", at(9, 1), GroupAction::Update, None));

        let groups = reconstructor.finish(&window());
        let web = &groups["web"];
        assert_eq!(web.created_at, Some(at(9, 0)));
        assert_eq!(web.overrides.fixed_instance_type_count, Some(4));
        assert!(web.template.is_some());
    }

    #[test]
    fn test_switch_to_launch_configuration_clears_template() {
        let mut reconstructor = ScalingGroupReconstructor::new();
        reconstructor.apply(group_event("web", at(9, 0), GroupAction::Create, Some(template_config(Some(4)))));
        reconstructor.apply(group_event(
            "web",
            at(9, 1),
            GroupAction::Update,
            Some(GroupConfig::LaunchConfiguration("legacy".to_string())),
        ));

        let groups = reconstructor.finish(&window());
        let web = &groups["web"];
        assert!(web.template.is_none());
        assert_eq!(web.overrides, Overrides::default());
        assert_eq!(web.launch_configuration.as_deref(), Some("legacy"));
    }

    #[test]
    fn test_groups_deleted_before_window_are_dropped() {
        let mut reconstructor = ScalingGroupReconstructor::new();
        reconstructor.apply(group_event("gone", at(8, 0), GroupAction::Create, None));
        reconstructor.apply(group_event("gone", at(9, 0), GroupAction::Delete, None));
        reconstructor.apply(group_event("today", at(8, 0), GroupAction::Create, None));
        reconstructor.apply(group_event("today", at(10, 5), GroupAction::Delete, None));

        let groups = reconstructor.finish(&window());
        assert!(!groups.contains_key("gone"));
        assert_eq!(groups["today"].deleted_at, Some(at(10, 5)));
    }

    #[test]
    fn test_last_policy_event_wins() {
        let mut reconstructor = ScalingGroupReconstructor::new();
        reconstructor.apply(group_event("web", at(8, 0), GroupAction::Create, None));
        reconstructor.apply(group_event("api", at(8, 0), GroupAction::Create, None));
        reconstructor.apply(TypedEvent::ScalingPolicy(PolicyEvent::Put {
            group_name: "web".to_string(),
            policy_type: "TargetTrackingScaling".to_string(),
        }));
        reconstructor.apply(TypedEvent::ScalingPolicy(PolicyEvent::Put {
            group_name: "web".to_string(),
            policy_type: "PredictiveScaling".to_string(),
        }));
        reconstructor.apply(TypedEvent::ScalingPolicy(PolicyEvent::Put {
            group_name: "api".to_string(),
            policy_type: "StepScaling".to_string(),
        }));
        reconstructor.apply(TypedEvent::ScalingPolicy(PolicyEvent::Delete {
            group_name: "api".to_string(),
        }));
        reconstructor.apply(TypedEvent::ScalingPolicy(PolicyEvent::Put {
            group_name: "unknown".to_string(),
            policy_type: "StepScaling".to_string(),
        }));

        let groups = reconstructor.finish(&window());
        assert_eq!(groups["web"].policy_type, Some(PolicyType::Predictive));
        assert_eq!(groups["api"].policy_type, None);
        assert_eq!(groups.len(), 2);
    }
}
