//! Compute instance reconstruction

use super::{Reconstructor, TemplateRef};
use crate::events::{InstanceAction, InstanceEvent, InstanceFragment, TypedEvent};
use crate::time_window::TimeWindow;
use crate::usage::{self, LifecycleEvent, RunningWindow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// A compute instance folded from its lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instance {
    pub id: String,
    pub instance_type: Option<String>,
    pub size_class: Option<String>,
    pub architecture: Option<String>,
    /// Only known once the run event has been seen
    pub is_spot: Option<bool>,
    pub launched_at: Option<DateTime<Utc>>,
    pub terminated_at: Option<DateTime<Utc>>,
    pub scaling_group_name: Option<String>,
    pub template: Option<TemplateRef>,
    #[serde(skip)]
    pub lifecycle_events: Vec<LifecycleEvent>,
    pub running_windows: Vec<RunningWindow>,
    pub utilization_hours: u64,
}

impl Instance {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            instance_type: None,
            size_class: None,
            architecture: None,
            is_spot: None,
            launched_at: None,
            terminated_at: None,
            scaling_group_name: None,
            template: None,
            lifecycle_events: Vec::new(),
            running_windows: Vec::new(),
            utilization_hours: 0,
        }
    }

    /// Apply one event fragment, touching only the fields it carries
    pub fn hydrate(&mut self, action: InstanceAction, time: DateTime<Utc>, fragment: &InstanceFragment) {
        let lifecycle = LifecycleEvent::derive(action, time, fragment);
        if self
            .lifecycle_events
            .iter()
            .any(|e| e.action == action && e.time == time)
        {
            return;
        }
        // Events arrive in ascending order, so pushing keeps the list sorted
        self.lifecycle_events.push(lifecycle);

        if let Some(instance_type) = &fragment.instance_type {
            self.size_class = instance_type.split('.').nth(1).map(str::to_string);
            self.instance_type = Some(instance_type.clone());
        }
        if let Some(architecture) = &fragment.architecture {
            self.architecture = Some(architecture.clone());
        }

        match action {
            InstanceAction::Run => {
                self.is_spot = Some(fragment.is_spot);
                self.launched_at = Some(time);
            }
            InstanceAction::Terminate | InstanceAction::BidEvicted => {
                self.terminated_at = Some(time);
            }
            InstanceAction::Start | InstanceAction::Stop => {}
        }

        if let Some(group) = fragment.scaling_group_name() {
            self.scaling_group_name = Some(group.to_string());
        }
        if let Some(template) = fragment.template_ref() {
            self.template = Some(template);
        }
    }

    /// Capacity factor of the instance's size class
    pub fn size_factor(&self) -> Option<f64> {
        self.size_class.as_deref().and_then(usage::size_factor)
    }

    /// Size class and launch time are both known
    pub fn is_complete(&self) -> bool {
        self.size_factor().is_some() && self.launched_at.is_some()
    }

    /// Compute running windows and utilization-hours for `window`
    pub fn derive_usage(&mut self, window: &TimeWindow) {
        let factor = self.size_factor().unwrap_or(0.0);
        self.running_windows = usage::running_windows(&self.lifecycle_events, window);
        self.utilization_hours = usage::utilization_hours(&self.running_windows, window, factor);
    }
}

/// Folds instance events, fanning each event out to every instance it lists
#[derive(Debug, Default)]
pub struct InstanceReconstructor {
    instances: BTreeMap<String, Instance>,
}

impl InstanceReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    fn fold(&mut self, event: &InstanceEvent) {
        for fragment in &event.fragments {
            self.instances
                .entry(fragment.instance_id.clone())
                .or_insert_with(|| Instance::new(&fragment.instance_id))
                .hydrate(event.action, event.time, fragment);
        }
    }
}

impl Reconstructor for InstanceReconstructor {
    type Output = BTreeMap<String, Instance>;

    fn apply(&mut self, event: TypedEvent) {
        if let TypedEvent::Instance(event) = event {
            self.fold(&event);
        }
    }

    fn finish(self, window: &TimeWindow) -> BTreeMap<String, Instance> {
        let folded = self.instances.len();

        let instances: BTreeMap<String, Instance> = self
            .instances
            .into_iter()
            .filter(|(_, instance)| instance.is_complete())
            .filter(|(_, instance)| {
                instance
                    .terminated_at
                    .map_or(true, |terminated| !window.after(&terminated))
            })
            .map(|(id, mut instance)| {
                instance.derive_usage(window);
                (id, instance)
            })
            .collect();

        debug!(
            folded = folded,
            kept = instances.len(),
            "Instances reconstructed"
        );
        instances
    }
}
