//! Resource reconstruction
//!
//! Each resource kind has a [`Reconstructor`] that folds normalized, typed
//! audit events into identity-keyed resources and applies the post-fold
//! filters once folding is complete.

mod instance;
mod launch_template;
mod scaling_group;

#[cfg(test)]
mod tests;

pub use instance::{Instance, InstanceReconstructor};
pub use launch_template::{
    LaunchTemplate, LaunchTemplateCatalog, LaunchTemplateReconstructor, LaunchTemplateVersion,
    TemplateKey, TemplateRef, VersionKey, VERSION_DEFAULT, VERSION_LATEST,
};
pub use scaling_group::{
    Overrides, PolicyType, ScalingGroup, ScalingGroupReconstructor,
};

use crate::events::{normalize, TypedEvent};
use crate::models::AuditEvent;
use crate::time_window::TimeWindow;
use tracing::warn;

/// Hydration state machine for one resource kind
pub trait Reconstructor {
    type Output;

    /// Fold one event; events of other kinds are ignored
    fn apply(&mut self, event: TypedEvent);

    /// Apply post-fold filters and derived fields for `window`
    fn finish(self, window: &TimeWindow) -> Self::Output;
}

/// Counters describing one fold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FoldStats {
    pub received: usize,
    pub folded: usize,
    pub malformed: usize,
}

impl FoldStats {
    pub fn add(&mut self, other: FoldStats) {
        self.received += other.received;
        self.folded += other.folded;
        self.malformed += other.malformed;
    }
}

/// Normalize `events` and fold them into `reconstructor` in time order
pub fn fold<R: Reconstructor>(reconstructor: &mut R, events: Vec<AuditEvent>) -> FoldStats {
    let mut stats = FoldStats {
        received: events.len(),
        ..Default::default()
    };

    for event in normalize(events) {
        match TypedEvent::parse(&event) {
            Ok(Some(typed)) => {
                reconstructor.apply(typed);
                stats.folded += 1;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(
                    event_name = %event.event_name,
                    event_id = event.event_id.as_deref().unwrap_or("-"),
                    error = %e,
                    "Skipping malformed audit event"
                );
                stats.malformed += 1;
            }
        }
    }

    stats
}

/// Fold `events` into a fresh reconstructor and finish it for `window`
pub fn reconstruct<R: Reconstructor + Default>(
    events: Vec<AuditEvent>,
    window: &TimeWindow,
) -> (R::Output, FoldStats) {
    let mut reconstructor = R::default();
    let stats = fold(&mut reconstructor, events);
    (reconstructor.finish(window), stats)
}
