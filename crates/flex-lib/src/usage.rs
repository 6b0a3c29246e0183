//! Running-window reconstruction and utilization-hours
//!
//! Derives, from an instance's lifecycle events, the intervals during which
//! it was running inside an evaluation window and the capacity-normalized
//! hours it accumulated there. These are pure functions evaluated once after
//! folding completes.

use crate::events::{InstanceAction, InstanceFragment, STATE_CODE_PENDING, STATE_CODE_RUNNING};
use crate::time_window::TimeWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relative capacity per instance size class
pub const NORMALIZATION_TABLE: &[(&str, f64)] = &[
    ("nano", 0.25),
    ("micro", 0.5),
    ("small", 1.0),
    ("medium", 2.0),
    ("large", 4.0),
    ("xlarge", 8.0),
    ("2xlarge", 16.0),
    ("3xlarge", 24.0),
    ("4xlarge", 32.0),
    ("6xlarge", 48.0),
    ("8xlarge", 64.0),
    ("9xlarge", 72.0),
    ("10xlarge", 80.0),
    ("12xlarge", 96.0),
    ("16xlarge", 128.0),
    ("18xlarge", 144.0),
    ("24xlarge", 192.0),
    ("32xlarge", 256.0),
    ("56xlarge", 448.0),
    ("112xlarge", 896.0),
];

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Capacity factor of a size class, `None` if the class is not in the table
pub fn size_factor(size_class: &str) -> Option<f64> {
    NORMALIZATION_TABLE
        .iter()
        .find(|(class, _)| *class == size_class)
        .map(|(_, factor)| *factor)
}

/// Instance-specific projection of an audit event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub action: InstanceAction,
    pub time: DateTime<Utc>,
    pub previously_running: bool,
    pub currently_running: bool,
}

impl LifecycleEvent {
    /// Derive running flags from the event kind and the per-instance payload
    pub fn derive(action: InstanceAction, time: DateTime<Utc>, fragment: &InstanceFragment) -> Self {
        let (previously_running, currently_running) = match action {
            InstanceAction::BidEvicted => (true, false),
            InstanceAction::Run => (false, true),
            InstanceAction::Start | InstanceAction::Stop | InstanceAction::Terminate => (
                fragment.previous_state == Some(STATE_CODE_RUNNING),
                matches!(
                    fragment.current_state,
                    Some(STATE_CODE_RUNNING) | Some(STATE_CODE_PENDING)
                ),
            ),
        };

        Self {
            action,
            time,
            previously_running,
            currently_running,
        }
    }
}

/// An interval during which an instance was running.
///
/// An open window (`end == None`) means the instance was still running at
/// the end of the evaluation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningWindow {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl RunningWindow {
    pub fn closed(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn open(start: DateTime<Utc>) -> Self {
        Self { start, end: None }
    }

    /// Running seconds; open windows run to the window end, inclusive
    pub fn duration_secs(&self, window: &TimeWindow) -> i64 {
        match self.end {
            Some(end) => (end - self.start).num_seconds(),
            None => (window.end() - self.start).num_seconds() + 1,
        }
    }
}

/// Whether the instance was already running when `window` began.
///
/// Lifecycle events are in ascending time order.
fn entered_running(events: &[LifecycleEvent], window: &TimeWindow) -> bool {
    match events.iter().find(|e| e.time >= window.start()) {
        Some(event) => event.previously_running,
        None => events.last().is_some_and(|e| e.currently_running),
    }
}

/// Reconstruct the running windows of an instance inside `window`
pub fn running_windows(events: &[LifecycleEvent], window: &TimeWindow) -> Vec<RunningWindow> {
    let in_window: Vec<&LifecycleEvent> =
        events.iter().filter(|e| window.contains(&e.time)).collect();

    let Some(last) = in_window.last() else {
        return if entered_running(events, window) {
            vec![RunningWindow::open(window.start())]
        } else {
            Vec::new()
        };
    };

    let mut windows = Vec::new();
    let mut cursor = window.start();

    for event in &in_window {
        if event.previously_running {
            windows.push(RunningWindow::closed(cursor, event.time));
        }
        cursor = event.time;
    }

    if last.currently_running {
        windows.push(RunningWindow::open(last.time));
    }

    windows
}

/// Capacity-normalized running hours: `seconds * factor // 3600 * 2`
pub fn utilization_hours(windows: &[RunningWindow], window: &TimeWindow, factor: f64) -> u64 {
    let running_secs: i64 = windows.iter().map(|w| w.duration_secs(window)).sum();
    if running_secs <= 0 {
        return 0;
    }
    let hours = (running_secs as f64 * factor / SECONDS_PER_HOUR).floor() as u64;
    hours * 2
}
