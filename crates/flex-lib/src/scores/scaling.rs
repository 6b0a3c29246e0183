//! Scaling score
//!
//! Ratio of the maximum to the minimum number of concurrently running
//! instances, found with a sweep over every running-window boundary.

use crate::resources::Instance;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Start,
    End,
}

/// Maximum and minimum concurrency over all running windows
pub fn concurrency(instances: &BTreeMap<String, Instance>) -> (i64, i64) {
    let windows = || instances.values().flat_map(|i| i.running_windows.iter());

    // Starts are listed before ends so the stable sort resolves ties start-first
    let mut points: Vec<(DateTime<Utc>, Boundary)> =
        windows().map(|w| (w.start, Boundary::Start)).collect();
    points.extend(windows().filter_map(|w| w.end.map(|end| (end, Boundary::End))));
    points.sort_by_key(|(time, _)| *time);

    let mut count = 0i64;
    let mut max = 0i64;
    let mut min: Option<i64> = None;
    let mut previous_start: Option<DateTime<Utc>> = None;

    for (time, boundary) in points {
        if boundary == Boundary::Start {
            // Simultaneous starts never leave fewer instances running in between
            if previous_start == Some(time) {
                min = min.map(|m| m + 1);
            }
            previous_start = Some(time);
            count += 1;
        } else {
            count -= 1;
        }

        max = max.max(count);
        min = Some(min.map_or(count, |m| m.min(count)));
    }

    (max, min.unwrap_or(0).max(1))
}

fn tier(ratio: f64) -> u8 {
    if ratio > 1.07 {
        4
    } else if ratio > 1.05 {
        3
    } else if ratio > 1.02 {
        2
    } else {
        1
    }
}

pub fn score(instances: &BTreeMap<String, Instance>) -> f64 {
    let (max, min) = concurrency(instances);
    let ratio = max as f64 / min as f64;
    f64::from(tier(ratio)) * 10.0 / 4.0
}
