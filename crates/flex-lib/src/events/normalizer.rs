//! Audit event normalization
//!
//! Drops records of failed API calls and orders the rest by event time.

use crate::models::{AuditEvent, Outcome};
use tracing::debug;

/// Discard failed calls and sort ascending by `event_time`.
///
/// The sort is stable, so events sharing a timestamp keep their arrival order.
pub fn normalize(events: Vec<AuditEvent>) -> Vec<AuditEvent> {
    let received = events.len();

    let mut events: Vec<AuditEvent> = events
        .into_iter()
        .filter(|e| e.outcome() == Outcome::Ok)
        .collect();
    events.sort_by_key(|e| e.event_time);

    if events.len() != received {
        debug!(
            received = received,
            discarded = received - events.len(),
            "Discarded failed audit events"
        );
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn event(id: &str, minute: u32, payload: serde_json::Value) -> AuditEvent {
        AuditEvent {
            event_id: Some(id.to_string()),
            event_name: "StartInstances".to_string(),
            event_time: Utc.with_ymd_and_hms(2024, 3, 10, 12, minute, 0).unwrap(),
            resources: vec![],
            payload,
        }
    }

    #[test]
    fn test_drops_failed_calls() {
        let events = vec![
            event("a", 1, json!({})),
            event("b", 2, json!({"errorCode": "Client.UnauthorizedOperation"})),
        ];

        let normalized = normalize(events);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].event_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_sorts_ascending_and_keeps_ties_stable() {
        let events = vec![
            event("late", 30, json!({})),
            event("tie-1", 10, json!({})),
            event("early", 5, json!({})),
            event("tie-2", 10, json!({})),
        ];

        let ids: Vec<_> = normalize(events)
            .into_iter()
            .filter_map(|e| e.event_id)
            .collect();
        assert_eq!(ids, vec!["early", "tie-1", "tie-2", "late"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(normalize(Vec::new()).is_empty());
    }
}
