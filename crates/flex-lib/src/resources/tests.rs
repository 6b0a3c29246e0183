use super::*;
use crate::models::ResourceRef;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};

fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, h, m, 0).unwrap()
}

fn window() -> TimeWindow {
    TimeWindow::day(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap())
}

fn audit(name: &str, time: DateTime<Utc>, resources: &[&str], payload: Value) -> AuditEvent {
    AuditEvent {
        event_id: None,
        event_name: name.to_string(),
        event_time: time,
        resources: resources
            .iter()
            .map(|r| ResourceRef {
                resource_type: String::new(),
                resource_name: r.to_string(),
            })
            .collect(),
        payload,
    }
}

fn run(id: &str, time: DateTime<Utc>, instance_type: &str, group: &str) -> AuditEvent {
    audit(
        "RunInstances",
        time,
        &[id],
        json!({"responseElements": {"instancesSet": {"items": [{
            "instanceId": id,
            "instanceType": instance_type,
            "tagSet": {"items": [
                {"key": "aws:autoscaling:groupName", "value": group},
                {"key": "aws:ec2launchtemplate:id", "value": "lt-1"},
                {"key": "aws:ec2launchtemplate:version", "value": "$Default"}
            ]}
        }]}}}),
    )
}

fn state_change(name: &str, id: &str, time: DateTime<Utc>, previous: i64, current: i64) -> AuditEvent {
    audit(
        name,
        time,
        &[id],
        json!({"responseElements": {"instancesSet": {"items": [{
            "instanceId": id,
            "previousState": {"code": previous, "name": "x"},
            "currentState": {"code": current, "name": "y"}
        }]}}}),
    )
}

fn instance_events() -> Vec<AuditEvent> {
    vec![
        state_change("StopInstances", "i-1", at(10, 6, 0), 16, 64),
        run("i-1", at(9, 12, 0), "m5.large", "web"),
        state_change("StartInstances", "i-1", at(10, 8, 0), 80, 0),
        audit(
            "StopInstances",
            at(10, 9, 0),
            &["i-1"],
            json!({"errorCode": "Client.IncorrectInstanceState"}),
        ),
        // Missing instancesSet
        audit("TerminateInstances", at(10, 9, 30), &["i-1"], json!({})),
        run("i-2", at(10, 18, 0), "c5.xlarge", "web"),
    ]
}

#[test]
fn test_instance_fold_out_of_order_arrival() {
    let (instances, stats) = reconstruct::<InstanceReconstructor>(instance_events(), &window());

    assert_eq!(stats.received, 6);
    assert_eq!(stats.folded, 4);
    assert_eq!(stats.malformed, 1);

    let first = &instances["i-1"];
    assert_eq!(first.launched_at, Some(at(9, 12, 0)));
    assert_eq!(first.lifecycle_events.len(), 3);
    // Running from the window start to the stop, then again from the start onward
    assert_eq!(first.running_windows.len(), 2);
    // 6h + 16h at factor 4, doubled
    assert_eq!(first.utilization_hours, (6 * 3600 + 16 * 3600) * 4 / 3600 * 2);

    let second = &instances["i-2"];
    assert_eq!(second.utilization_hours, 96);
}

#[test]
fn test_refolding_same_events_is_a_no_op() {
    let normalized = crate::events::normalize(instance_events());

    let mut once = InstanceReconstructor::new();
    fold(&mut once, normalized.clone());

    let mut twice = InstanceReconstructor::new();
    fold(&mut twice, normalized.clone());
    fold(&mut twice, normalized);

    assert_eq!(once.finish(&window()), twice.finish(&window()));
}

#[test]
fn test_same_timestamp_order_is_stable() {
    let time = at(10, 12, 0);
    let events = vec![
        audit(
            "CreateLaunchTemplate",
            time,
            &["web", "lt-1"],
            json!({"requestParameters": {"CreateLaunchTemplateRequest": {"LaunchTemplateData": {}}}}),
        ),
        audit(
            "CreateLaunchTemplateVersion",
            time,
            &["web", "lt-1"],
            json!({"responseElements": {"CreateLaunchTemplateVersionResponse": {
                "launchTemplateVersion": {"versionNumber": 2, "defaultVersion": false}
            }}}),
        ),
        audit(
            "ModifyLaunchTemplate",
            time,
            &["web", "lt-1"],
            json!({"responseElements": {"ModifyLaunchTemplateResponse": {
                "launchTemplate": {"defaultVersionNumber": 2}
            }}}),
        ),
    ];

    for _ in 0..3 {
        let (catalog, _) = reconstruct::<LaunchTemplateReconstructor>(events.clone(), &window());
        let template = catalog.get("web").unwrap();
        assert_eq!(template.default_version, Some(2));
        assert_eq!(template.versions.len(), 2);
    }
}

#[test]
fn test_out_of_order_repoint_silently_no_ops() {
    let events = vec![
        audit(
            "CreateLaunchTemplate",
            at(9, 0, 0),
            &["web", "lt-1"],
            json!({"requestParameters": {}}),
        ),
        audit(
            "ModifyLaunchTemplate",
            at(9, 1, 0),
            &["web", "lt-1"],
            json!({"responseElements": {"ModifyLaunchTemplateResponse": {
                "launchTemplate": {"defaultVersionNumber": "2"}
            }}}),
        ),
        audit(
            "CreateLaunchTemplateVersion",
            at(9, 2, 0),
            &["web", "lt-1"],
            json!({"responseElements": {"CreateLaunchTemplateVersionResponse": {
                "launchTemplateVersion": {"versionNumber": 2, "defaultVersion": false}
            }}}),
        ),
    ];

    let (catalog, _) = reconstruct::<LaunchTemplateReconstructor>(events, &window());
    assert_eq!(catalog.get("lt-1").unwrap().default_version, Some(1));
}

#[test]
fn test_group_and_policy_streams_fold_together() {
    let events = vec![
        audit(
            "CreateAutoScalingGroup",
            at(9, 0, 0),
            &["web"],
            json!({"requestParameters": {"mixedInstancesPolicy": {"launchTemplate": {
                "launchTemplateSpecification": {"launchTemplateId": "lt-1", "version": "$Default"},
                "overrides": [{"instanceRequirements": {"vCpuCount": {"min": 2}}}]
            }}}}),
        ),
        audit(
            "PutScalingPolicy",
            at(9, 1, 0),
            &[],
            json!({"requestParameters": {"autoScalingGroupName": "web", "policyType": "TargetTrackingScaling"}}),
        ),
        audit("DescribeAutoScalingGroups", at(9, 2, 0), &["web"], json!({})),
    ];

    let (groups, stats) = reconstruct::<ScalingGroupReconstructor>(events, &window());
    assert_eq!(stats.folded, 2);

    let web = &groups["web"];
    assert!(web.overrides.uses_heterogeneous_requirements);
    assert_eq!(web.policy_type, Some(PolicyType::TargetTracking));
    assert_eq!(
        web.template,
        Some(TemplateRef::new("lt-1".to_string(), VersionKey::Default))
    );
}
