//! Policy score
//!
//! Average policy weight over instances launched into a group with a known
//! scaling policy.

use crate::resources::{Instance, ScalingGroup};
use std::collections::BTreeMap;

pub fn score(instances: &BTreeMap<String, Instance>, groups: &BTreeMap<String, ScalingGroup>) -> f64 {
    let mut launches = 0usize;
    let mut total = 0.0;

    for instance in instances.values() {
        let policy = instance
            .scaling_group_name
            .as_ref()
            .and_then(|name| groups.get(name))
            .and_then(|group| group.policy_type.as_ref());

        if let Some(policy) = policy {
            launches += 1;
            total += policy.weight();
        }
    }

    total / launches.max(1) as f64 * 10.0 / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::PolicyType;

    fn group(name: &str, policy: Option<PolicyType>) -> (String, ScalingGroup) {
        let mut group = ScalingGroup::new(name);
        group.policy_type = policy;
        (name.to_string(), group)
    }

    fn instance(id: &str, group: &str) -> (String, Instance) {
        let mut instance = Instance::new(id);
        instance.scaling_group_name = Some(group.to_string());
        (id.to_string(), instance)
    }

    #[test]
    fn test_predictive_everywhere_scores_ten() {
        let groups = BTreeMap::from([group("web", Some(PolicyType::Predictive))]);
        let instances = BTreeMap::from([instance("i-1", "web"), instance("i-2", "web")]);
        assert!((score(&instances, &groups) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_mixed_policies_average_per_instance() {
        let groups = BTreeMap::from([
            group("web", Some(PolicyType::TargetTracking)),
            group("batch", Some(PolicyType::Step)),
            group("bare", None),
        ]);
        let instances = BTreeMap::from([
            instance("i-1", "web"),
            instance("i-2", "batch"),
            instance("i-3", "bare"),
            instance("i-4", "missing"),
        ]);

        // (2 + 1) / 2 instances, rescaled
        assert!((score(&instances, &groups) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_policy_counts_with_zero_weight() {
        let groups = BTreeMap::from([
            group("web", Some(PolicyType::Predictive)),
            group("odd", Some(PolicyType::Other("Custom".to_string()))),
        ]);
        let instances = BTreeMap::from([instance("i-1", "web"), instance("i-2", "odd")]);
        assert!((score(&instances, &groups) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_policies_scores_zero() {
        assert_eq!(score(&BTreeMap::new(), &BTreeMap::new()), 0.0);
    }
}
