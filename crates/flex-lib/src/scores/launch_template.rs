//! Launch template score
//!
//! Share of scaling-group utilization-hours driven by launch templates
//! rather than launch configurations.

use crate::resources::Instance;
use std::collections::BTreeMap;

pub fn score(instances: &BTreeMap<String, Instance>) -> f64 {
    let mut template_hours = 0u64;
    let mut configuration_hours = 0u64;

    for instance in instances.values() {
        if instance.scaling_group_name.is_none() {
            continue;
        }
        if instance.template.is_some() {
            template_hours += instance.utilization_hours;
        } else {
            configuration_hours += instance.utilization_hours;
        }
    }

    let total = template_hours + configuration_hours;
    if total == 0 {
        return 0.0;
    }
    template_hours as f64 / total as f64 * 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{TemplateRef, VersionKey};

    fn instance(id: &str, group: Option<&str>, templated: bool, hours: u64) -> (String, Instance) {
        let mut instance = Instance::new(id);
        instance.scaling_group_name = group.map(str::to_string);
        if templated {
            instance.template = Some(TemplateRef::new("lt-1".to_string(), VersionKey::Default));
        }
        instance.utilization_hours = hours;
        (id.to_string(), instance)
    }

    #[test]
    fn test_even_split_scores_half() {
        let instances = BTreeMap::from([
            instance("i-1", Some("web"), true, 10),
            instance("i-2", Some("legacy"), false, 10),
        ]);
        assert_eq!(score(&instances), 5.0);
    }

    #[test]
    fn test_standalone_instances_are_ignored() {
        let instances = BTreeMap::from([
            instance("i-1", Some("web"), true, 10),
            instance("i-2", None, false, 1000),
            instance("i-3", None, true, 1000),
        ]);
        assert_eq!(score(&instances), 10.0);
    }

    #[test]
    fn test_no_group_hours_scores_zero() {
        let instances = BTreeMap::from([instance("i-1", Some("web"), true, 0)]);
        assert_eq!(score(&instances), 0.0);
        assert_eq!(score(&BTreeMap::new()), 0.0);
    }
}
