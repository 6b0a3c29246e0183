//! Instance diversification score
//!
//! Average per-group contribution in `1..=5`, rescaled to ten. Groups whose
//! template version cannot be resolved contribute zero but still count.

use crate::resources::{LaunchTemplateCatalog, ScalingGroup};
use std::collections::BTreeMap;

const MIN_CONTRIBUTION: f64 = 1.0;
const MAX_CONTRIBUTION: f64 = 5.0;

/// Contribution of a group listing `count` explicit instance types
fn fixed_type_contribution(count: u32) -> f64 {
    match count {
        16..=u32::MAX => 5.0,
        11..=15 => 4.0,
        6..=10 => 3.0,
        2..=5 => 2.0,
        _ => 1.0,
    }
}

pub fn contribution(group: &ScalingGroup, templates: &LaunchTemplateCatalog) -> f64 {
    let Some(template) = &group.template else {
        return MIN_CONTRIBUTION;
    };

    if group.overrides.uses_heterogeneous_requirements {
        return MAX_CONTRIBUTION;
    }
    if let Some(count) = group.overrides.fixed_instance_type_count {
        return fixed_type_contribution(count);
    }

    match templates.resolve(template) {
        Some(version) if version.uses_heterogeneous_requirements => MAX_CONTRIBUTION,
        Some(_) => MIN_CONTRIBUTION,
        None => 0.0,
    }
}

pub fn score(groups: &BTreeMap<String, ScalingGroup>, templates: &LaunchTemplateCatalog) -> f64 {
    let total: f64 = groups.values().map(|g| contribution(g, templates)).sum();
    total / groups.len().max(1) as f64 * 10.0 / MAX_CONTRIBUTION
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{TemplateAction, TemplateEvent, TypedEvent};
    use crate::resources::{
        LaunchTemplateReconstructor, Overrides, Reconstructor, TemplateRef, VersionKey,
    };
    use crate::time_window::TimeWindow;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn catalog(heterogeneous: bool) -> LaunchTemplateCatalog {
        let mut reconstructor = LaunchTemplateReconstructor::new();
        reconstructor.apply(TypedEvent::LaunchTemplate(TemplateEvent {
            template_id: "lt-1".to_string(),
            template_name: "web".to_string(),
            time: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            action: TemplateAction::Create {
                uses_heterogeneous_requirements: heterogeneous,
            },
        }));
        reconstructor.finish(&TimeWindow::day(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()))
    }

    fn templated(name: &str, key: &str, overrides: Overrides) -> (String, ScalingGroup) {
        let mut group = ScalingGroup::new(name);
        group.template = Some(TemplateRef::new(key.to_string(), VersionKey::Default));
        group.overrides = overrides;
        (name.to_string(), group)
    }

    #[test]
    fn test_configuration_and_heterogeneous_groups() {
        let groups = BTreeMap::from([
            ("legacy".to_string(), ScalingGroup::new("legacy")),
            templated(
                "web",
                "lt-1",
                Overrides {
                    uses_heterogeneous_requirements: true,
                    fixed_instance_type_count: None,
                },
            ),
        ]);

        assert!((score(&groups, &LaunchTemplateCatalog::new()) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_type_buckets() {
        assert_eq!(fixed_type_contribution(1), 1.0);
        assert_eq!(fixed_type_contribution(2), 2.0);
        assert_eq!(fixed_type_contribution(5), 2.0);
        assert_eq!(fixed_type_contribution(6), 3.0);
        assert_eq!(fixed_type_contribution(11), 4.0);
        assert_eq!(fixed_type_contribution(15), 4.0);
        assert_eq!(fixed_type_contribution(16), 5.0);
    }

    #[test]
    fn test_template_version_decides_without_overrides() {
        let (_, by_name) = templated("web", "web", Overrides::default());
        assert_eq!(contribution(&by_name, &catalog(true)), 5.0);
        assert_eq!(contribution(&by_name, &catalog(false)), 1.0);
    }

    #[test]
    fn test_unresolvable_template_counts_as_zero() {
        let groups = BTreeMap::from([
            templated("ghost", "lt-missing", Overrides::default()),
            templated(
                "web",
                "lt-1",
                Overrides {
                    uses_heterogeneous_requirements: true,
                    fixed_instance_type_count: None,
                },
            ),
        ]);

        // (0 + 5) / 2 groups, rescaled
        assert!((score(&groups, &catalog(false)) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_groups_scores_zero() {
        assert_eq!(score(&BTreeMap::new(), &LaunchTemplateCatalog::new()), 0.0);
    }
}
