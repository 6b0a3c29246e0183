//! Two-level weighted aggregation
//!
//! Pass 1 weights an account's daily scores by its daily utilization-hours,
//! producing windowed account scores. Pass 2 weights windowed account scores
//! by each account's windowed utilization-hours, producing organization
//! scores. Both passes attach the composite Flexibility Score.

mod query;
mod rank;

pub use query::{daily_series, fetch_org_scores, fetch_scores};
pub use rank::{rank_accounts, AccountRanking, RankedAccount, DEFAULT_RANK_COUNT};

use crate::scores::{MetricName, ScoreRecord, ScoreWeights};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Daily values of every metric of one account
pub type DailySeries = BTreeMap<MetricName, BTreeMap<NaiveDate, f64>>;

/// Dimension value of organization-level datapoints
pub const ORG_DIMENSION_VALUE: &str = "ORG";

const ROUND_DECIMALS: i32 = 2;

/// Round to two decimals, ties to even.
///
/// Exact ties only arise for values representable in binary, e.g. `0.125`
/// rounds to `0.12` and `0.375` to `0.38`.
pub fn round2(value: f64) -> f64 {
    let factor = 10f64.powi(ROUND_DECIMALS);
    (value * factor).round_ties_even() / factor
}

/// Weighted sum of the components present in `record`.
///
/// Absent components are skipped rather than counted as zero, and the result
/// is not renormalized by the weights that were actually used.
pub fn composite(record: &ScoreRecord, weights: &ScoreWeights) -> f64 {
    let sum: f64 = MetricName::COMPONENTS
        .iter()
        .filter_map(|name| Some(record.get(*name)? * weights.weight(*name)?))
        .sum();
    round2(sum)
}

/// Pass 1: weight one account's daily series across the window
pub fn weight_account(series: &DailySeries, weights: &ScoreWeights) -> ScoreRecord {
    let empty = BTreeMap::new();
    let hours = series.get(&MetricName::UtilizationHours).unwrap_or(&empty);
    let total = hours.values().sum::<f64>().trunc();

    let mut record = ScoreRecord::new();
    for name in MetricName::COMPONENTS {
        let value = if total == 0.0 {
            0.0
        } else {
            let values = series.get(&name).unwrap_or(&empty);
            let weighted: f64 = hours
                .iter()
                .filter_map(|(day, day_hours)| values.get(day).map(|v| v * day_hours))
                .sum();
            round2(weighted / total)
        };
        record.set(name, value);
    }

    record.set(MetricName::UtilizationHours, total);
    let flexibility = composite(&record, weights);
    record.set(MetricName::FlexibilityScore, flexibility);
    record
}

/// Pass 1 over every account
pub fn weight_scores(
    metrics: &BTreeMap<String, DailySeries>,
    weights: &ScoreWeights,
) -> BTreeMap<String, ScoreRecord> {
    metrics
        .iter()
        .map(|(account_id, series)| (account_id.clone(), weight_account(series, weights)))
        .collect()
}

/// Pass 2: weight account scores by account utilization-hours
pub fn org_scores(accounts: &BTreeMap<String, ScoreRecord>, weights: &ScoreWeights) -> ScoreRecord {
    let total: f64 = accounts
        .values()
        .map(|r| r.utilization_hours().unwrap_or(0.0))
        .sum();

    let mut record = ScoreRecord::new();
    for name in MetricName::COMPONENTS {
        let value = if total == 0.0 {
            0.0
        } else {
            let weighted: f64 = accounts
                .values()
                .filter_map(|r| Some(r.get(name)? * r.utilization_hours().unwrap_or(0.0)))
                .sum();
            round2(weighted / total)
        };
        record.set(name, value);
    }

    let flexibility = composite(&record, weights);
    record.set(MetricName::FlexibilityScore, flexibility);
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn series(entries: &[(MetricName, &[(u32, f64)])]) -> DailySeries {
        entries
            .iter()
            .map(|(name, values)| {
                (
                    *name,
                    values.iter().map(|(d, v)| (day(*d), *v)).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(3.14159), 3.14);
        assert_eq!(round2(2.5), 2.5);
        assert_eq!(round2(6.666), 6.67);
    }

    #[test]
    fn test_round2_ties_to_even() {
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(0.375), 0.38);
        assert_eq!(round2(-0.125), -0.12);
        assert_eq!(round2(2.675), 2.67);
        assert_eq!(round2(1.0 / 8.0 + 4.0), 4.12);
    }

    #[test]
    fn test_pass_one_weights_by_daily_hours() {
        let input = series(&[
            (MetricName::UtilizationHours, &[(1, 10.0), (2, 30.0)]),
            (MetricName::ScalingScore, &[(1, 10.0), (2, 2.5)]),
            // Day 3 has a score but no hours, so it is ignored
            (MetricName::PolicyScore, &[(1, 5.0), (3, 10.0)]),
        ]);

        let record = weight_account(&input, &ScoreWeights::default());
        assert_eq!(record.utilization_hours(), Some(40.0));
        // (10 * 10 + 2.5 * 30) / 40
        assert_eq!(record.get(MetricName::ScalingScore), Some(4.38));
        // 5 * 10 / 40
        assert_eq!(record.get(MetricName::PolicyScore), Some(1.25));
        assert_eq!(record.get(MetricName::LaunchTemplateScore), Some(0.0));
        assert_eq!(
            record.flexibility_score(),
            Some(round2(4.38 * 0.35 + 1.25 * 0.15))
        );
    }

    #[test]
    fn test_total_hours_are_truncated() {
        let input = series(&[
            (MetricName::UtilizationHours, &[(1, 0.4), (2, 0.4)]),
            (MetricName::ScalingScore, &[(1, 10.0), (2, 10.0)]),
        ]);

        let record = weight_account(&input, &ScoreWeights::default());
        assert_eq!(record.utilization_hours(), Some(0.0));
        assert_eq!(record.get(MetricName::ScalingScore), Some(0.0));
        assert_eq!(record.flexibility_score(), Some(0.0));
    }

    #[test]
    fn test_pass_two_weights_by_account_hours() {
        let accounts = BTreeMap::from([
            (
                "a".to_string(),
                ScoreRecord::new()
                    .with(MetricName::UtilizationHours, 30.0)
                    .with(MetricName::ScalingScore, 10.0)
                    .with(MetricName::PolicyScore, 10.0),
            ),
            (
                "b".to_string(),
                ScoreRecord::new()
                    .with(MetricName::UtilizationHours, 10.0)
                    .with(MetricName::ScalingScore, 2.0),
            ),
        ]);

        let org = org_scores(&accounts, &ScoreWeights::default());
        assert_eq!(org.get(MetricName::ScalingScore), Some(8.0));
        // Account b lacks a policy score and is left out of the numerator only
        assert_eq!(org.get(MetricName::PolicyScore), Some(7.5));
        assert_eq!(org.get(MetricName::InstanceDiversificationScore), Some(0.0));
        assert_eq!(org.flexibility_score(), Some(round2(8.0 * 0.35 + 7.5 * 0.15)));
        assert_eq!(org.utilization_hours(), None);
    }

    #[test]
    fn test_zero_hours_org_scores_zero() {
        let accounts = BTreeMap::from([(
            "a".to_string(),
            ScoreRecord::new()
                .with(MetricName::UtilizationHours, 0.0)
                .with(MetricName::ScalingScore, 10.0),
        )]);

        let org = org_scores(&accounts, &ScoreWeights::default());
        for name in MetricName::COMPONENTS {
            assert_eq!(org.get(name), Some(0.0));
        }
        assert_eq!(org.flexibility_score(), Some(0.0));
        assert_eq!(org_scores(&BTreeMap::new(), &ScoreWeights::default()).flexibility_score(), Some(0.0));
    }

    #[test]
    fn test_composite_skips_absent_components() {
        let weights = ScoreWeights::default();
        let partial = ScoreRecord::new().with(MetricName::ScalingScore, 10.0);
        assert_eq!(composite(&partial, &weights), 3.5);

        let full = MetricName::COMPONENTS
            .iter()
            .fold(ScoreRecord::new(), |r, name| r.with(*name, 10.0));
        assert_eq!(composite(&full, &weights), 10.0);
    }
}
