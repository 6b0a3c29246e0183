//! Windowed scores from previously published daily metrics

use super::{org_scores, weight_scores, DailySeries, ORG_DIMENSION_VALUE};
use crate::error::Result;
use crate::models::MetricDatum;
use crate::publish::{MetricSource, ACCOUNT_DIMENSION};
use crate::scores::{MetricName, ScoreRecord, ScoreWeights};
use crate::time_window::TimeWindow;
use std::collections::BTreeMap;
use tracing::debug;

/// Group datapoints into per-account daily series.
///
/// Organization datapoints and unknown metric names are skipped. When several
/// datapoints fall on the same day the most recent one wins. Accounts listed
/// in `account_ids` appear even without datapoints.
pub fn daily_series(
    mut data: Vec<MetricDatum>,
    account_ids: &[String],
) -> BTreeMap<String, DailySeries> {
    data.sort_by_key(|d| d.timestamp);

    let mut series: BTreeMap<String, DailySeries> = account_ids
        .iter()
        .map(|id| (id.clone(), DailySeries::new()))
        .collect();

    for datum in data {
        let Some(account_id) = datum.dimension(ACCOUNT_DIMENSION) else {
            continue;
        };
        if account_id == ORG_DIMENSION_VALUE {
            continue;
        }
        if !account_ids.is_empty() && !account_ids.iter().any(|id| id == account_id) {
            continue;
        }
        let Some(name) = MetricName::parse(&datum.name) else {
            continue;
        };

        series
            .entry(account_id.to_string())
            .or_default()
            .entry(name)
            .or_default()
            .insert(datum.timestamp.date_naive(), datum.value);
    }

    series
}

/// Windowed per-account scores over `range`.
///
/// An empty `account_ids` selects every account with published metrics.
pub async fn fetch_scores(
    source: &dyn MetricSource,
    namespace: &str,
    range: &TimeWindow,
    account_ids: &[String],
    weights: &ScoreWeights,
) -> Result<BTreeMap<String, ScoreRecord>> {
    let data = source.query(namespace, range).await?;
    debug!(datapoints = data.len(), "Fetched published metrics");

    let series = daily_series(data, account_ids);
    Ok(weight_scores(&series, weights))
}

/// Organization scores over `range`
pub async fn fetch_org_scores(
    source: &dyn MetricSource,
    namespace: &str,
    range: &TimeWindow,
    weights: &ScoreWeights,
) -> Result<ScoreRecord> {
    let accounts = fetch_scores(source, namespace, range, &[], weights).await?;
    Ok(org_scores(&accounts, weights))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryMetricStore;
    use crate::models::Dimension;
    use crate::publish::MetricSink;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    fn datum(account: &str, name: &str, value: f64, ts: DateTime<Utc>) -> MetricDatum {
        MetricDatum {
            name: name.to_string(),
            value,
            unit: "None".to_string(),
            timestamp: ts,
            dimensions: vec![Dimension {
                name: ACCOUNT_DIMENSION.to_string(),
                value: account.to_string(),
            }],
        }
    }

    fn at(day: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, h, 0, 0).unwrap()
    }

    #[test]
    fn test_latest_datapoint_of_the_day_wins() {
        let data = vec![
            datum("a", "ScalingScore", 7.5, at(10, 9)),
            datum("a", "ScalingScore", 2.5, at(10, 4)),
            datum("a", "vcpuh", 10.0, at(10, 4)),
            datum("ORG", "FlexibilityScore", 3.0, at(10, 4)),
            datum("a", "SomethingElse", 1.0, at(10, 4)),
        ];

        let series = daily_series(data, &[]);
        assert_eq!(series.len(), 1);

        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert_eq!(series["a"][&MetricName::ScalingScore][&day], 7.5);
        assert_eq!(series["a"].len(), 2);
    }

    #[test]
    fn test_requested_accounts_always_present() {
        let data = vec![datum("a", "vcpuh", 10.0, at(10, 4))];
        let series = daily_series(data, &["b".to_string()]);

        assert_eq!(series.keys().collect::<Vec<_>>(), vec!["b"]);
        assert!(series["b"].is_empty());
    }

    #[tokio::test]
    async fn test_fetch_account_and_org_scores() {
        let store = MemoryMetricStore::new();
        store
            .publish(
                "FlexibilityScore",
                vec![
                    datum("a", "vcpuh", 10.0, at(9, 4)),
                    datum("a", "ScalingScore", 10.0, at(9, 4)),
                    datum("a", "vcpuh", 30.0, at(10, 4)),
                    datum("a", "ScalingScore", 2.5, at(10, 4)),
                    datum("b", "vcpuh", 40.0, at(10, 4)),
                    datum("b", "ScalingScore", 5.0, at(10, 4)),
                ],
            )
            .await
            .unwrap();

        let range = TimeWindow::new(at(9, 0), at(11, 0)).unwrap();
        let weights = ScoreWeights::default();

        let scores = fetch_scores(&store, "FlexibilityScore", &range, &[], &weights)
            .await
            .unwrap();
        assert_eq!(scores["a"].get(MetricName::ScalingScore), Some(4.38));
        assert_eq!(scores["a"].utilization_hours(), Some(40.0));
        assert_eq!(scores["b"].get(MetricName::ScalingScore), Some(5.0));

        let org = fetch_org_scores(&store, "FlexibilityScore", &range, &weights)
            .await
            .unwrap();
        // (4.38 * 40 + 5 * 40) / 80
        assert_eq!(org.get(MetricName::ScalingScore), Some(4.69));

        let other = fetch_scores(&store, "Elsewhere", &range, &[], &weights)
            .await
            .unwrap();
        assert!(other.is_empty());
    }
}
