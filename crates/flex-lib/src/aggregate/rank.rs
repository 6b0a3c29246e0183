//! Account ranking by Flexibility Score

use crate::scores::ScoreRecord;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Number of accounts listed at each end of the ranking by default
pub const DEFAULT_RANK_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedAccount {
    pub account_id: String,
    pub flexibility_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountRanking {
    /// Highest scores first
    pub top: Vec<RankedAccount>,
    /// Lowest scores first
    pub bottom: Vec<RankedAccount>,
}

/// Top and bottom `count` accounts by windowed Flexibility Score
pub fn rank_accounts(scores: &BTreeMap<String, ScoreRecord>, count: usize) -> AccountRanking {
    let mut ranked: Vec<RankedAccount> = scores
        .iter()
        .map(|(account_id, record)| RankedAccount {
            account_id: account_id.clone(),
            flexibility_score: record.flexibility_score().unwrap_or(0.0),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.flexibility_score
            .partial_cmp(&a.flexibility_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.account_id.cmp(&b.account_id))
    });

    let top = ranked.iter().take(count).cloned().collect();
    let bottom = ranked.iter().rev().take(count).cloned().collect();

    AccountRanking { top, bottom }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scores::MetricName;

    fn scores(values: &[(&str, f64)]) -> BTreeMap<String, ScoreRecord> {
        values
            .iter()
            .map(|(id, score)| {
                (
                    id.to_string(),
                    ScoreRecord::new().with(MetricName::FlexibilityScore, *score),
                )
            })
            .collect()
    }

    fn ids(accounts: &[RankedAccount]) -> Vec<&str> {
        accounts.iter().map(|a| a.account_id.as_str()).collect()
    }

    #[test]
    fn test_top_and_bottom() {
        let ranking = rank_accounts(
            &scores(&[("a", 1.0), ("b", 9.5), ("c", 4.0), ("d", 7.25), ("e", 0.5)]),
            2,
        );

        assert_eq!(ids(&ranking.top), vec!["b", "d"]);
        assert_eq!(ids(&ranking.bottom), vec!["e", "a"]);
    }

    #[test]
    fn test_fewer_accounts_than_count() {
        let ranking = rank_accounts(&scores(&[("a", 1.0), ("b", 2.0)]), DEFAULT_RANK_COUNT);
        assert_eq!(ids(&ranking.top), vec!["b", "a"]);
        assert_eq!(ids(&ranking.bottom), vec!["a", "b"]);
    }

    #[test]
    fn test_ties_break_on_account_id() {
        let ranking = rank_accounts(&scores(&[("z", 5.0), ("m", 5.0)]), 1);
        assert_eq!(ids(&ranking.top), vec!["m"]);
        assert_eq!(ids(&ranking.bottom), vec!["z"]);
    }

    #[test]
    fn test_empty_scores() {
        assert_eq!(rank_accounts(&BTreeMap::new(), 3), AccountRanking::default());
    }
}
