//! Windowed account scores, organization scores and rankings

use crate::output::{self, color_score, format_hours, OutputFormat};
use anyhow::Result;
use colored::Colorize;
use flex_lib::aggregate::{fetch_org_scores, fetch_scores, rank_accounts, RankedAccount};
use flex_lib::publish::MetricSource;
use flex_lib::{MetricName, ScoreRecord, ScoreWeights, TimeWindow};
use serde::Serialize;
use tabled::Tabled;

/// Table row for one scored entity
#[derive(Tabled, Serialize)]
pub struct ScoreRow {
    #[tabled(rename = "ACCOUNT")]
    pub account: String,
    #[tabled(rename = "VCPU-H")]
    pub vcpuh: String,
    #[tabled(rename = "DIVERSIFICATION")]
    pub diversification: String,
    #[tabled(rename = "LAUNCH TEMPLATE")]
    pub launch_template: String,
    #[tabled(rename = "POLICY")]
    pub policy: String,
    #[tabled(rename = "SCALING")]
    pub scaling: String,
    #[tabled(rename = "FLEXIBILITY")]
    pub flexibility: String,
}

impl ScoreRow {
    pub fn new(account: &str, record: &ScoreRecord) -> Self {
        Self {
            account: account.to_string(),
            vcpuh: format_hours(record.utilization_hours()),
            diversification: color_score(record.get(MetricName::InstanceDiversificationScore)),
            launch_template: color_score(record.get(MetricName::LaunchTemplateScore)),
            policy: color_score(record.get(MetricName::PolicyScore)),
            scaling: color_score(record.get(MetricName::ScalingScore)),
            flexibility: color_score(record.flexibility_score()),
        }
    }
}

#[derive(Tabled, Serialize)]
struct RankRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "ACCOUNT")]
    account: String,
    #[tabled(rename = "FLEXIBILITY")]
    flexibility: String,
}

fn rank_rows(ranked: &[RankedAccount]) -> Vec<RankRow> {
    ranked
        .iter()
        .enumerate()
        .map(|(i, r)| RankRow {
            position: i + 1,
            account: r.account_id.clone(),
            flexibility: color_score(Some(r.flexibility_score)),
        })
        .collect()
}

fn print_window(window: &TimeWindow) {
    println!(
        "{} {} .. {}",
        "Window:".bold(),
        window.start().format("%Y-%m-%d"),
        window.end().format("%Y-%m-%d")
    );
    println!();
}

/// Windowed scores of every account (or the selected ones)
pub async fn show_scores(
    source: &dyn MetricSource,
    namespace: &str,
    window: &TimeWindow,
    accounts: &[String],
    format: OutputFormat,
) -> Result<()> {
    let scores = fetch_scores(source, namespace, window, accounts, &ScoreWeights::default()).await?;

    match format {
        OutputFormat::Json => output::print_json(&scores),
        OutputFormat::Table => {
            print_window(window);
            if scores.is_empty() {
                output::print_info("No published scores in this window");
                return Ok(());
            }
            let rows: Vec<ScoreRow> = scores
                .iter()
                .map(|(account, record)| ScoreRow::new(account, record))
                .collect();
            output::print_table(&rows, format);
        }
    }

    Ok(())
}

/// Organization scores over the window
pub async fn show_org(
    source: &dyn MetricSource,
    namespace: &str,
    window: &TimeWindow,
    format: OutputFormat,
) -> Result<()> {
    let record = fetch_org_scores(source, namespace, window, &ScoreWeights::default()).await?;

    match format {
        OutputFormat::Json => output::print_json(&record),
        OutputFormat::Table => {
            print_window(window);
            if record.utilization_hours().unwrap_or(0.0) == 0.0 {
                output::print_warning("No utilization recorded; organization scores are zero");
            }
            output::print_table(&[ScoreRow::new("ORG", &record)], format);
        }
    }

    Ok(())
}

/// Highest and lowest scoring accounts over the window
pub async fn show_ranking(
    source: &dyn MetricSource,
    namespace: &str,
    window: &TimeWindow,
    count: usize,
    format: OutputFormat,
) -> Result<()> {
    let scores = fetch_scores(source, namespace, window, &[], &ScoreWeights::default()).await?;
    let ranking = rank_accounts(&scores, count);

    match format {
        OutputFormat::Json => output::print_json(&ranking),
        OutputFormat::Table => {
            print_window(window);
            if scores.is_empty() {
                output::print_info("No published scores in this window");
                return Ok(());
            }
            println!("{}", "Top accounts".bold().green());
            output::print_table(&rank_rows(&ranking.top), format);
            println!();
            println!("{}", "Bottom accounts".bold().red());
            output::print_table(&rank_rows(&ranking.bottom), format);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_row_marks_missing_components() {
        let record = ScoreRecord::new()
            .with(MetricName::UtilizationHours, 192.0)
            .with(MetricName::ScalingScore, 2.5);
        let row = ScoreRow::new("111111111111", &record);

        assert_eq!(row.vcpuh, "192.0");
        assert!(row.scaling.contains("2.50"));
        assert!(row.policy.contains('-'));
    }

    #[test]
    fn test_rank_rows_are_numbered() {
        let ranked = vec![
            RankedAccount {
                account_id: "a".to_string(),
                flexibility_score: 8.0,
            },
            RankedAccount {
                account_id: "b".to_string(),
                flexibility_score: 3.0,
            },
        ];
        let rows = rank_rows(&ranked);

        assert_eq!(rows[0].position, 1);
        assert_eq!(rows[1].account, "b");
    }
}
