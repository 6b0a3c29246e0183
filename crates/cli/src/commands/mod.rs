//! CLI subcommands

pub mod scores;
pub mod snapshot;

use anyhow::{bail, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::Args;
use flex_lib::TimeWindow;

/// Days covered when no `--from` is given
const DEFAULT_RANGE_DAYS: i64 = 7;

/// Inclusive range of calendar days (UTC)
#[derive(Debug, Clone, Args)]
pub struct DateRange {
    /// First day, YYYY-MM-DD (default: a week before --to)
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last day, YYYY-MM-DD (default: yesterday)
    #[arg(long)]
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn window(&self) -> Result<TimeWindow> {
        let to = self
            .to
            .unwrap_or_else(|| (Utc::now() - Duration::days(1)).date_naive());
        let from = self
            .from
            .unwrap_or_else(|| to - Duration::days(DEFAULT_RANGE_DAYS - 1));

        if from > to {
            bail!("--from {} is after --to {}", from, to);
        }

        let window = TimeWindow::new(TimeWindow::day(from).start(), TimeWindow::day(to).end())?;
        Ok(window)
    }
}
