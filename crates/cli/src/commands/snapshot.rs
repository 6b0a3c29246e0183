//! Archived daily snapshots

use super::scores::ScoreRow;
use crate::output::{self, OutputFormat};
use anyhow::{Context, Result};
use colored::Colorize;
use flex_lib::publish::{latest_snapshot_key, load_snapshot, ObjectStore};
use serde::Serialize;
use tabled::Tabled;

#[derive(Tabled, Serialize)]
struct KeyRow {
    #[tabled(rename = "KEY")]
    key: String,
}

/// List snapshot keys under a prefix
pub async fn list_snapshots(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    format: OutputFormat,
) -> Result<()> {
    let keys = store.list(bucket, prefix).await?;

    match format {
        OutputFormat::Json => output::print_json(&keys),
        OutputFormat::Table => {
            let rows: Vec<KeyRow> = keys.into_iter().map(|key| KeyRow { key }).collect();
            output::print_table(&rows, format);
        }
    }

    Ok(())
}

/// Show one snapshot; the most recent one when `key` is `None`
pub async fn show_snapshot(
    store: &dyn ObjectStore,
    bucket: &str,
    key: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let key = match key {
        Some(key) => key,
        None => match latest_snapshot_key(store, bucket).await? {
            Some(key) => key,
            None => {
                output::print_warning(&format!("No snapshots in bucket {}", bucket));
                return Ok(());
            }
        },
    };

    let snapshot = load_snapshot(store, bucket, &key)
        .await
        .with_context(|| format!("Failed to load snapshot {}", key))?;

    match format {
        OutputFormat::Json => output::print_json(&snapshot),
        OutputFormat::Table => {
            println!("{} {}", "Snapshot:".bold(), key);
            println!();
            let rows: Vec<ScoreRow> = snapshot
                .iter()
                .map(|(account, record)| ScoreRow::new(account, record))
                .collect();
            output::print_table(&rows, format);
        }
    }

    Ok(())
}
