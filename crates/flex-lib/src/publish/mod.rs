//! Metric publication and snapshot archival
//!
//! Daily scores leave the process through two collaborators: a metric sink
//! receiving one batch of datapoints per run, and an object store receiving
//! the full JSON snapshot under a date/time-structured key.

use crate::error::Result;
use crate::models::{Dimension, MetricDatum};
use crate::scores::ScoreRecord;
use crate::time_window::TimeWindow;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub use async_trait::async_trait;

/// Dimension naming the account a datapoint belongs to
pub const ACCOUNT_DIMENSION: &str = "accountId";
/// Unit attached to every published datapoint
pub const METRIC_UNIT: &str = "None";

/// Daily score records keyed by account id, plus the organization entry
pub type Snapshot = BTreeMap<String, ScoreRecord>;

/// Destination of published datapoints
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn publish(&self, namespace: &str, data: Vec<MetricDatum>) -> Result<()>;
}

/// Read side of the metric store
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Datapoints of `namespace` with a timestamp inside `range`
    async fn query(&self, namespace: &str, range: &TimeWindow) -> Result<Vec<MetricDatum>>;
}

/// Blob storage for run snapshots
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Keys under `prefix`, sorted ascending
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;
}

/// Flatten a snapshot into datapoints, one per account and metric
pub fn metric_data(snapshot: &Snapshot, timestamp: DateTime<Utc>) -> Vec<MetricDatum> {
    snapshot
        .iter()
        .flat_map(|(account_id, record)| {
            record.iter().map(move |(name, value)| MetricDatum {
                name: name.as_str().to_string(),
                value,
                unit: METRIC_UNIT.to_string(),
                timestamp,
                dimensions: vec![Dimension {
                    name: ACCOUNT_DIMENSION.to_string(),
                    value: account_id.clone(),
                }],
            })
        })
        .collect()
}

/// Object key of a snapshot taken at `timestamp`: `YYYY/MM/DD/HHMMSS.json`
pub fn snapshot_key(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y/%m/%d/%H%M%S.json").to_string()
}

/// Serialize and store a snapshot, returning its key
pub async fn archive_snapshot(
    store: &dyn ObjectStore,
    bucket: &str,
    snapshot: &Snapshot,
    timestamp: DateTime<Utc>,
) -> Result<String> {
    let key = snapshot_key(timestamp);
    let bytes = serde_json::to_vec(snapshot)?;
    store.put(bucket, &key, bytes).await?;
    Ok(key)
}

/// Load a previously archived snapshot
pub async fn load_snapshot(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<Snapshot> {
    let bytes = store.get(bucket, key).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Key of the most recent snapshot, if any
pub async fn latest_snapshot_key(store: &dyn ObjectStore, bucket: &str) -> Result<Option<String>> {
    Ok(store.list(bucket, "").await?.pop())
}
