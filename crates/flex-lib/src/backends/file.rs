//! Filesystem-backed collaborators for running without a cloud account
//!
//! Layouts:
//! - audit log: `<root>/<account>/<region>/*.json`, each file holding lookup
//!   records (a JSON array, or an object with an `Events` array)
//! - object store: `<root>/<bucket>/<key>`
//! - metric store: `<root>/<namespace>.jsonl`, one datapoint per line

use crate::error::{FlexError, Result};
use crate::models::{AuditEvent, MetricDatum, ResourceRef};
use crate::orchestrator::{async_trait, AccountSession, AuditLog, AuditQuery, RegionCatalog};
use crate::publish::{MetricSink, MetricSource, ObjectStore};
use crate::time_window::TimeWindow;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// A record as returned by the audit log's lookup API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LookupRecord {
    #[serde(default)]
    event_id: Option<String>,
    event_name: String,
    event_time: DateTime<Utc>,
    #[serde(default)]
    resources: Vec<LookupResource>,
    /// The full event, JSON-encoded as a string
    cloud_trail_event: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LookupResource {
    resource_type: String,
    resource_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LookupFile {
    Page {
        #[serde(rename = "Events")]
        events: Vec<LookupRecord>,
    },
    Records(Vec<LookupRecord>),
}

impl LookupFile {
    fn into_records(self) -> Vec<LookupRecord> {
        match self {
            LookupFile::Page { events } => events,
            LookupFile::Records(records) => records,
        }
    }
}

impl LookupRecord {
    /// The event with a null payload, plus the still-encoded payload
    fn into_envelope(self) -> (AuditEvent, String) {
        let event = AuditEvent {
            event_id: self.event_id,
            event_name: self.event_name,
            event_time: self.event_time,
            resources: self
                .resources
                .into_iter()
                .map(|r| ResourceRef {
                    resource_type: r.resource_type,
                    resource_name: r.resource_name,
                })
                .collect(),
            payload: Value::Null,
        };
        (event, self.cloud_trail_event)
    }
}

/// Entries of `dir` sorted by name; a missing directory is empty
async fn sorted_entries(dir: &Path) -> Result<Vec<(PathBuf, bool)>> {
    let mut reader = match fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let is_dir = entry.file_type().await?.is_dir();
        entries.push((entry.path(), is_dir));
    }
    entries.sort();
    Ok(entries)
}

/// Audit log read from exported lookup pages on disk
#[derive(Debug, Clone)]
pub struct FileAuditLog {
    root: PathBuf,
}

impl FileAuditLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn read_region(&self, account_id: &str, region: &str) -> Result<Vec<LookupRecord>> {
        let dir = self.root.join(account_id).join(region);
        let mut records = Vec::new();

        for (path, is_dir) in sorted_entries(&dir).await? {
            if is_dir || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let bytes = fs::read(&path).await?;
            let file: LookupFile = serde_json::from_slice(&bytes)
                .map_err(|e| FlexError::AuditLog(format!("{}: {e}", path.display())))?;
            records.extend(file.into_records());
        }

        debug!(
            account_id = %account_id,
            region = %region,
            records = records.len(),
            "Loaded audit records from disk"
        );
        Ok(records)
    }
}

#[async_trait]
impl AuditLog for FileAuditLog {
    /// Records the query selects but whose payload does not decode are skipped
    async fn query(&self, session: &AccountSession, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        let records = self.read_region(&session.account_id, &query.region).await?;
        let mut events = Vec::new();

        for record in records {
            let (mut event, encoded) = record.into_envelope();
            if !query.matches(&event) {
                continue;
            }
            match serde_json::from_str(&encoded) {
                Ok(payload) => {
                    event.payload = payload;
                    events.push(event);
                }
                Err(e) => {
                    warn!(
                        event_name = %event.event_name,
                        event_id = event.event_id.as_deref().unwrap_or("-"),
                        error = %e,
                        "Skipping audit record with undecodable CloudTrailEvent"
                    );
                }
            }
        }

        Ok(events)
    }
}

#[async_trait]
impl RegionCatalog for FileAuditLog {
    /// Every subdirectory of the account directory is an enabled region
    async fn regions(&self, session: &AccountSession) -> Result<Vec<String>> {
        let dir = self.root.join(&session.account_id);
        Ok(sorted_entries(&dir)
            .await?
            .into_iter()
            .filter(|(_, is_dir)| *is_dir)
            .filter_map(|(path, _)| path.file_name()?.to_str().map(str::to_string))
            .collect())
    }
}

/// Object store mapping buckets to directories
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf> {
        if bucket.is_empty() || bucket == "." || bucket.contains(['/', '\\']) || bucket.contains("..") {
            return Err(FlexError::Storage(format!("invalid bucket name {bucket:?}")));
        }
        Ok(self.root.join(bucket))
    }

    /// Keys are relative, `/`-separated paths that stay inside the bucket
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let mut path = self.bucket_path(bucket)?;
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
                return Err(FlexError::Storage(format!(
                    "invalid object key {key:?} in bucket {bucket}"
                )));
            }
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a temp file first so readers never see a partial object
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &bytes).await?;
        fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => FlexError::Storage(format!("no object {key} in bucket {bucket}")),
            _ => e.into(),
        })
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let bucket_root = self.bucket_path(bucket)?;
        let mut pending = vec![bucket_root.clone()];
        let mut keys = Vec::new();

        while let Some(dir) = pending.pop() {
            for (path, is_dir) in sorted_entries(&dir).await? {
                if is_dir {
                    pending.push(path);
                    continue;
                }
                if path.extension().and_then(|e| e.to_str()) == Some("tmp") {
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&bucket_root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .filter_map(|c| c.as_os_str().to_str())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

/// Metric store appending datapoints to one JSON-lines file per namespace
#[derive(Debug, Clone)]
pub struct JsonlMetricStore {
    root: PathBuf,
}

impl JsonlMetricStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn namespace_path(&self, namespace: &str) -> PathBuf {
        self.root.join(format!("{namespace}.jsonl"))
    }
}

#[async_trait]
impl MetricSink for JsonlMetricStore {
    async fn publish(&self, namespace: &str, data: Vec<MetricDatum>) -> Result<()> {
        fs::create_dir_all(&self.root).await?;

        let mut lines = Vec::new();
        for datum in &data {
            serde_json::to_writer(&mut lines, datum)?;
            lines.push(b'\n');
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.namespace_path(namespace))
            .await
            .map_err(|e| FlexError::Publish(e.to_string()))?;
        file.write_all(&lines)
            .await
            .map_err(|e| FlexError::Publish(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| FlexError::Publish(e.to_string()))?;

        debug!(namespace = %namespace, datapoints = data.len(), "Appended datapoints");
        Ok(())
    }
}

#[async_trait]
impl MetricSource for JsonlMetricStore {
    async fn query(&self, namespace: &str, range: &TimeWindow) -> Result<Vec<MetricDatum>> {
        let contents = match fs::read_to_string(self.namespace_path(namespace)).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut data = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let datum: MetricDatum = serde_json::from_str(line)?;
            if range.contains(&datum.timestamp) {
                data.push(datum);
            }
        }
        Ok(data)
    }
}
