//! Collaborator implementations
//!
//! The in-memory backends serve tests and embedding; the file backends let
//! the agent and the CLI run against exported audit data on local disk.

mod file;
mod memory;

pub use file::{FileAuditLog, FsObjectStore, JsonlMetricStore};
pub use memory::{
    MemoryAuditLog, MemoryMetricStore, MemoryObjectStore, RoleArnBroker, StaticDirectory,
    ROLE_SESSION_NAME,
};

use std::path::PathBuf;

/// Directory layout shared by the agent and the CLI under one data root
#[derive(Debug, Clone)]
pub struct LocalLayout {
    root: PathBuf,
}

impl LocalLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/audit/<account>/<region>/*.json`
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// `<root>/objects/<bucket>/<key>`
    pub fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    /// `<root>/metrics/<namespace>.jsonl`
    pub fn metrics_dir(&self) -> PathBuf {
        self.root.join("metrics")
    }

    pub fn audit_log(&self) -> FileAuditLog {
        FileAuditLog::new(self.audit_dir())
    }

    pub fn object_store(&self) -> FsObjectStore {
        FsObjectStore::new(self.objects_dir())
    }

    pub fn metric_store(&self) -> JsonlMetricStore {
        JsonlMetricStore::new(self.metrics_dir())
    }
}
