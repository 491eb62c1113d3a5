use crate::record_store::Collection;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// An artifact written to the backup directory during a run.
#[derive(Debug, Clone, Serialize)]
pub struct BackupFile {
    pub name: String,
    pub path: PathBuf,
    /// Collection name, or `summary` for the run summary file.
    pub collection: String,
    pub size: u64,
}

/// Outcome of exporting one collection.
#[derive(Debug, Clone)]
pub struct CollectionExport {
    /// CSV text as written to disk, or the error placeholder line.
    pub csv_text: String,
    /// Number of records exported; `None` when fetching failed.
    pub record_count: Option<usize>,
    pub error: Option<String>,
}

impl CollectionExport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// In-memory result of a single backup run.
#[derive(Debug, Clone)]
pub struct BackupRun {
    pub timestamp: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub per_collection: BTreeMap<Collection, CollectionExport>,
    pub files: Vec<BackupFile>,
    pub success: bool,
    pub error: Option<String>,
    /// Non-fatal problems that did not flip `success`.
    pub warnings: Vec<String>,
}

impl BackupRun {
    pub fn new(timestamp: String, started_at: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            started_at,
            finished_at: None,
            per_collection: BTreeMap::new(),
            files: Vec::new(),
            success: true,
            error: None,
            warnings: Vec::new(),
        }
    }

    pub fn fail(&mut self, error: String) {
        self.success = false;
        self.error = Some(error);
    }

    pub fn failed_collections(&self) -> Vec<Collection> {
        self.per_collection
            .iter()
            .filter(|(_, export)| !export.is_ok())
            .map(|(collection, _)| *collection)
            .collect()
    }

    pub fn summary(&self) -> BackupRunSummary {
        BackupRunSummary {
            timestamp: self.timestamp.clone(),
            started_at: self.started_at.to_rfc3339(),
            finished_at: self.finished_at.map(|dt| dt.to_rfc3339()),
            success: self.success,
            error: self.error.clone(),
            collections: self
                .per_collection
                .iter()
                .map(|(collection, export)| {
                    (
                        collection.name().to_string(),
                        CollectionSummary {
                            records: export.record_count,
                            error: export.error.clone(),
                        },
                    )
                })
                .collect(),
            files: self.files.clone(),
            warnings: self.warnings.clone(),
        }
    }
}

/// Serializable view of a run, without the CSV payloads.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRunSummary {
    pub timestamp: String,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub collections: BTreeMap<String, CollectionSummary>,
    pub files: Vec<BackupFile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
