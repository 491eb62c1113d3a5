//! Snapshots every collection into the backup directory.

use super::error::BackupError;
use super::models::{BackupFile, BackupRun, CollectionExport};
use super::serializer;
use crate::record_store::{Collection, RecordStore};
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const SUMMARY_COLLECTION: &str = "summary";

/// Formats a run identifier usable in file names: RFC 3339 with
/// millisecond precision, colons and dots replaced by dashes.
pub fn run_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string()
}

pub fn collection_file_name(collection: Collection, timestamp: &str) -> String {
    format!("{}_{}.csv", collection.name(), timestamp)
}

pub fn summary_file_name(timestamp: &str) -> String {
    format!("backup_summary_{}.txt", timestamp)
}

pub(crate) fn human_size(size: u64) -> String {
    format!("{:#}", byte_unit::Byte::from(size))
}

pub struct Exporter {
    store: Arc<dyn RecordStore>,
    backup_dir: PathBuf,
}

impl Exporter {
    pub fn new(store: Arc<dyn RecordStore>, backup_dir: PathBuf) -> Self {
        Self { store, backup_dir }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn export_all(&self) -> BackupRun {
        self.export_all_at(Utc::now())
    }

    /// Exports every collection, tolerating per-collection failures.
    ///
    /// Only an unreachable data layer or an unusable backup directory make
    /// the run fail as a whole.
    pub fn export_all_at(&self, now: DateTime<Utc>) -> BackupRun {
        let mut run = BackupRun::new(run_timestamp(now), now);
        info!(
            "Starting backup export {} into {:?}",
            run.timestamp, self.backup_dir
        );

        if let Err(e) = self.store.ping() {
            let err = BackupError::Connectivity(format!("{:#}", e));
            error!("Backup {} aborted: {}", run.timestamp, err);
            run.fail(err.to_string());
            run.finished_at = Some(Utc::now());
            return run;
        }

        if let Err(e) = fs::create_dir_all(&self.backup_dir) {
            let err = BackupError::io(&self.backup_dir, e);
            error!("Backup {} aborted: {}", run.timestamp, err);
            run.fail(err.to_string());
            run.finished_at = Some(Utc::now());
            return run;
        }

        for collection in Collection::ALL {
            let mut export = self.export_collection(collection);
            let file_name = collection_file_name(collection, &run.timestamp);
            match self.write_file(&file_name, collection.name(), &export.csv_text) {
                Ok(file) => run.files.push(file),
                Err(e) => {
                    error!("Failed to write {}: {}", file_name, e);
                    export.error = Some(e.to_string());
                }
            }
            run.per_collection.insert(collection, export);
        }

        let summary_name = summary_file_name(&run.timestamp);
        let summary_text = render_summary(&run);
        match self.write_file(&summary_name, SUMMARY_COLLECTION, &summary_text) {
            Ok(file) => run.files.push(file),
            Err(e) => {
                warn!("Failed to write backup summary: {}", e);
                run.warnings.push(format!("Summary not written: {}", e));
            }
        }

        run.finished_at = Some(Utc::now());
        let failed = run.failed_collections();
        if failed.is_empty() {
            info!(
                "Backup {} exported {} files",
                run.timestamp,
                run.files.len()
            );
        } else {
            warn!(
                "Backup {} completed with {} failed collection(s): {:?}",
                run.timestamp,
                failed.len(),
                failed
            );
        }
        run
    }

    fn export_collection(&self, collection: Collection) -> CollectionExport {
        let result = self
            .store
            .fetch_collection(collection)
            .map_err(|e| format!("{:#}", e))
            .and_then(|records| {
                serializer::serialize(&records)
                    .map(|csv_text| (records.len(), csv_text))
                    .map_err(|e| e.to_string())
            });

        match result {
            Ok((count, csv_text)) => {
                info!("Exported {} records from {}", count, collection);
                CollectionExport {
                    csv_text,
                    record_count: Some(count),
                    error: None,
                }
            }
            Err(err) => {
                error!("Failed to export {}: {}", collection, err);
                CollectionExport {
                    csv_text: format!("Error exporting {}: {}", collection, err),
                    record_count: None,
                    error: Some(err),
                }
            }
        }
    }

    fn write_file(
        &self,
        file_name: &str,
        collection: &str,
        content: &str,
    ) -> Result<BackupFile, BackupError> {
        let path = self.backup_dir.join(file_name);
        fs::write(&path, content).map_err(|e| BackupError::io(&path, e))?;
        Ok(BackupFile {
            name: file_name.to_string(),
            path,
            collection: collection.to_string(),
            size: content.len() as u64,
        })
    }
}

/// Human-readable description of a run, written next to the CSV files.
pub fn render_summary(run: &BackupRun) -> String {
    RunSummary(run).to_string()
}

struct RunSummary<'a>(&'a BackupRun);

impl fmt::Display for RunSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run = self.0;
        writeln!(f, "Workdesk backup summary")?;
        writeln!(f, "Run: {}", run.timestamp)?;
        writeln!(f, "Started: {}", run.started_at.to_rfc3339())?;

        let exported = run.per_collection.values().filter(|e| e.is_ok()).count();
        let outcome = if !run.success {
            "FAILED"
        } else if exported == run.per_collection.len() {
            "SUCCESS"
        } else {
            "PARTIAL"
        };
        writeln!(
            f,
            "Outcome: {} ({} of {} collections exported)",
            outcome,
            exported,
            run.per_collection.len()
        )?;
        if let Some(error) = &run.error {
            writeln!(f, "Error: {}", error)?;
        }

        writeln!(f)?;
        writeln!(f, "Collections:")?;
        for (collection, export) in &run.per_collection {
            match (&export.error, export.record_count) {
                (None, Some(count)) => writeln!(f, "  {}: {} records", collection, count)?,
                (Some(err), _) => writeln!(f, "  {}: FAILED - {}", collection, err)?,
                (None, None) => writeln!(f, "  {}: no data", collection)?,
            }
        }

        writeln!(f)?;
        writeln!(f, "Files:")?;
        for file in &run.files {
            writeln!(f, "  {} ({})", file.name, human_size(file.size))?;
        }
        Ok(())
    }
}
