//! Automated backup and export of every logical data collection.
//!
//! A run snapshots each collection to a CSV file, retires artifacts older
//! than the retention window and reports the outcome by mail.

mod error;
mod exporter;
mod models;
mod pipeline;
mod retention;
pub mod serializer;

pub use error::BackupError;
pub(crate) use exporter::human_size;
pub use exporter::{
    collection_file_name, render_summary, run_timestamp, summary_file_name, Exporter,
    SUMMARY_COLLECTION,
};
pub use models::{BackupFile, BackupRun, BackupRunSummary, CollectionExport, CollectionSummary};
pub use pipeline::{BackupPipeline, PipelineReport, PipelineReportSummary};
pub use retention::{RetentionManager, DEFAULT_RETENTION_DAYS};
