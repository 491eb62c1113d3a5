//! Workdesk Server Library
//!
//! Scheduled CSV backups of the Workdesk application database, with
//! retention, mail notification and an admin HTTP surface.

pub mod background_jobs;
pub mod backup;
pub mod config;
pub mod notifications;
pub mod record_store;
pub mod server;

// Re-export commonly used types for convenience
pub use background_jobs::{BackupScheduler, JobError, ScheduleSettings};
pub use backup::{BackupPipeline, BackupRun, Exporter, RetentionManager};
pub use record_store::{Collection, FieldValue, Record, RecordStore, SqliteRecordStore};
pub use server::{run_server, RequestsLoggingLevel};
