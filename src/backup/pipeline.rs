//! Export, retention and notification chained into a single run.

use super::exporter::Exporter;
use super::models::{BackupRun, BackupRunSummary};
use super::retention::RetentionManager;
use crate::background_jobs::JobError;
use crate::notifications::{DeliveryOutcome, Notifier};
use crate::server::metrics;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Everything a run produced: the backup itself plus the side outcomes.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run: BackupRun,
    pub deleted_files: usize,
    pub delivery: DeliveryOutcome,
    pub triggered_by: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReportSummary {
    pub backup: BackupRunSummary,
    pub deleted_files: usize,
    pub delivery: DeliveryOutcome,
    pub triggered_by: String,
    pub elapsed_ms: u64,
}

impl PipelineReport {
    pub fn summary(&self) -> PipelineReportSummary {
        PipelineReportSummary {
            backup: self.run.summary(),
            deleted_files: self.deleted_files,
            delivery: self.delivery.clone(),
            triggered_by: self.triggered_by.clone(),
            elapsed_ms: self.elapsed.as_millis() as u64,
        }
    }
}

/// Holds the in-progress flag for the duration of a run. Dropping it, also
/// during a panic, clears the flag and the running gauge.
pub(crate) struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        metrics::set_backup_running(true);
        Some(Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
        metrics::set_backup_running(false);
    }
}

pub struct BackupPipeline {
    exporter: Exporter,
    retention: RetentionManager,
    notifier: Notifier,
    retention_days: AtomicU64,
    in_progress: AtomicBool,
}

impl BackupPipeline {
    pub fn new(
        exporter: Exporter,
        retention: RetentionManager,
        notifier: Notifier,
        retention_days: u64,
    ) -> Self {
        Self {
            exporter,
            retention,
            notifier,
            retention_days: AtomicU64::new(retention_days),
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn retention_days(&self) -> u64 {
        self.retention_days.load(Ordering::Relaxed)
    }

    /// Takes effect from the next run.
    pub fn set_retention_days(&self, days: u64) {
        self.retention_days.store(days, Ordering::Relaxed);
    }

    /// Claims the run slot without running, or `None` if a run holds it.
    pub(crate) fn try_begin_run(&self) -> Option<RunGuard<'_>> {
        RunGuard::acquire(&self.in_progress)
    }

    /// Runs export, retention and notification in sequence.
    ///
    /// At most one run executes at a time; a concurrent call gets
    /// [`JobError::AlreadyRunning`]. Every other failure is folded into the
    /// returned report.
    pub fn run(&self, triggered_by: &str) -> Result<PipelineReport, JobError> {
        let Some(_guard) = self.try_begin_run() else {
            warn!(
                "Backup requested by {} while another run is in progress",
                triggered_by
            );
            return Err(JobError::AlreadyRunning);
        };

        let start = Instant::now();
        info!("Backup pipeline started (triggered_by: {})", triggered_by);

        let run = self.exporter.export_all();
        let deleted_files = self.retention.clean(self.retention_days());
        let delivery = self.notifier.notify(&run);

        let elapsed = start.elapsed();
        metrics::record_backup_run(if run.success { "success" } else { "failed" }, elapsed);
        for (collection, export) in &run.per_collection {
            if let Some(count) = export.record_count {
                metrics::set_collection_records(collection.name(), count);
            }
        }
        metrics::record_retention_deletions(deleted_files);
        metrics::record_notification(if delivery.delivered { "delivered" } else { "failed" });

        info!(
            "Backup pipeline {} finished in {:?}: success={}, files={}, deleted={}, delivered={}",
            run.timestamp,
            elapsed,
            run.success,
            run.files.len(),
            deleted_files,
            delivery.delivered
        );

        Ok(PipelineReport {
            run,
            deleted_files,
            delivery,
            triggered_by: triggered_by.to_string(),
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{MailMessage, MailTransport};
    use crate::record_store::{Collection, Record, RecordStore};
    use anyhow::{anyhow, Result};
    use std::path::Path;
    use std::sync::{Arc, Barrier, Mutex};
    use tempfile::TempDir;

    struct SlowStore {
        barrier: Option<Arc<Barrier>>,
    }

    impl RecordStore for SlowStore {
        fn ping(&self) -> Result<()> {
            if let Some(barrier) = &self.barrier {
                // Hold the run open until the test has tried a second trigger.
                barrier.wait();
                barrier.wait();
            }
            Ok(())
        }

        fn fetch_collection(&self, _collection: Collection) -> Result<Vec<Record>> {
            Ok(vec![Record::new().with("id", 1i64)])
        }

        fn count(&self, _collection: Collection) -> Result<usize> {
            Ok(1)
        }
    }

    #[derive(Default)]
    struct FlakyTransport {
        sent: Mutex<usize>,
    }

    impl MailTransport for FlakyTransport {
        fn send(&self, _message: &MailMessage) -> Result<()> {
            *self.sent.lock().unwrap() += 1;
            Err(anyhow!("relay unreachable"))
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn pipeline(dir: &Path, store: SlowStore, transport: Arc<FlakyTransport>) -> BackupPipeline {
        BackupPipeline::new(
            Exporter::new(Arc::new(store), dir.to_path_buf()),
            RetentionManager::new(dir.to_path_buf()),
            Notifier::new(transport, "a@b".to_string(), vec!["c@d".to_string()]),
            30,
        )
    }

    #[test]
    fn test_delivery_failure_does_not_change_success() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FlakyTransport::default());
        let pipeline = pipeline(dir.path(), SlowStore { barrier: None }, transport.clone());

        let report = pipeline.run("manual").unwrap();

        assert!(report.run.success);
        assert!(!report.delivery.delivered);
        assert_eq!(*transport.sent.lock().unwrap(), 1);
        assert_eq!(report.run.files.len(), 5);
        assert!(!pipeline.is_running());
    }

    #[test]
    fn test_second_trigger_while_running_is_rejected() {
        let dir = TempDir::new().unwrap();
        let barrier = Arc::new(Barrier::new(2));
        let pipeline = Arc::new(pipeline(
            dir.path(),
            SlowStore {
                barrier: Some(barrier.clone()),
            },
            Arc::new(FlakyTransport::default()),
        ));

        let background = {
            let pipeline = pipeline.clone();
            std::thread::spawn(move || pipeline.run("schedule").map(|r| r.run.success))
        };

        barrier.wait();
        assert!(pipeline.is_running());
        assert!(matches!(pipeline.run("manual"), Err(JobError::AlreadyRunning)));
        barrier.wait();

        assert!(background.join().unwrap().unwrap());
        assert!(!pipeline.is_running());
    }

    #[test]
    fn test_retention_window_change_applies_to_next_run() {
        let dir = TempDir::new().unwrap();
        let old = std::fs::File::create(dir.path().join("stale.csv")).unwrap();
        old.set_modified(std::time::SystemTime::now() - Duration::from_secs(10 * 86_400))
            .unwrap();
        let pipeline = pipeline(
            dir.path(),
            SlowStore { barrier: None },
            Arc::new(FlakyTransport::default()),
        );

        assert_eq!(pipeline.run("manual").unwrap().deleted_files, 0);

        pipeline.set_retention_days(7);
        assert_eq!(pipeline.retention_days(), 7);
        assert_eq!(pipeline.run("manual").unwrap().deleted_files, 1);
        assert!(!dir.path().join("stale.csv").exists());
    }

    #[test]
    fn test_guard_is_released_on_panic() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(
            dir.path(),
            SlowStore { barrier: None },
            Arc::new(FlakyTransport::default()),
        );

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = pipeline.try_begin_run().unwrap();
            assert!(pipeline.is_running());
            assert!(pipeline.try_begin_run().is_none());
            panic!("export blew up");
        }));

        assert!(result.is_err());
        assert!(!pipeline.is_running());
        assert!(pipeline.run("manual").is_ok());
    }

    #[test]
    fn test_summary_serializes() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(
            dir.path(),
            SlowStore { barrier: None },
            Arc::new(FlakyTransport::default()),
        );

        let report = pipeline.run("manual").unwrap();
        let json = serde_json::to_value(report.summary()).unwrap();

        assert_eq!(json["backup"]["success"], true);
        assert_eq!(json["delivery"]["delivered"], false);
        assert_eq!(json["triggeredBy"], "manual");
        assert_eq!(json["deletedFiles"], 0);
    }
}
