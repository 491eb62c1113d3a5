use super::job::{DailySchedule, JobError, ScheduleSettings};
use crate::backup::{BackupPipeline, PipelineReport};
use crate::server::metrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Re-reads schedule settings on restart.
pub type ScheduleLoader = Arc<dyn Fn() -> anyhow::Result<ScheduleSettings> + Send + Sync>;

pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(1000);

/// Status snapshot exposed to the admin API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub next_run_at: Option<String>,
    pub schedule_description: String,
    pub cron_expression: String,
    pub timezone: String,
    pub registered_at: Option<String>,
    pub run_in_progress: bool,
    pub retention_days: u64,
}

/// A live timer registration. Dropping the token's last clone does not stop
/// the task, `cancel` must be called.
struct Registration {
    schedule: DailySchedule,
    registered_at: DateTime<Utc>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the single daily backup registration.
pub struct BackupScheduler {
    pipeline: Arc<BackupPipeline>,
    settings: RwLock<ScheduleSettings>,
    loader: Option<ScheduleLoader>,
    restart_delay: Duration,
    registration: Mutex<Option<Registration>>,
}

impl BackupScheduler {
    pub fn new(
        pipeline: Arc<BackupPipeline>,
        settings: ScheduleSettings,
        restart_delay: Duration,
    ) -> Self {
        pipeline.set_retention_days(settings.retention_days);
        Self {
            pipeline,
            settings: RwLock::new(settings),
            loader: None,
            restart_delay,
            registration: Mutex::new(None),
        }
    }

    pub fn with_loader(mut self, loader: ScheduleLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn pipeline(&self) -> &Arc<BackupPipeline> {
        &self.pipeline
    }

    fn current_settings(&self) -> ScheduleSettings {
        match self.settings.read() {
            Ok(settings) => settings.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Registers the daily trigger. Calling it while already registered is a
    /// no-op. Returns whether a registration is active afterwards.
    pub async fn start(&self) -> bool {
        let mut registration = self.registration.lock().await;
        if let Some(existing) = registration.as_ref() {
            info!(
                "Backup scheduler already running ({}), ignoring start",
                existing.schedule.describe()
            );
            return true;
        }

        let schedule = match DailySchedule::parse(&self.current_settings()) {
            Ok(schedule) => schedule,
            Err(e) => {
                error!("Failed to register backup schedule: {}", e);
                metrics::set_scheduler_registered(false);
                return false;
            }
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(schedule_loop(
            schedule.clone(),
            self.pipeline.clone(),
            cancel.clone(),
        ));

        info!(
            "Backup scheduler started: {}, next run at {}",
            schedule.describe(),
            schedule.next_run_after(Utc::now()).to_rfc3339()
        );
        *registration = Some(Registration {
            schedule,
            registered_at: Utc::now(),
            cancel,
            task,
        });
        metrics::set_scheduler_registered(true);
        true
    }

    /// Cancels the registration. A run already executing is left to finish.
    pub async fn stop(&self) -> bool {
        let Some(registration) = self.registration.lock().await.take() else {
            debug!("Backup scheduler not running, ignoring stop");
            return false;
        };

        registration.cancel.cancel();
        if registration.task.is_finished() {
            debug!("Backup schedule task had already exited");
        }
        metrics::set_scheduler_registered(false);
        info!("Backup scheduler stopped");
        true
    }

    /// Stops, waits for the restart delay, re-reads the settings and starts
    /// again. Settings that fail to load leave the previous ones in place.
    pub async fn restart(&self) -> bool {
        self.stop().await;
        tokio::time::sleep(self.restart_delay).await;

        if let Some(loader) = &self.loader {
            match loader() {
                Ok(settings) => {
                    info!(
                        "Reloaded backup schedule settings: '{}' ({}), retention {} days",
                        settings.cron, settings.timezone, settings.retention_days
                    );
                    self.pipeline.set_retention_days(settings.retention_days);
                    match self.settings.write() {
                        Ok(mut current) => *current = settings,
                        Err(poisoned) => *poisoned.into_inner() = settings,
                    }
                }
                Err(e) => warn!(
                    "Failed to reload backup schedule settings, keeping previous: {:#}",
                    e
                ),
            }
        }

        self.start().await
    }

    /// Runs the pipeline now, independent of the schedule.
    pub async fn trigger_manual(&self) -> Result<PipelineReport, JobError> {
        run_pipeline(self.pipeline.clone(), "manual").await
    }

    pub async fn status(&self) -> SchedulerStatus {
        let registration = self.registration.lock().await;
        let run_in_progress = self.pipeline.is_running();
        let retention_days = self.pipeline.retention_days();

        if let Some(reg) = registration.as_ref() {
            return SchedulerStatus {
                is_running: true,
                next_run_at: Some(reg.schedule.next_run_after(Utc::now()).to_rfc3339()),
                schedule_description: reg.schedule.describe(),
                cron_expression: reg.schedule.cron_expression().to_string(),
                timezone: reg.schedule.timezone().to_string(),
                registered_at: Some(reg.registered_at.to_rfc3339()),
                run_in_progress,
                retention_days,
            };
        }

        let settings = self.current_settings();
        let schedule_description = match DailySchedule::parse(&settings) {
            Ok(schedule) => schedule.describe(),
            Err(e) => format!("Invalid schedule: {}", e),
        };
        SchedulerStatus {
            is_running: false,
            next_run_at: None,
            schedule_description,
            cron_expression: settings.cron,
            timezone: settings.timezone,
            registered_at: None,
            run_in_progress,
            retention_days,
        }
    }
}

async fn run_pipeline(
    pipeline: Arc<BackupPipeline>,
    triggered_by: &'static str,
) -> Result<PipelineReport, JobError> {
    tokio::task::spawn_blocking(move || pipeline.run(triggered_by))
        .await
        .map_err(|e| JobError::ExecutionFailed(format!("Backup task panicked: {}", e)))?
}

async fn schedule_loop(
    schedule: DailySchedule,
    pipeline: Arc<BackupPipeline>,
    cancel: CancellationToken,
) {
    let mut last_fire: Option<DateTime<Utc>> = None;
    loop {
        let now = Utc::now();
        let next_run = schedule.next_run_after(last_fire.map_or(now, |fired| fired.max(now)));
        let sleep_duration = (next_run.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        debug!(
            "Backup scheduler sleeping for {:?} until {}",
            sleep_duration,
            next_run.to_rfc3339()
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Backup schedule loop cancelled");
                break;
            }
            _ = tokio::time::sleep(sleep_duration) => {
                last_fire = Some(next_run.with_timezone(&Utc));
                match run_pipeline(pipeline.clone(), "schedule").await {
                    Ok(report) => info!(
                        "Scheduled backup {} finished (success: {})",
                        report.run.timestamp, report.run.success
                    ),
                    Err(JobError::AlreadyRunning) => {
                        warn!("Skipping scheduled backup, a run is already in progress")
                    }
                    Err(e) => error!("Scheduled backup failed: {}", e),
                }
            }
        }
    }
}
