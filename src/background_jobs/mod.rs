//! Daily scheduling of the backup pipeline.

mod job;
mod scheduler;

pub use job::{DailySchedule, JobError, ScheduleError, ScheduleSettings};
pub use scheduler::{BackupScheduler, ScheduleLoader, SchedulerStatus, DEFAULT_RESTART_DELAY};
