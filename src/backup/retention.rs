//! Deletes backup artifacts older than the retention window.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const DEFAULT_RETENTION_DAYS: u64 = 30;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

pub struct RetentionManager {
    backup_dir: PathBuf,
}

impl RetentionManager {
    pub fn new(backup_dir: PathBuf) -> Self {
        Self { backup_dir }
    }

    /// Deletes files whose age exceeds `max_age_days` and returns how many
    /// were removed. A missing directory counts as nothing to delete.
    pub fn clean(&self, max_age_days: u64) -> usize {
        self.clean_at(max_age_days, SystemTime::now())
    }

    /// Same as [`clean`](Self::clean), measuring ages relative to `now`.
    ///
    /// A file exactly `max_age_days` old is kept; anything older goes.
    pub fn clean_at(&self, max_age_days: u64, now: SystemTime) -> usize {
        if !self.backup_dir.exists() {
            debug!(
                "Backup directory {:?} does not exist, nothing to clean",
                self.backup_dir
            );
            return 0;
        }

        info!(
            "Cleaning backups older than {} days in {:?}",
            max_age_days, self.backup_dir
        );

        let max_age = Duration::from_secs(max_age_days.saturating_mul(SECONDS_PER_DAY));
        let mut deleted = 0;
        for entry in WalkDir::new(&self.backup_dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to read backup directory entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let modified = match entry.metadata().map(|m| m.modified()) {
                Ok(Ok(modified)) => modified,
                Ok(Err(e)) => {
                    warn!("No modification time for {:?}: {}", entry.path(), e);
                    continue;
                }
                Err(e) => {
                    warn!("Failed to stat {:?}: {}", entry.path(), e);
                    continue;
                }
            };

            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age <= max_age {
                continue;
            }

            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!(
                        "Deleted {:?} ({:.1} days old)",
                        entry.path(),
                        age.as_secs_f64() / SECONDS_PER_DAY as f64
                    );
                    deleted += 1;
                }
                Err(e) => warn!("Failed to delete old backup {:?}: {}", entry.path(), e),
            }
        }

        if deleted > 0 {
            info!("Deleted {} old backup files", deleted);
        } else {
            info!("No old backup files to clean up");
        }
        deleted
    }
}
