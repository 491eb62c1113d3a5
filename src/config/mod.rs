mod file_config;

pub use file_config::{BackupConfig, FileConfig, MailConfig};

use crate::background_jobs::{ScheduleLoader, ScheduleSettings, DEFAULT_RESTART_DELAY};
use crate::backup::DEFAULT_RETENTION_DAYS;
use crate::server::RequestsLoggingLevel;
use anyhow::Result;
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAIL_FROM: &str = "backup@workdesk.local";
pub const DEFAULT_MAIL_TIMEOUT_SEC: u64 = 30;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_path: PathBuf,
    pub backup_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,

    // Feature configs (with defaults)
    pub backup: BackupSettings,
    pub mail: MailSettings,
}

#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub enabled: bool,
    pub schedule: ScheduleSettings,
    pub restart_delay: Duration,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: ScheduleSettings::default(),
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }
}

impl BackupSettings {
    fn from_file(file: Option<BackupConfig>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();
        Self {
            enabled: file.enabled.unwrap_or(defaults.enabled),
            schedule: ScheduleSettings {
                cron: file.cron.unwrap_or(defaults.schedule.cron),
                timezone: file.timezone.unwrap_or(defaults.schedule.timezone),
                retention_days: file.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS),
            },
            restart_delay: file
                .restart_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.restart_delay),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailSettings {
    /// No relay means messages are only logged.
    pub relay_url: Option<String>,
    pub auth_token: Option<String>,
    pub from: String,
    pub to: Vec<String>,
    pub timeout_sec: u64,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            relay_url: None,
            auth_token: None,
            from: DEFAULT_MAIL_FROM.to_string(),
            to: Vec::new(),
            timeout_sec: DEFAULT_MAIL_TIMEOUT_SEC,
        }
    }
}

impl MailSettings {
    fn from_file(file: Option<MailConfig>) -> Self {
        let file = file.unwrap_or_default();
        Self {
            relay_url: file.relay_url.filter(|url| !url.trim().is_empty()),
            auth_token: file.auth_token,
            from: file.from.unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string()),
            to: file.to.unwrap_or_default(),
            timeout_sec: file.timeout_sec.unwrap_or(DEFAULT_MAIL_TIMEOUT_SEC),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        // Reachability is checked per run.
        let backup_dir = file
            .backup_dir
            .map(PathBuf::from)
            .or_else(|| cli.backup_dir.clone())
            .unwrap_or_else(|| PathBuf::from("backups"));

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        Ok(Self {
            db_path,
            backup_dir,
            port,
            metrics_port,
            logging_level,
            backup: BackupSettings::from_file(file.backup),
            mail: MailSettings::from_file(file.mail),
        })
    }
}

/// Reads the schedule and retention part of the config file, for scheduler
/// restarts.
pub fn load_schedule_settings(config_path: Option<&Path>) -> Result<ScheduleSettings> {
    let file = match config_path {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    Ok(BackupSettings::from_file(file.backup).schedule)
}

pub fn schedule_loader(config_path: Option<PathBuf>) -> ScheduleLoader {
    Arc::new(move || load_schedule_settings(config_path.as_deref()))
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
