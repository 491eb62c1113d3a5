use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub backup_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,

    // Feature configs
    pub backup: Option<BackupConfig>,
    pub mail: Option<MailConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BackupConfig {
    pub enabled: Option<bool>,
    /// Daily cron expression, `M H * * *`
    pub cron: Option<String>,
    /// `UTC` or a fixed offset such as `+02:00`
    pub timezone: Option<String>,
    pub retention_days: Option<u64>,
    pub restart_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct MailConfig {
    pub relay_url: Option<String>,
    pub auth_token: Option<String>,
    pub from: Option<String>,
    pub to: Option<Vec<String>>,
    pub timeout_sec: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_full_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
db_path = "/data/workdesk.db"
port = 4000

[backup]
cron = "30 2 * * *"
timezone = "+01:00"
retention_days = 14

[mail]
relay_url = "http://relay:8025/send"
to = ["ops@example.com", "owner@example.com"]
"#,
        )
        .unwrap();

        let config = FileConfig::load(&path).unwrap();

        assert_eq!(config.db_path.as_deref(), Some("/data/workdesk.db"));
        assert_eq!(config.port, Some(4000));
        let backup = config.backup.unwrap();
        assert_eq!(backup.cron.as_deref(), Some("30 2 * * *"));
        assert_eq!(backup.retention_days, Some(14));
        assert!(backup.enabled.is_none());
        assert_eq!(config.mail.unwrap().to.unwrap().len(), 2);
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();

        let err = FileConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = FileConfig::load(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
