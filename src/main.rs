use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use workdesk_server::background_jobs::BackupScheduler;
use workdesk_server::backup::{BackupPipeline, Exporter, RetentionManager};
use workdesk_server::config::{schedule_loader, AppConfig, CliConfig, FileConfig, MailSettings};
use workdesk_server::notifications::{
    HttpMailTransport, LogOnlyTransport, MailTransport, Notifier,
};
use workdesk_server::record_store::{RecordStore, SqliteRecordStore};
use workdesk_server::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the Workdesk SQLite application database.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Directory where backup files are written.
    #[clap(long, value_parser = parse_path)]
    pub backup_dir: Option<PathBuf>,

    /// Path to a TOML config file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: self.db_path.clone(),
            backup_dir: self.backup_dir.clone(),
            port: self.port,
            metrics_port: self.metrics_port,
            logging_level: self.logging_level.clone(),
        }
    }
}

fn make_transport(mail: &MailSettings) -> Arc<dyn MailTransport> {
    match &mail.relay_url {
        Some(url) => {
            info!("Backup notifications go through mail relay {}", url);
            Arc::new(HttpMailTransport::new(
                url.clone(),
                mail.auth_token.clone(),
                mail.timeout_sec,
            ))
        }
        None => {
            info!("No mail relay configured, backup notifications will only be logged");
            Arc::new(LogOnlyTransport)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}...", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let app_config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Initializing metrics...");
    metrics::init_metrics();

    info!("Opening Workdesk database at {:?}...", app_config.db_path);
    let record_store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(&app_config.db_path));
    if let Err(e) = record_store.ping() {
        // Each run checks connectivity again.
        error!("Database not reachable at startup: {:#}", e);
    }

    info!("Backups will be written to {:?}", app_config.backup_dir);
    let notifier = Notifier::new(
        make_transport(&app_config.mail),
        app_config.mail.from.clone(),
        app_config.mail.to.clone(),
    );
    let pipeline = BackupPipeline::new(
        Exporter::new(record_store, app_config.backup_dir.clone()),
        RetentionManager::new(app_config.backup_dir.clone()),
        notifier,
        app_config.backup.schedule.retention_days,
    );
    let scheduler = Arc::new(
        BackupScheduler::new(
            Arc::new(pipeline),
            app_config.backup.schedule.clone(),
            app_config.backup.restart_delay,
        )
        .with_loader(schedule_loader(cli_args.config.clone())),
    );

    if app_config.backup.enabled {
        scheduler.start().await;
    } else {
        info!("Scheduled backups disabled by configuration");
    }

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Shutdown signal received");
            shutdown.cancel();
        });
    }

    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        port: app_config.port,
        metrics_port: app_config.metrics_port,
    };
    let result = run_server(server_config, scheduler.clone(), shutdown).await;

    scheduler.stop().await;
    info!("Workdesk server stopped");
    result
}
