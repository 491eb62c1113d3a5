//! Test server spawning an isolated app on a random port

use super::fixtures::{build_pipeline, create_test_db, RecordingTransport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use workdesk_server::background_jobs::{BackupScheduler, ScheduleSettings};
use workdesk_server::record_store::SqliteRecordStore;
use workdesk_server::server::{make_app, RequestsLoggingLevel, ServerConfig};

pub struct TestServer {
    pub base_url: String,

    pub backup_dir: PathBuf,

    pub db_path: PathBuf,

    pub transport: Arc<RecordingTransport>,

    pub scheduler: Arc<BackupScheduler>,

    _temp_db_dir: TempDir,
    _temp_backup_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let (temp_db_dir, db_path) = create_test_db().expect("Failed to create test database");
        let temp_backup_dir = TempDir::new().expect("Failed to create backup dir");
        let backup_dir = temp_backup_dir.path().to_path_buf();

        let transport = Arc::new(RecordingTransport::default());
        let pipeline = build_pipeline(
            Arc::new(SqliteRecordStore::new(&db_path)),
            &backup_dir,
            transport.clone(),
        );
        let scheduler = Arc::new(BackupScheduler::new(
            Arc::new(pipeline),
            ScheduleSettings::default(),
            Duration::from_millis(10),
        ));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            port,
            metrics_port: 0,
            requests_logging_level: RequestsLoggingLevel::None,
        };
        let app = make_app(config, scheduler.clone());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        Self {
            base_url,
            backup_dir,
            db_path,
            transport,
            scheduler,
            _temp_db_dir: temp_db_dir,
            _temp_backup_dir: temp_backup_dir,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    #[allow(dead_code)]
    pub fn backup_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.backup_dir)
            .expect("Failed to read backup dir")
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
