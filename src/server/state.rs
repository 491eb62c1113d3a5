use axum::extract::FromRef;

use crate::background_jobs::BackupScheduler;
use crate::record_store::RecordStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedBackupScheduler = Arc<BackupScheduler>;
pub type GuardedRecordStore = Arc<dyn RecordStore>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub scheduler: GuardedBackupScheduler,
    pub record_store: GuardedRecordStore,
    pub hash: String,
}

impl ServerState {
    pub fn new(config: ServerConfig, scheduler: GuardedBackupScheduler) -> Self {
        let record_store = scheduler.pipeline().exporter().store().clone();
        ServerState {
            config,
            start_time: Instant::now(),
            scheduler,
            record_store,
            hash: env!("GIT_HASH").to_owned(),
        }
    }
}

impl FromRef<ServerState> for GuardedBackupScheduler {
    fn from_ref(input: &ServerState) -> Self {
        input.scheduler.clone()
    }
}

impl FromRef<ServerState> for GuardedRecordStore {
    fn from_ref(input: &ServerState) -> Self {
        input.record_store.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
