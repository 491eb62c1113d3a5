//! Test fixture creation for the records database and mail transport

use super::constants::*;
use anyhow::Result;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use workdesk_server::backup::{BackupPipeline, Exporter, RetentionManager};
use workdesk_server::notifications::{MailMessage, MailTransport, Notifier};
use workdesk_server::record_store::RecordStore;

/// Creates a records database with 2 users, 3 work orders (one without
/// notes), no invoices and no activity entries.
/// Returns (temp_dir, db_path)
pub fn create_test_db() -> Result<(TempDir, PathBuf)> {
    let dir = TempDir::new()?;
    let db_path = dir.path().join("workdesk.db");
    let conn = Connection::open(&db_path)?;

    conn.execute_batch(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            role TEXT NOT NULL,
            password_hash TEXT NOT NULL
        );
        CREATE TABLE work_orders (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            status TEXT NOT NULL,
            assigned_to INTEGER REFERENCES users(id),
            created_by INTEGER REFERENCES users(id),
            notes TEXT,
            tags TEXT
        );
        CREATE TABLE invoices (
            id INTEGER PRIMARY KEY,
            work_order_id INTEGER REFERENCES work_orders(id),
            created_by INTEGER REFERENCES users(id),
            amount REAL NOT NULL,
            line_items TEXT
        );
        CREATE TABLE activity_logs (
            id INTEGER PRIMARY KEY,
            user_id INTEGER REFERENCES users(id),
            action TEXT NOT NULL,
            details TEXT
        );",
    )?;

    conn.execute(
        "INSERT INTO users VALUES (1, ?1, 'ada@workdesk.test', 'admin', 'hash-1')",
        params![USER_1_NAME],
    )?;
    conn.execute(
        "INSERT INTO users VALUES (2, ?1, 'grace@workdesk.test', 'technician', 'hash-2')",
        params![USER_2_NAME],
    )?;

    conn.execute(
        "INSERT INTO work_orders VALUES (1, ?1, 'open', 2, 1, ?2, '[\"urgent\",\"plumbing\"]')",
        params![WORK_ORDER_1_TITLE, WORK_ORDER_1_NOTES],
    )?;
    conn.execute(
        "INSERT INTO work_orders VALUES (2, ?1, 'in_progress', 1, 1, 'Check breakers', '[]')",
        params![WORK_ORDER_2_TITLE],
    )?;
    conn.execute(
        "INSERT INTO work_orders VALUES (3, ?1, 'done', 2, 2, NULL, NULL)",
        params![WORK_ORDER_3_TITLE],
    )?;

    Ok((dir, db_path))
}

/// Mail transport that keeps every message in memory.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<MailMessage>>,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl MailTransport for RecordingTransport {
    fn send(&self, message: &MailMessage) -> Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

pub fn build_pipeline(
    store: Arc<dyn RecordStore>,
    backup_dir: &Path,
    transport: Arc<RecordingTransport>,
) -> BackupPipeline {
    BackupPipeline::new(
        Exporter::new(store, backup_dir.to_path_buf()),
        RetentionManager::new(backup_dir.to_path_buf()),
        Notifier::new(transport, MAIL_FROM.to_string(), vec![MAIL_TO.to_string()]),
        TEST_RETENTION_DAYS,
    )
}
