use super::models::{Collection, FieldValue, Record};
use super::RecordStore;
use anyhow::{Context, Result};
use base64::Engine;
use rusqlite::{types::ValueRef, Connection, OpenFlags, Row};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Columns whose TEXT content is JSON and gets decoded into nested values.
const JSON_COLUMNS: &[&str] = &["tags", "line_items", "details", "metadata"];

/// Columns that never leave the database.
const EXCLUDED_COLUMNS: &[&str] = &["password_hash"];

const USERS_QUERY: &str = "SELECT * FROM users ORDER BY id";

const WORK_ORDERS_QUERY: &str = "SELECT wo.*, \
        assignee.name AS assigned_to_name, \
        creator.name AS created_by_name \
    FROM work_orders wo \
    LEFT JOIN users assignee ON assignee.id = wo.assigned_to \
    LEFT JOIN users creator ON creator.id = wo.created_by \
    ORDER BY wo.id";

const INVOICES_QUERY: &str = "SELECT inv.*, \
        wo.title AS work_order_title, \
        creator.name AS created_by_name \
    FROM invoices inv \
    LEFT JOIN work_orders wo ON wo.id = inv.work_order_id \
    LEFT JOIN users creator ON creator.id = inv.created_by \
    ORDER BY inv.id";

const ACTIVITY_LOGS_QUERY: &str = "SELECT log.*, u.name AS user_name \
    FROM activity_logs log \
    LEFT JOIN users u ON u.id = log.user_id \
    ORDER BY log.id";

/// Reads domain records from the application's SQLite database.
///
/// A fresh read-only connection is opened for every operation, so a
/// database that disappears or becomes unreadable is detected on the next
/// backup run rather than at startup.
pub struct SqliteRecordStore {
    db_path: PathBuf,
}

impl SqliteRecordStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn open(&self) -> Result<Connection> {
        Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open records database at {:?}", self.db_path))
    }

    fn query_for(collection: Collection) -> &'static str {
        match collection {
            Collection::Users => USERS_QUERY,
            Collection::WorkOrders => WORK_ORDERS_QUERY,
            Collection::Invoices => INVOICES_QUERY,
            Collection::ActivityLogs => ACTIVITY_LOGS_QUERY,
        }
    }

    fn row_to_record(row: &Row, column_names: &[String]) -> rusqlite::Result<Record> {
        let mut record = Record::new();
        for (index, name) in column_names.iter().enumerate() {
            if EXCLUDED_COLUMNS.contains(&name.as_str()) {
                continue;
            }
            let value = match row.get_ref(index)? {
                ValueRef::Null => continue,
                ValueRef::Integer(i) => FieldValue::Integer(i),
                ValueRef::Real(f) => FieldValue::Float(f),
                ValueRef::Text(bytes) => {
                    let text = String::from_utf8_lossy(bytes).to_string();
                    decode_text_column(name, text)
                }
                ValueRef::Blob(bytes) => {
                    FieldValue::Text(base64::engine::general_purpose::STANDARD.encode(bytes))
                }
            };
            record.insert(name, value);
        }
        Ok(record)
    }
}

fn decode_text_column(column: &str, text: String) -> FieldValue {
    if JSON_COLUMNS.contains(&column) {
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json @ (serde_json::Value::Array(_) | serde_json::Value::Object(_))) => {
                return FieldValue::from_json(json);
            }
            Ok(_) => {}
            Err(e) => debug!("Column {} is not valid JSON, keeping raw text: {}", column, e),
        }
    }
    FieldValue::Text(text)
}

impl RecordStore for SqliteRecordStore {
    fn ping(&self) -> Result<()> {
        let conn = self.open()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .context("Records database did not answer")?;
        Ok(())
    }

    fn fetch_collection(&self, collection: Collection) -> Result<Vec<Record>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(Self::query_for(collection))
            .with_context(|| format!("Failed to prepare query for {}", collection))?;
        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();

        let records = stmt
            .query_map([], |row| Self::row_to_record(row, &column_names))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to read {} rows", collection))?;

        debug!("Fetched {} records from {}", records.len(), collection);
        Ok(records)
    }

    fn count(&self, collection: Collection) -> Result<usize> {
        let conn = self.open()?;
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", collection.name()),
                [],
                |row| row.get(0),
            )
            .with_context(|| format!("Failed to count {}", collection))?;
        Ok(count as usize)
    }
}
