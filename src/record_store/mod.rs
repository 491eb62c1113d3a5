//! Read access to the application's domain records.
//!
//! The backup subsystem does not own the domain schema; it only needs to
//! pull every record of each logical collection with references resolved.

mod models;
mod sqlite_record_store;

pub use models::{Collection, FieldValue, Record};
pub use sqlite_record_store::SqliteRecordStore;

use anyhow::Result;

pub trait RecordStore: Send + Sync {
    /// Checks that the data layer is reachable.
    fn ping(&self) -> Result<()>;

    /// Returns all current records of a collection, with foreign keys
    /// resolved to display-friendly fields.
    fn fetch_collection(&self, collection: Collection) -> Result<Vec<Record>>;

    fn count(&self, collection: Collection) -> Result<usize>;
}
