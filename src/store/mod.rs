//! Persistent record stores
//!
//! Two back-ends share the [`RecordStore`] trait:
//! - [`CsvStore`]: one header row plus one row per record (default)
//! - [`SqliteStore`]: `account_records` table keyed by record ID
//!
//! The back-end is picked from the file extension.

mod csv_store;
mod sqlite_store;

pub use csv_store::CsvStore;
pub(crate) use csv_store::write_csv_atomic;
pub use sqlite_store::SqliteStore;

use std::fmt;
use std::path::Path;

use crate::error::StorageResult;
use crate::types::AccountRecord;

/// Durable storage for account records
///
/// Stores never modify or delete a row once written. Deduplication is the
/// recorder's job; stores only guarantee that an append is all-or-nothing.
pub trait RecordStore {
    fn path(&self) -> &Path;

    /// Every stored record, oldest first
    fn load(&mut self) -> StorageResult<Vec<AccountRecord>>;

    /// Durably add `records`. Either all of them are stored or none are.
    fn append(&mut self, records: &[AccountRecord]) -> StorageResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFormat {
    Csv,
    Sqlite,
}

impl StoreFormat {
    /// `.db`, `.sqlite` and `.sqlite3` select SQLite, anything else CSV
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("db") | Some("sqlite") | Some("sqlite3") => StoreFormat::Sqlite,
            _ => StoreFormat::Csv,
        }
    }
}

impl fmt::Display for StoreFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreFormat::Csv => write!(f, "csv"),
            StoreFormat::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Open the store at `path`, creating it if needed
pub fn open_store(path: impl AsRef<Path>) -> StorageResult<Box<dyn RecordStore>> {
    let path = path.as_ref();
    match StoreFormat::from_path(path) {
        StoreFormat::Csv => Ok(Box::new(CsvStore::open(path)?)),
        StoreFormat::Sqlite => Ok(Box::new(SqliteStore::open(path)?)),
    }
}

/// Chronological order used by every store: event time, then record ID
pub(crate) fn sort_chronologically(records: &mut [AccountRecord]) {
    records.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id)));
}
