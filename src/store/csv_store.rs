//! CSV record store
//!
//! Every append rewrites the whole table into a temporary file next to the
//! target, fsyncs it and renames it over the original, so a crash leaves
//! either the old or the new table on disk.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{sort_chronologically, RecordStore};
use crate::error::{StorageError, StorageResult};
use crate::types::AccountRecord;

/// Header row, matching the field order of `AccountRecord`
pub(crate) const COLUMNS: [&str; 15] = [
    "id",
    "kind",
    "time",
    "asset",
    "amount",
    "symbol",
    "side",
    "buy_currency",
    "buy_amount",
    "sell_currency",
    "sell_amount",
    "fee_currency",
    "fee_amount",
    "exchange",
    "comment",
];

#[derive(Debug)]
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    /// Open (without creating) the CSV file at `path`
    ///
    /// The file is read once here so a corrupt store is reported before any
    /// exchange request is made.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let store = CsvStore {
            path: path.as_ref().to_path_buf(),
        };
        read_records(&store.path)?;
        Ok(store)
    }
}

impl RecordStore for CsvStore {
    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&mut self) -> StorageResult<Vec<AccountRecord>> {
        read_records(&self.path)
    }

    fn append(&mut self, records: &[AccountRecord]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        // Existing rows are written back exactly as read
        let mut table = read_records(&self.path)?;
        table.extend(records.iter().cloned());
        sort_chronologically(&mut table);

        write_csv_atomic(&self.path, &table)?;
        debug!(
            "Appended {} rows to {} ({} total)",
            records.len(),
            self.path.display(),
            table.len()
        );
        Ok(())
    }
}

/// Read every row of a CSV store. A missing or empty file is an empty store.
pub(crate) fn read_records(path: &Path) -> StorageResult<Vec<AccountRecord>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(path, e)),
    };

    let mut reader = csv::Reader::from_reader(file);
    let headers = reader.headers().map_err(|e| corrupt(path, e))?.clone();
    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for row in reader.deserialize::<AccountRecord>() {
        records.push(row.map_err(|e| corrupt(path, e))?);
    }
    Ok(records)
}

/// Write `records` to `path` through a synced temporary file and a rename
pub(crate) fn write_csv_atomic(path: &Path, records: &[AccountRecord]) -> StorageResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
    }

    let tmp = temp_path(path);
    let result = write_and_sync(&tmp, records)
        .and_then(|_| fs::rename(&tmp, path).map_err(|e| StorageError::io(path, e)));

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_and_sync(tmp: &Path, records: &[AccountRecord]) -> StorageResult<()> {
    let file = File::create(tmp).map_err(|e| StorageError::io(tmp, e))?;
    let mut writer = csv::Writer::from_writer(file);

    if records.is_empty() {
        writer.write_record(COLUMNS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }

    let file = writer
        .into_inner()
        .map_err(|e| StorageError::io(tmp, e.into_error()))?;
    file.sync_all().map_err(|e| StorageError::io(tmp, e))
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "records.csv".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

fn corrupt(path: &Path, err: csv::Error) -> StorageError {
    StorageError::Corrupt {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
