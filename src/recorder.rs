//! Deduplicating recorder on top of a record store
//!
//! The recorder keeps the stored records in memory so every batch can be
//! checked against the known IDs before anything touches the disk.

use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::error::StorageResult;
use crate::store::{self, RecordStore};
use crate::types::{AccountRecord, HistoryCursor, RecordKind};

/// Outcome of one [`Recorder::record`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordSummary {
    pub received: usize,
    pub inserted: usize,
    pub duplicates: usize,
}

pub struct Recorder {
    store: Box<dyn RecordStore>,
    records: Vec<AccountRecord>,
    ids: HashSet<String>,
}

impl Recorder {
    /// Open the store at `path`; the back-end follows the file extension
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::with_store(store::open_store(path)?)
    }

    pub fn with_store(mut store: Box<dyn RecordStore>) -> StorageResult<Self> {
        let records = store.load()?;
        let ids = records.iter().map(|r| r.id.clone()).collect::<HashSet<_>>();
        info!(
            "Loaded {} stored records from {}",
            records.len(),
            store.path().display()
        );
        Ok(Recorder {
            store,
            records,
            ids,
        })
    }

    /// Store the records of `batch` whose IDs are not yet known
    ///
    /// New records are sorted by time and ID and appended in one durable
    /// write. If the write fails nothing is recorded, in memory or on disk.
    pub fn record(&mut self, batch: Vec<AccountRecord>) -> StorageResult<RecordSummary> {
        let received = batch.len();
        let mut seen = HashSet::new();
        let mut fresh: Vec<AccountRecord> = batch
            .into_iter()
            .filter(|r| !self.ids.contains(&r.id) && seen.insert(r.id.clone()))
            .collect();
        store::sort_chronologically(&mut fresh);

        let summary = RecordSummary {
            received,
            inserted: fresh.len(),
            duplicates: received - fresh.len(),
        };

        if fresh.is_empty() {
            debug!("No new records in batch of {}", received);
            return Ok(summary);
        }

        self.store.append(&fresh)?;

        self.ids.extend(fresh.iter().map(|r| r.id.clone()));
        self.records.extend(fresh);
        store::sort_chronologically(&mut self.records);

        info!(
            "Recorded {} new records ({} duplicates skipped)",
            summary.inserted, summary.duplicates
        );
        Ok(summary)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Stored records, oldest first
    pub fn records(&self) -> &[AccountRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count_by_kind(&self, kind: RecordKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Resume positions for the next fetch
    pub fn cursor(&self) -> HistoryCursor {
        HistoryCursor::from_records(&self.records)
    }

    /// Write every stored record, oldest first, to a CSV file at `path`
    pub fn export_csv(&self, path: impl AsRef<Path>) -> StorageResult<usize> {
        let path = path.as_ref();
        store::write_csv_atomic(path, &self.records)?;
        info!("Exported {} records to {}", self.records.len(), path.display());
        Ok(self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use chrono::DateTime;
    use rust_decimal_macros::dec;
    use std::path::PathBuf;

    fn deposit(id: &str, ms: i64) -> AccountRecord {
        AccountRecord::new(
            id,
            RecordKind::Deposit,
            DateTime::from_timestamp_millis(ms).unwrap(),
            "BTC",
            dec!(0.1),
        )
    }

    /// Store whose appends always fail
    struct ReadOnlyStore {
        path: PathBuf,
    }

    impl RecordStore for ReadOnlyStore {
        fn path(&self) -> &Path {
            &self.path
        }

        fn load(&mut self) -> StorageResult<Vec<AccountRecord>> {
            Ok(vec![deposit("deposit:old", 1)])
        }

        fn append(&mut self, _records: &[AccountRecord]) -> StorageResult<()> {
            Err(StorageError::io(
                &self.path,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            ))
        }
    }

    #[test]
    fn test_dedup_against_store_and_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let mut recorder = Recorder::open(&path).unwrap();

        let first = recorder
            .record(vec![deposit("deposit:1", 10), deposit("deposit:2", 20)])
            .unwrap();
        assert_eq!(first.inserted, 2);

        let second = recorder
            .record(vec![
                deposit("deposit:2", 20),
                deposit("deposit:3", 5),
                deposit("deposit:3", 5),
            ])
            .unwrap();
        assert_eq!(
            second,
            RecordSummary {
                received: 3,
                inserted: 1,
                duplicates: 2
            }
        );

        let reopened = Recorder::open(&path).unwrap();
        let ids: Vec<&str> = reopened.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["deposit:3", "deposit:1", "deposit:2"]);
    }

    #[test]
    fn test_failed_append_records_nothing() {
        let store = Box::new(ReadOnlyStore {
            path: PathBuf::from("ro.csv"),
        });
        let mut recorder = Recorder::with_store(store).unwrap();

        let result = recorder.record(vec![deposit("deposit:new", 50)]);
        assert!(matches!(result, Err(StorageError::Io { .. })));
        assert_eq!(recorder.len(), 1);
        assert!(!recorder.contains("deposit:new"));
    }

    #[test]
    fn test_export_writes_sorted_copy() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::open(dir.path().join("history.db")).unwrap();
        recorder
            .record(vec![deposit("deposit:b", 200), deposit("deposit:a", 100)])
            .unwrap();

        let out = dir.path().join("export.csv");
        assert_eq!(recorder.export_csv(&out).unwrap(), 2);

        let exported = Recorder::open(&out).unwrap();
        assert_eq!(exported.records(), recorder.records());
        assert_eq!(exported.count_by_kind(RecordKind::Deposit), 2);
    }
}
