//! SQLite record store
//!
//! One `account_records` row per record, keyed by the record ID. Appends run
//! in a single transaction with `INSERT OR IGNORE`, so a failed append leaves
//! the table untouched and a repeated ID never replaces the stored row.

use chrono::DateTime;
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use super::RecordStore;
use crate::error::{StorageError, StorageResult};
use crate::types::{AccountRecord, RecordKind, Side};

pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;

        let store = SqliteStore {
            conn,
            path: path.to_path_buf(),
        };
        store.create_tables()?;
        info!("SQLite record store opened at {}", path.display());
        Ok(store)
    }

    fn create_tables(&self) -> StorageResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS account_records (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                time_ms INTEGER NOT NULL,
                asset TEXT NOT NULL,
                amount TEXT NOT NULL,
                symbol TEXT,
                side TEXT,
                buy_currency TEXT,
                buy_amount TEXT,
                sell_currency TEXT,
                sell_amount TEXT,
                fee_currency TEXT,
                fee_amount TEXT,
                exchange TEXT NOT NULL,
                comment TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_account_records_time
                ON account_records(time_ms);",
        )?;
        Ok(())
    }

    fn parse_row(&self, row: &Row<'_>) -> StorageResult<AccountRecord> {
        let id: String = row.get("id")?;
        let kind: String = row.get("kind")?;
        let time_ms: i64 = row.get("time_ms")?;
        let side: Option<String> = row.get("side")?;

        let bad = |reason: String| StorageError::Corrupt {
            path: self.path.clone(),
            reason: format!("row {}: {}", id, reason),
        };

        let kind = RecordKind::from_str(&kind).map_err(bad)?;
        let time = DateTime::from_timestamp_millis(time_ms)
            .ok_or_else(|| bad(format!("time {} out of range", time_ms)))?;
        let side = match side.as_deref() {
            None => None,
            Some("BUY") => Some(Side::Buy),
            Some("SELL") => Some(Side::Sell),
            Some(other) => return Err(bad(format!("unknown side {}", other))),
        };

        let decimal = |column: &str| -> StorageResult<Option<Decimal>> {
            let value: Option<String> = row.get(column)?;
            value
                .map(|v| {
                    Decimal::from_str(&v).map_err(|e| bad(format!("{} {:?}: {}", column, v, e)))
                })
                .transpose()
        };

        Ok(AccountRecord {
            kind,
            time,
            asset: row.get("asset")?,
            amount: decimal("amount")?.ok_or_else(|| bad("amount is NULL".to_string()))?,
            symbol: row.get("symbol")?,
            side,
            buy_currency: row.get("buy_currency")?,
            buy_amount: decimal("buy_amount")?,
            sell_currency: row.get("sell_currency")?,
            sell_amount: decimal("sell_amount")?,
            fee_currency: row.get("fee_currency")?,
            fee_amount: decimal("fee_amount")?,
            exchange: row.get("exchange")?,
            comment: row.get("comment")?,
            id,
        })
    }

    /// Number of stored rows
    pub fn count(&self) -> StorageResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM account_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl RecordStore for SqliteStore {
    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&mut self) -> StorageResult<Vec<AccountRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM account_records ORDER BY time_ms, id")?;
        let mut rows = stmt.query([])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(self.parse_row(row)?);
        }
        Ok(records)
    }

    fn append(&mut self, records: &[AccountRecord]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO account_records (
                    id, kind, time_ms, asset, amount, symbol, side,
                    buy_currency, buy_amount, sell_currency, sell_amount,
                    fee_currency, fee_amount, exchange, comment
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )?;

            for r in records {
                inserted += stmt.execute(params![
                    r.id,
                    r.kind.as_str(),
                    r.time.timestamp_millis(),
                    r.asset,
                    r.amount.to_string(),
                    r.symbol,
                    r.side.map(|s| match s {
                        Side::Buy => "BUY",
                        Side::Sell => "SELL",
                    }),
                    r.buy_currency,
                    r.buy_amount.map(|d| d.to_string()),
                    r.sell_currency,
                    r.sell_amount.map(|d| d.to_string()),
                    r.fee_currency,
                    r.fee_amount.map(|d| d.to_string()),
                    r.exchange,
                    r.comment,
                ])?;
            }
        }
        tx.commit()?;

        debug!(
            "Inserted {} of {} rows into {}",
            inserted,
            records.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn withdrawal(id: &str, ms: i64) -> AccountRecord {
        let mut record = AccountRecord::new(
            id,
            RecordKind::Withdrawal,
            DateTime::from_timestamp_millis(ms).unwrap(),
            "USDT",
            dec!(100.50),
        );
        record.fee_currency = Some("USDT".to_string());
        record.fee_amount = Some(dec!(1));
        record.comment = "TRX tx abc".to_string();
        record
    }

    #[test]
    fn test_append_and_load_in_time_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");

        let mut store = SqliteStore::open(&path).unwrap();
        store
            .append(&[withdrawal("withdrawal:b", 2_000), withdrawal("withdrawal:a", 1_000)])
            .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], withdrawal("withdrawal:a", 1_000));
        assert_eq!(loaded[1].fee_amount, Some(dec!(1)));
    }

    #[test]
    fn test_existing_row_is_never_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SqliteStore::open(dir.path().join("history.sqlite")).unwrap();

        store.append(&[withdrawal("withdrawal:a", 1_000)]).unwrap();
        let mut changed = withdrawal("withdrawal:a", 1_000);
        changed.amount = dec!(999);
        store.append(&[changed]).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.load().unwrap()[0].amount, dec!(100.50));
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("history.db");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.append(&[withdrawal("withdrawal:a", 1_000)]).unwrap();
        }
        let mut store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.load().unwrap().len(), 1);
    }
}
