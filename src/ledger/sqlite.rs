//! SQLite ledger store.
//!
//! The `unpaid` table layout is read by external tools, so column names and
//! encodings are part of the interface: `work`/`step` hold epoch/sequence,
//! `timestamp` is `YYYY-MM-DD HH:MM:SS` local time, amounts are decimal text.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;

use super::LedgerStore;
use crate::models::{
    BalanceRecord, Currency, NewBalanceRecord, RecordId, Source, TIMESTAMP_FORMAT,
};

pub struct SqliteLedger {
    conn: Connection,
}

/// Raw column values before conversion to domain types.
struct RawRow {
    id: i64,
    source: String,
    currency: String,
    work: i64,
    step: i64,
    timestamp: String,
    value: String,
    usd: String,
}

impl RawRow {
    fn into_record(self) -> Result<BalanceRecord> {
        Ok(BalanceRecord {
            id: RecordId(self.id),
            source: Source::from_str(&self.source)?,
            currency: Currency::from_str(&self.currency)?,
            epoch: self.work,
            sequence: self.step,
            timestamp: NaiveDateTime::parse_from_str(&self.timestamp, TIMESTAMP_FORMAT)
                .with_context(|| format!("Invalid ledger timestamp: {}", self.timestamp))?,
            value: Decimal::from_str(&self.value)
                .with_context(|| format!("Invalid ledger value: {}", self.value))?,
            usd: Decimal::from_str(&self.usd)
                .with_context(|| format!("Invalid ledger usd: {}", self.usd))?,
        })
    }
}

impl SqliteLedger {
    /// Open (creating if needed) the ledger database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create ledger dir: {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open ledger: {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn setup_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS unpaid (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            currency TEXT NOT NULL,
            work INTEGER NOT NULL,
            step INTEGER NOT NULL,
            timestamp TEXT NOT NULL,
            value TEXT NOT NULL,
            usd TEXT NOT NULL
        )",
        [],
    )
    .context("Failed to create unpaid table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_unpaid_series ON unpaid(source, currency, work, step)",
        [],
    )
    .context("Failed to create unpaid index")?;

    Ok(())
}

impl LedgerStore for SqliteLedger {
    fn latest(
        &self,
        source: Source,
        currency: Currency,
        limit: Option<usize>,
    ) -> Result<Vec<BalanceRecord>> {
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let mut stmt = self.conn.prepare(
            "SELECT id, source, currency, work, step, timestamp, value, usd
             FROM unpaid
             WHERE source = ?1 AND currency = ?2
             ORDER BY work DESC, step DESC
             LIMIT ?3",
        )?;

        let rows = stmt
            .query_map(params![source.as_str(), currency.as_str(), limit], |row| {
                Ok(RawRow {
                    id: row.get(0)?,
                    source: row.get(1)?,
                    currency: row.get(2)?,
                    work: row.get(3)?,
                    step: row.get(4)?,
                    timestamp: row.get(5)?,
                    value: row.get(6)?,
                    usd: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read ledger rows")?;

        rows.into_iter().map(RawRow::into_record).collect()
    }

    fn insert(&self, record: NewBalanceRecord) -> Result<BalanceRecord> {
        self.conn
            .execute(
                "INSERT INTO unpaid (source, currency, work, step, timestamp, value, usd)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.source.as_str(),
                    record.currency.as_str(),
                    record.epoch,
                    record.sequence,
                    record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    record.value.to_string(),
                    record.usd.to_string(),
                ],
            )
            .context("Failed to insert ledger row")?;

        let id = RecordId(self.conn.last_insert_rowid());
        Ok(record.with_id(id))
    }
}
