//! In-memory ledger store for testing.

use std::sync::Mutex;

use anyhow::Result;

use super::LedgerStore;
use crate::models::{BalanceRecord, Currency, NewBalanceRecord, RecordId, Source};

#[derive(Debug, Default)]
pub struct MemoryLedger {
    rows: Mutex<Vec<BalanceRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedger {
    fn latest(
        &self,
        source: Source,
        currency: Currency,
        limit: Option<usize>,
    ) -> Result<Vec<BalanceRecord>> {
        let rows = self.rows.lock().expect("ledger lock poisoned");
        let mut series: Vec<BalanceRecord> = rows
            .iter()
            .filter(|r| r.source == source && r.currency == currency)
            .cloned()
            .collect();
        series.sort_by(|a, b| (b.epoch, b.sequence).cmp(&(a.epoch, a.sequence)));
        if let Some(limit) = limit {
            series.truncate(limit);
        }
        Ok(series)
    }

    fn insert(&self, record: NewBalanceRecord) -> Result<BalanceRecord> {
        let mut rows = self.rows.lock().expect("ledger lock poisoned");
        let id = RecordId(rows.len() as i64 + 1);
        let record = record.with_id(id);
        rows.push(record.clone());
        Ok(record)
    }
}
