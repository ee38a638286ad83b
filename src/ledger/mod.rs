//! Append-only, deduplicating ledger of observed balances.
//!
//! Rows for one `(source, currency)` series are ordered by
//! `(epoch desc, sequence desc)`, which is also newest-first. A row is only
//! written when its value differs from the newest stored one.

mod memory;
mod sqlite;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;

use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::models::{
    AppendOutcome, BalanceRecord, Currency, Headline, NewBalanceRecord, Source, Trend,
};

/// Row storage behind a [`Ledger`].
pub trait LedgerStore {
    /// Most recent rows of a series, newest first. `None` returns all rows.
    fn latest(
        &self,
        source: Source,
        currency: Currency,
        limit: Option<usize>,
    ) -> Result<Vec<BalanceRecord>>;

    /// Persist a row and return it with its assigned id.
    fn insert(&self, record: NewBalanceRecord) -> Result<BalanceRecord>;
}

/// Rows selected for display, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    /// Row budget after reserving room for date separators and the summary
    /// line. Zero when the whole history was requested.
    pub effective_count: usize,
    pub records: Vec<BalanceRecord>,
}

/// Number of calendar-date changes between consecutive rows.
///
/// Takes rows newest first, as returned by [`LedgerStore::latest`].
pub fn day_boundaries(records: &[BalanceRecord]) -> usize {
    records
        .windows(2)
        .filter(|pair| pair[0].timestamp.date() != pair[1].timestamp.date())
        .count()
}

pub struct Ledger<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record an observation unless it repeats the newest stored value.
    ///
    /// The first row of a series starts at epoch 1, sequence 1. Later rows
    /// carry the epoch forward and take the next sequence number; a skipped
    /// duplicate consumes no sequence number.
    pub fn append(
        &self,
        source: Source,
        currency: Currency,
        value: Decimal,
        usd: Decimal,
    ) -> Result<AppendOutcome> {
        let previous = self.store.latest(source, currency, Some(1))?.into_iter().next();

        let (epoch, sequence) = match &previous {
            Some(prev) if prev.value == value => {
                debug!(%source, %currency, %value, "Balance unchanged, nothing recorded");
                return Ok(AppendOutcome::NoChange);
            }
            Some(prev) => (prev.epoch, prev.sequence + 1),
            None => (1, 1),
        };

        let record = self.store.insert(NewBalanceRecord {
            source,
            currency,
            epoch,
            sequence,
            timestamp: self.clock.now(),
            value,
            usd,
        })?;
        debug!(%source, %currency, record_id = %record.id, epoch, sequence, "Balance recorded");

        Ok(AppendOutcome::Inserted(record.id))
    }

    /// Rows to display for a vertical budget of `requested` lines.
    ///
    /// The presentation layer adds a separator line per date change and a
    /// trailing summary line, so the first pass counts date changes in the
    /// `requested` newest rows and the second pass re-reads
    /// `requested - (boundaries + 1)` rows. `requested == 0` returns the
    /// whole history untrimmed.
    pub fn window(&self, requested: usize, source: Source, currency: Currency) -> Result<Window> {
        if requested == 0 {
            return Ok(Window {
                effective_count: 0,
                records: self.store.latest(source, currency, None)?,
            });
        }

        let first_pass = self.store.latest(source, currency, Some(requested))?;
        let boundaries = day_boundaries(&first_pass);
        let effective_count = requested.saturating_sub(boundaries + 1);

        let records = self.store.latest(source, currency, Some(effective_count))?;
        Ok(Window {
            effective_count,
            records,
        })
    }

    /// Most recent `limit` rows of a series, newest first.
    pub fn latest(
        &self,
        source: Source,
        currency: Currency,
        limit: usize,
    ) -> Result<Vec<BalanceRecord>> {
        self.store.latest(source, currency, Some(limit))
    }

    /// Latest USD amount and its direction against the row before it.
    pub fn headline(&self, source: Source, currency: Currency) -> Result<Option<Headline>> {
        let rows = self.store.latest(source, currency, Some(2))?;
        let Some(newest) = rows.first() else {
            return Ok(None);
        };
        let trend = rows
            .get(1)
            .map(|older| Trend::between(older.usd, newest.usd))
            .unwrap_or(Trend::Flat);

        Ok(Some(Headline {
            source,
            currency,
            usd: newest.usd,
            trend,
        }))
    }
}
