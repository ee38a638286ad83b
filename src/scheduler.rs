//! Poll loop: providers feed the ledger, the ledger feeds the presenter, and
//! the loop sleeps until the next payout boundary.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Timelike};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::ledger::{Ledger, LedgerStore};
use crate::models::{AppendOutcome, BalanceRecord, Headline, Source};
use crate::providers::BalanceProvider;
use crate::report::{Goal, Notifier, Presenter, SeriesTable, TABLE_FRAME_LINES};

/// Payouts are posted every four hours, one minute past the hour.
pub const PAYOUT_INTERVAL_HOURS: i64 = 4;
const PAYOUT_MINUTE: u32 = 1;

/// Smallest usable screen height for a bounded window.
const MIN_SCREEN_LINES: usize = 3;

/// What a run does after its first poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Print the latest USD figures and stop.
    BigNumberOnly,
    /// Print the ids written by one cycle and stop.
    UpdateOnly,
    /// Render tables; repeat until cancelled unless the run is one-shot.
    Report,
}

impl RunMode {
    /// Headline wins over update-only when both are asked for.
    pub fn from_flags(only_big: bool, only_update: bool) -> Self {
        if only_big {
            RunMode::BigNumberOnly
        } else if only_update {
            RunMode::UpdateOnly
        } else {
            RunMode::Report
        }
    }
}

/// How a run ended. Both count as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub mode: RunMode,
    /// Row budget per table. `None` sizes tables to the screen, `Some(0)`
    /// shows the whole history.
    pub records: Option<usize>,
    /// Screen height used when `records` is `None`.
    pub terminal_lines: usize,
    pub save_dir: Option<PathBuf>,
    pub goals: BTreeMap<Source, Goal>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::Report,
            records: None,
            terminal_lines: 24,
            save_dir: None,
            goals: BTreeMap::new(),
        }
    }
}

/// State of one report cycle. Only `next_update` survives into the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollContext {
    /// Rows requested per source.
    pub budgets: BTreeMap<Source, usize>,
    /// Rows left per source after reserving date and summary lines.
    pub trimmed: BTreeMap<Source, usize>,
    pub lines_remaining: usize,
    pub last_records: BTreeMap<Source, BalanceRecord>,
    pub next_update: Option<NaiveDateTime>,
}

impl PollContext {
    /// Fresh context for the cycle after `self`.
    pub fn next_cycle(&self) -> Self {
        Self {
            next_update: self.next_update,
            ..Self::default()
        }
    }
}

/// Four hours after `last` (or `now` when nothing was processed), snapped to
/// minute 1, second 0.
pub fn project_next_update(last: Option<NaiveDateTime>, now: NaiveDateTime) -> NaiveDateTime {
    let projected = last.unwrap_or(now) + chrono::Duration::hours(PAYOUT_INTERVAL_HOURS);
    projected
        .with_minute(PAYOUT_MINUTE)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(projected)
}

/// Time left until `next`. Zero when it already passed.
pub fn wait_until(next: NaiveDateTime, now: NaiveDateTime) -> Duration {
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

pub struct Scheduler<S> {
    providers: Vec<Box<dyn BalanceProvider>>,
    ledger: Ledger<S>,
    presenter: Box<dyn Presenter>,
    notifier: Option<Box<dyn Notifier>>,
    clock: Arc<dyn Clock>,
    options: PollOptions,
}

impl<S: LedgerStore> Scheduler<S> {
    pub fn new(
        providers: Vec<Box<dyn BalanceProvider>>,
        ledger: Ledger<S>,
        presenter: Box<dyn Presenter>,
        options: PollOptions,
    ) -> Self {
        Self {
            providers,
            ledger,
            presenter,
            notifier: None,
            clock: Arc::new(SystemClock),
            options,
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    fn sources(&self) -> Vec<Source> {
        self.providers.iter().map(|p| p.source()).collect()
    }

    /// A report run stops after one cycle when it shows the whole history,
    /// writes a snapshot or sends mail.
    pub fn is_one_shot(&self) -> bool {
        self.options.records == Some(0)
            || self.options.save_dir.is_some()
            || self.notifier.is_some()
    }

    /// Rows requested per table.
    pub fn row_budget(&self) -> usize {
        match self.options.records {
            Some(records) => records,
            None => {
                let mut lines = self.options.terminal_lines;
                if self.providers.len() > 1 {
                    lines /= 2;
                }
                lines.saturating_sub(TABLE_FRAME_LINES).max(1)
            }
        }
    }

    fn screen_too_small(&self) -> bool {
        self.options.records != Some(0)
            && self.options.terminal_lines.saturating_sub(1) < MIN_SCREEN_LINES
    }

    /// Ask every provider for a balance, in order, and append each reading.
    ///
    /// Provider errors stop the cycle and propagate unchanged.
    pub async fn poll_cycle(&mut self) -> Result<BTreeMap<Source, AppendOutcome>> {
        let mut outcomes = BTreeMap::new();

        for provider in self.providers.iter_mut() {
            let source = provider.source();

            let status = provider
                .authenticate()
                .await
                .with_context(|| format!("Authenticating with {source}"))?;
            if !status.is_authenticated() {
                warn!(%source, "Not authenticated, recording sentinel balance");
            }

            let reading = provider
                .fetch_balance()
                .await
                .with_context(|| format!("Fetching {source} balance"))?;
            let (value, usd) = reading.amounts();

            let outcome = self.ledger.append(source, source.currency(), value, usd)?;
            info!(%source, %value, %usd, record_id = %outcome, "Balance polled");
            outcomes.insert(source, outcome);
        }

        Ok(outcomes)
    }

    /// Latest USD figure per polled series.
    pub fn headlines(&self) -> Result<Vec<Headline>> {
        let mut headlines = Vec::new();
        for source in self.sources() {
            if let Some(headline) = self.ledger.headline(source, source.currency())? {
                headlines.push(headline);
            }
        }
        Ok(headlines)
    }

    /// Render one table per source and project the next update from the
    /// newest row shown.
    pub fn report(&mut self, previous: &PollContext) -> Result<PollContext> {
        let mut ctx = previous.next_cycle();
        ctx.lines_remaining = self.options.terminal_lines.saturating_sub(1);
        let budget = self.row_budget();
        let now = self.clock.now();
        self.presenter.start_report()?;

        for source in self.sources() {
            let currency = source.currency();
            ctx.budgets.insert(source, budget);

            let window = self.ledger.window(budget, source, currency)?;
            debug!(%source, requested = budget, effective = window.effective_count, "Window selected");
            ctx.trimmed.insert(source, window.effective_count);

            let used = self.presenter.table(&SeriesTable {
                source,
                currency,
                records: &window.records,
                goal: self.options.goals.get(&source).copied().unwrap_or_default(),
                rendered_at: now,
            })?;
            ctx.lines_remaining = ctx.lines_remaining.saturating_sub(used);

            if let Some(newest) = window.records.first() {
                ctx.next_update = Some(project_next_update(Some(newest.timestamp), now));
                ctx.last_records.insert(source, newest.clone());
            }
        }

        if self.options.records != Some(0) {
            self.presenter.pad(ctx.lines_remaining)?;
        }
        Ok(ctx)
    }

    /// Snapshot and mail, when asked for.
    fn deliver(&mut self) -> Result<()> {
        let dir = match (&self.options.save_dir, &self.notifier) {
            (Some(dir), _) => dir.clone(),
            (None, Some(_)) => std::env::temp_dir(),
            (None, None) => return Ok(()),
        };

        let snapshot = self.presenter.snapshot(&dir)?;
        info!(path = %snapshot.display(), "Snapshot written");

        if let Some(notifier) = &self.notifier {
            let headlines = self.headlines()?;
            notifier.notify(&headlines, &snapshot)?;
        }
        Ok(())
    }

    /// Drive the selected run mode. `cancel` is only observed while waiting
    /// for the next update; when it resolves the run ends cleanly.
    pub async fn run<F>(&mut self, cancel: F) -> Result<RunOutcome>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        let mut ctx = PollContext::default();

        loop {
            let outcomes = self.poll_cycle().await?;

            match self.options.mode {
                RunMode::BigNumberOnly => {
                    let headlines = self.headlines()?;
                    self.presenter.headline(&headlines)?;
                    return Ok(RunOutcome::Completed);
                }
                RunMode::UpdateOnly => {
                    self.presenter.update_batch(self.clock.now(), &outcomes)?;
                    return Ok(RunOutcome::Completed);
                }
                RunMode::Report => {}
            }

            if self.screen_too_small() {
                self.presenter.notice("Too small to show")?;
                return Ok(RunOutcome::Completed);
            }

            ctx = self.report(&ctx)?;
            self.deliver()?;

            if self.is_one_shot() {
                return Ok(RunOutcome::Completed);
            }

            let now = self.clock.now();
            let next = ctx
                .next_update
                .unwrap_or_else(|| project_next_update(None, now));
            let wait = wait_until(next, now);
            info!(next_update = %next, wait_secs = wait.as_secs(), "Waiting for next payout update");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = &mut cancel => {
                    info!("Cancelled, stopping");
                    return Ok(RunOutcome::Cancelled);
                }
            }
        }
    }
}
