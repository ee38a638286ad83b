//! Output side of a poll cycle: console tables, the headline numbers, the
//! snapshot file and the outbound mail.
//!
//! The scheduler only hands data to a [`Presenter`] and a [`Notifier`]; how
//! it looks is up to the implementation.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::models::{AppendOutcome, BalanceRecord, Currency, Headline, Source, TIMESTAMP_FORMAT};

/// File name of the snapshot written to the output directory.
pub const SNAPSHOT_FILE: &str = "miner_preview.txt";

/// Lines a table spends outside its data and separator rows: title, column
/// header, header rule and the summary row.
pub const TABLE_FRAME_LINES: usize = 4;

/// Optional payout targets shown in the summary row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Goal {
    pub usd: Option<Decimal>,
    pub coin: Option<Decimal>,
}

/// One series ready to be drawn.
#[derive(Debug, Clone)]
pub struct SeriesTable<'a> {
    pub source: Source,
    pub currency: Currency,
    /// Newest first, as returned by the ledger.
    pub records: &'a [BalanceRecord],
    pub goal: Goal,
    pub rendered_at: NaiveDateTime,
}

pub trait Presenter {
    /// A new set of tables begins; earlier output is no longer part of the
    /// snapshot.
    fn start_report(&mut self) -> Result<()>;

    /// Big-number view: latest USD per series.
    fn headline(&mut self, headlines: &[Headline]) -> Result<()>;

    /// Draw a table and return how many terminal lines it used.
    fn table(&mut self, table: &SeriesTable<'_>) -> Result<usize>;

    /// Fill the rest of the screen.
    fn pad(&mut self, lines: usize) -> Result<()>;

    /// Identifiers produced by an update-only run.
    fn update_batch(
        &mut self,
        at: NaiveDateTime,
        outcomes: &BTreeMap<Source, AppendOutcome>,
    ) -> Result<()>;

    fn notice(&mut self, message: &str) -> Result<()>;

    /// Persist everything rendered so far into `dir`.
    fn snapshot(&mut self, dir: &Path) -> Result<PathBuf>;
}

pub trait Notifier {
    fn notify(&self, headlines: &[Headline], snapshot: &Path) -> Result<()>;
}

fn signed(value: Decimal) -> String {
    if value.is_sign_negative() {
        format!("{value}")
    } else {
        format!("+{value}")
    }
}

/// Percentage of `goal` reached by `amount`, one decimal.
pub fn goal_percent(amount: Decimal, goal: Decimal) -> Option<Decimal> {
    if goal.is_zero() {
        return None;
    }
    Some((amount * Decimal::ONE_HUNDRED / goal).round_dp(1))
}

/// Mail subject built from the headline numbers.
pub fn mail_subject(headlines: &[Headline]) -> String {
    let mut subject = String::from("minerwatch");
    for headline in headlines {
        let tag = match headline.source {
            Source::Ethermine => "E",
            Source::CloudAtCost => "B",
        };
        let _ = write!(subject, " {tag}: {}", headline.usd.round_dp(2));
    }
    subject
}

/// Render a series as plain text lines, oldest row first.
///
/// A date row opens the table and follows every change of calendar date;
/// the last line is the summary.
pub fn render_table(table: &SeriesTable<'_>) -> Vec<String> {
    let mut lines = Vec::new();
    let currency = table.currency.as_str().to_uppercase();

    lines.push(format!(
        "{} {}@{}",
        table.source,
        currency,
        table.rendered_at.format(TIMESTAMP_FORMAT)
    ));
    lines.push(format!(
        "{:>7}  {:>8}  {:>14}  {:>10}  {:>9}",
        "#", "time", currency, "USD", "delta"
    ));
    lines.push("-".repeat(56));

    let mut previous: Option<&BalanceRecord> = None;
    for record in table.records.iter().rev() {
        let new_day = previous.map_or(true, |p| p.timestamp.date() != record.timestamp.date());
        if new_day {
            lines.push(format!("== {} ==", record.timestamp.format("%Y-%m-%d")));
        }
        let delta = previous.map(|p| record.usd - p.usd).unwrap_or(Decimal::ZERO);
        lines.push(format!(
            "{:>7}  {:>8}  {:>14}  {:>10}  {:>9}",
            format!("{}.{}", record.epoch, record.sequence),
            record.timestamp.format("%H:%M:%S").to_string(),
            record.value.to_string(),
            record.usd.round_dp(2).to_string(),
            signed(delta.round_dp(2)),
        ));
        previous = Some(record);
    }

    lines.push(summary_line(table));
    lines
}

fn summary_line(table: &SeriesTable<'_>) -> String {
    let (Some(newest), Some(oldest)) = (table.records.first(), table.records.last()) else {
        return "no records yet".to_string();
    };

    let mut summary = format!(
        "{} {} = {} USD ({} USD in window)",
        newest.value,
        table.currency.as_str().to_uppercase(),
        newest.usd.round_dp(2),
        signed((newest.usd - oldest.usd).round_dp(2)),
    );
    if let Some(pct) = table.goal.usd.and_then(|goal| goal_percent(newest.usd, goal)) {
        let _ = write!(summary, " | goal {pct}% USD");
    }
    if let Some(pct) = table.goal.coin.and_then(|goal| goal_percent(newest.value, goal)) {
        let _ = write!(
            summary,
            " | goal {pct}% {}",
            table.currency.as_str().to_uppercase()
        );
    }
    summary
}

/// Plain text presenter. Everything written is also kept for the snapshot.
pub struct ConsolePresenter<W: Write> {
    out: W,
    recorded: String,
}

impl ConsolePresenter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ConsolePresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            recorded: String::new(),
        }
    }

    pub fn recorded(&self) -> &str {
        &self.recorded
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "{line}").context("Failed to write report output")?;
        self.recorded.push_str(line);
        self.recorded.push('\n');
        Ok(())
    }
}

impl<W: Write> Presenter for ConsolePresenter<W> {
    fn start_report(&mut self) -> Result<()> {
        self.recorded.clear();
        Ok(())
    }

    fn headline(&mut self, headlines: &[Headline]) -> Result<()> {
        let line = headlines
            .iter()
            .map(|h| {
                format!(
                    "{} ${} {}",
                    h.currency.as_str().to_uppercase(),
                    h.usd.round_dp(2),
                    h.trend.symbol()
                )
            })
            .collect::<Vec<_>>()
            .join("   ");
        self.line(&line)
    }

    fn table(&mut self, table: &SeriesTable<'_>) -> Result<usize> {
        let lines = render_table(table);
        for line in &lines {
            self.line(line)?;
        }
        Ok(lines.len())
    }

    fn pad(&mut self, lines: usize) -> Result<()> {
        for _ in 0..lines {
            self.line("")?;
        }
        Ok(())
    }

    fn update_batch(
        &mut self,
        at: NaiveDateTime,
        outcomes: &BTreeMap<Source, AppendOutcome>,
    ) -> Result<()> {
        let ids = outcomes
            .iter()
            .map(|(source, outcome)| format!("{source}: {outcome}"))
            .collect::<Vec<_>>()
            .join(", ");
        self.line(&format!("{} => {{{ids}}}", at.format(TIMESTAMP_FORMAT)))
    }

    fn notice(&mut self, message: &str) -> Result<()> {
        self.line(message)
    }

    fn snapshot(&mut self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output dir: {}", dir.display()))?;
        let path = dir.join(SNAPSHOT_FILE);
        std::fs::write(&path, &self.recorded)
            .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
        Ok(path)
    }
}

/// Sends the snapshot through a sendmail-compatible command.
#[derive(Debug, Clone)]
pub struct SendmailNotifier {
    command: String,
    from: String,
    to: String,
}

impl SendmailNotifier {
    pub fn new(command: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    /// RFC 822 message with the snapshot text as body.
    pub fn message(&self, headlines: &[Headline], body: &str) -> String {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}",
            self.from,
            self.to,
            mail_subject(headlines),
            body
        )
    }
}

impl Notifier for SendmailNotifier {
    fn notify(&self, headlines: &[Headline], snapshot: &Path) -> Result<()> {
        let body = std::fs::read_to_string(snapshot)
            .with_context(|| format!("Failed to read snapshot: {}", snapshot.display()))?;
        let message = self.message(headlines, &body);

        let mut parts = self.command.split_whitespace();
        let program = parts.next().context("Mail command is empty")?;
        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to run mail command: {}", self.command))?;

        child
            .stdin
            .take()
            .context("Mail command has no stdin")?
            .write_all(message.as_bytes())
            .context("Failed to pipe message to mail command")?;

        let status = child.wait().context("Failed to wait for mail command")?;
        if !status.success() {
            anyhow::bail!("Mail command failed ({status}): {}", self.command);
        }
        tracing::info!(to = %self.to, "Report mailed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecordId, Trend};
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 5, day)
            .and_then(|d| d.and_hms_opt(hour, 1, 0))
            .unwrap()
    }

    fn record(id: i64, sequence: i64, stamp: NaiveDateTime, value: &str, usd: &str) -> BalanceRecord {
        BalanceRecord {
            id: RecordId(id),
            source: Source::CloudAtCost,
            currency: Currency::Btc,
            epoch: 1,
            sequence,
            timestamp: stamp,
            value: value.parse().unwrap(),
            usd: usd.parse().unwrap(),
        }
    }

    fn sample() -> Vec<BalanceRecord> {
        // Newest first.
        vec![
            record(3, 3, at(7, 2), "0.0030", "120.00"),
            record(2, 2, at(6, 22), "0.0020", "80.00"),
            record(1, 1, at(6, 18), "0.0010", "40.00"),
        ]
    }

    #[test]
    fn table_has_date_rows_and_summary() {
        let records = sample();
        let table = SeriesTable {
            source: Source::CloudAtCost,
            currency: Currency::Btc,
            records: &records,
            goal: Goal {
                usd: Some(Decimal::from(1200)),
                coin: None,
            },
            rendered_at: at(7, 3),
        };
        let lines = render_table(&table);

        // 3 rows + 2 date rows + frame.
        assert_eq!(lines.len(), 3 + 2 + TABLE_FRAME_LINES);
        assert_eq!(lines[3], "== 2022-05-06 ==");
        assert!(lines[4].contains("1.1"));
        assert!(lines.iter().any(|l| l == "== 2022-05-07 =="));
        let summary = lines.last().unwrap();
        assert!(summary.contains("+80.00 USD in window"), "{summary}");
        assert!(summary.contains("| goal 10"), "{summary}");
    }

    #[test]
    fn empty_table_still_has_frame() {
        let table = SeriesTable {
            source: Source::Ethermine,
            currency: Currency::Eth,
            records: &[],
            goal: Goal::default(),
            rendered_at: at(7, 3),
        };
        assert_eq!(render_table(&table).len(), TABLE_FRAME_LINES);
    }

    #[test]
    fn console_records_for_snapshot() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let mut presenter = ConsolePresenter::new(Vec::new());
        let records = sample();
        let used = presenter.table(&SeriesTable {
            source: Source::CloudAtCost,
            currency: Currency::Btc,
            records: &records,
            goal: Goal::default(),
            rendered_at: at(7, 3),
        })?;
        presenter.pad(2)?;

        let path = presenter.snapshot(dir.path())?;
        let written = std::fs::read_to_string(&path)?;
        assert_eq!(written, presenter.recorded());
        assert_eq!(written.lines().count(), used + 2);

        let stdout = String::from_utf8(presenter.into_inner())?;
        assert_eq!(stdout, written);
        Ok(())
    }

    #[test]
    fn start_report_resets_snapshot_text() -> Result<()> {
        let mut presenter = ConsolePresenter::new(Vec::new());
        presenter.notice("first cycle")?;
        presenter.start_report()?;
        presenter.notice("second cycle")?;

        assert_eq!(presenter.recorded(), "second cycle\n");
        let stdout = String::from_utf8(presenter.into_inner())?;
        assert_eq!(stdout, "first cycle\nsecond cycle\n");
        Ok(())
    }

    #[test]
    fn update_batch_lists_ids_and_zero_for_no_change() -> Result<()> {
        let mut presenter = ConsolePresenter::new(Vec::new());
        let mut outcomes = BTreeMap::new();
        outcomes.insert(Source::CloudAtCost, AppendOutcome::Inserted(RecordId(7)));
        outcomes.insert(Source::Ethermine, AppendOutcome::NoChange);
        presenter.update_batch(at(7, 3), &outcomes)?;

        assert_eq!(
            presenter.recorded(),
            "2022-05-07 03:01:00 => {cloudatcost: 7, ethermine: 0}\n"
        );
        Ok(())
    }

    #[test]
    fn subject_and_message_carry_headlines() {
        let headlines = vec![
            Headline {
                source: Source::Ethermine,
                currency: Currency::Eth,
                usd: "41.5".parse().unwrap(),
                trend: Trend::Up,
            },
            Headline {
                source: Source::CloudAtCost,
                currency: Currency::Btc,
                usd: "12".parse().unwrap(),
                trend: Trend::Flat,
            },
        ];
        assert_eq!(mail_subject(&headlines), "minerwatch E: 41.5 B: 12");

        let notifier = SendmailNotifier::new("sendmail -t", "from@example.com", "to@example.com");
        let message = notifier.message(&headlines, "body");
        assert!(message.starts_with("From: from@example.com\r\nTo: to@example.com\r\n"));
        assert!(message.ends_with("\r\n\r\nbody"));
    }

    #[test]
    fn goal_percent_ignores_zero_goal() {
        assert_eq!(goal_percent(Decimal::from(5), Decimal::ZERO), None);
        assert_eq!(
            goal_percent(Decimal::from(1), Decimal::from(3)),
            Some("33.3".parse().unwrap())
        );
    }
}
