//! Ledger row types shared by the providers, the ledger and the scheduler.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Timestamp layout used in the ledger table and in console output.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// External platform a balance was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Wallet panel behind a cookie login (SourceA).
    CloudAtCost,
    /// Mining pool API keyed by wallet address (SourceB).
    Ethermine,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Ethermine, Source::CloudAtCost];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::CloudAtCost => "cloudatcost",
            Source::Ethermine => "ethermine",
        }
    }

    /// The native coin this source pays out in.
    pub fn currency(&self) -> Currency {
        match self {
            Source::CloudAtCost => Currency::Btc,
            Source::Ethermine => Currency::Eth,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cloudatcost" => Ok(Source::CloudAtCost),
            "ethermine" => Ok(Source::Ethermine),
            other => anyhow::bail!("Unknown source: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Btc,
    Eth,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Btc => "btc",
            Currency::Eth => "eth",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "btc" => Ok(Currency::Btc),
            "eth" => Ok(Currency::Eth),
            other => anyhow::bail!("Unknown currency: {other}"),
        }
    }
}

/// Row identifier assigned by the ledger store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One observed, distinct balance snapshot. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub id: RecordId,
    pub source: Source,
    pub currency: Currency,
    /// Payout generation ("work").
    pub epoch: i64,
    /// Per-epoch counter ("step").
    pub sequence: i64,
    pub timestamp: NaiveDateTime,
    pub value: Decimal,
    pub usd: Decimal,
}

/// A record that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBalanceRecord {
    pub source: Source,
    pub currency: Currency,
    pub epoch: i64,
    pub sequence: i64,
    pub timestamp: NaiveDateTime,
    pub value: Decimal,
    pub usd: Decimal,
}

impl NewBalanceRecord {
    pub fn with_id(self, id: RecordId) -> BalanceRecord {
        BalanceRecord {
            id,
            source: self.source,
            currency: self.currency,
            epoch: self.epoch,
            sequence: self.sequence,
            timestamp: self.timestamp,
            value: self.value,
            usd: self.usd,
        }
    }
}

/// Result of a dedup-append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted(RecordId),
    /// Value matched the most recent row; nothing was written.
    NoChange,
}

impl AppendOutcome {
    pub fn record_id(&self) -> Option<RecordId> {
        match self {
            AppendOutcome::Inserted(id) => Some(*id),
            AppendOutcome::NoChange => None,
        }
    }
}

impl fmt::Display for AppendOutcome {
    /// Prints the row id, or `0` for no change.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppendOutcome::Inserted(id) => write!(f, "{id}"),
            AppendOutcome::NoChange => f.write_str("0"),
        }
    }
}

/// Direction of the latest USD move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn between(previous: Decimal, latest: Decimal) -> Self {
        match latest.cmp(&previous) {
            std::cmp::Ordering::Greater => Trend::Up,
            std::cmp::Ordering::Less => Trend::Down,
            std::cmp::Ordering::Equal => Trend::Flat,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Trend::Up => "^",
            Trend::Down => "v",
            Trend::Flat => "=",
        }
    }
}

/// Latest USD figure of one series, for the big-number view and mail subject.
#[derive(Debug, Clone, PartialEq)]
pub struct Headline {
    pub source: Source,
    pub currency: Currency,
    pub usd: Decimal,
    pub trend: Trend,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_round_trips_through_str() {
        for source in Source::ALL {
            assert_eq!(source.as_str().parse::<Source>().unwrap(), source);
        }
        assert!("nicehash".parse::<Source>().is_err());
    }

    #[test]
    fn source_implies_currency() {
        assert_eq!(Source::CloudAtCost.currency(), Currency::Btc);
        assert_eq!(Source::Ethermine.currency(), Currency::Eth);
    }

    #[test]
    fn trend_compares_usd() {
        assert_eq!(Trend::between(Decimal::ONE, Decimal::TWO), Trend::Up);
        assert_eq!(Trend::between(Decimal::TWO, Decimal::ONE), Trend::Down);
        assert_eq!(Trend::between(Decimal::ONE, Decimal::new(100, 2)), Trend::Flat);
    }

    #[test]
    fn no_change_displays_as_zero() {
        assert_eq!(AppendOutcome::NoChange.to_string(), "0");
        assert_eq!(AppendOutcome::Inserted(RecordId(42)).to_string(), "42");
    }
}
