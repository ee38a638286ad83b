use chrono::{DateTime, Local, NaiveDateTime, SubsecRound, Timelike, Utc};

/// Abstraction over "current wall time" to make ledger timestamps and
/// next-update projections deterministic in tests.
///
/// Ledger rows are stamped in local wall time with whole-second precision,
/// which is what the payout cadence is expressed in.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    /// Seconds since the Unix epoch. Defaults to reading `now()` as UTC.
    fn unix_timestamp(&self) -> i64 {
        self.now().and_utc().timestamp()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now: DateTime<Local> = Local::now();
        now.naive_local().trunc_subsecs(0)
    }

    fn unix_timestamp(&self) -> i64 {
        Utc::now().timestamp()
    }
}

#[derive(Debug, Clone)]
pub struct FixedClock {
    now: NaiveDateTime,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: now.with_nanosecond(0).unwrap_or(now),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.now
    }
}
