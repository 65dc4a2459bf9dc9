use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use time::{Date, OffsetDateTime};

/// Calendar month in UTC, rendered as "YYYY-MM".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u8, // 1..=12
}

impl YearMonth {
    pub fn new(year: i32, month: u8) -> Self {
        assert!((1..=12).contains(&month), "Month must be 1..=12");
        Self { year, month }
    }

    pub fn of(ts: OffsetDateTime) -> Self {
        Self { year: ts.year(), month: u8::from(ts.month()) }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s.split_once('-').ok_or("expected YYYY-MM")?;
        if year.len() != 4 || month.len() != 2 {
            return Err("expected YYYY-MM".into());
        }
        let year: i32 = year.parse().map_err(|_| "invalid year")?;
        let month: u8 = month.parse().map_err(|_| "invalid month")?;
        if !(1..=12).contains(&month) {
            return Err("month must be 01..12".into());
        }
        Ok(Self { year, month })
    }
}

/// Unix seconds at UTC midnight of `date`.
pub fn date_start_secs(date: Date) -> i64 {
    date.midnight().assume_utc().unix_timestamp()
}

/// Unix seconds at UTC midnight of the day after `date` (exclusive upper bound).
pub fn date_end_secs(date: Date) -> i64 {
    date_start_secs(date) + 86_400
}
