//! Snowflake id decoding and hour bucketing.
//!
//! A snowflake carries its creation time in the top 42 bits as milliseconds since
//! the platform epoch (2015-01-01T00:00:00Z). Every u64 decodes to a valid instant.

use crate::date::YearMonth;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

/// Platform epoch in milliseconds since the Unix epoch.
pub const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

const SECS_PER_HOUR: i64 = 3600;

/// Whole unix seconds encoded in a snowflake.
#[inline]
pub fn unix_secs_of(id: u64) -> i64 {
    // (2^42 - 1) + epoch still fits comfortably in i64 milliseconds.
    (((id >> 22) + DISCORD_EPOCH_MS) / 1000) as i64
}

/// Wall-clock creation time of a snowflake, UTC, second precision.
pub fn timestamp_of(id: u64) -> OffsetDateTime {
    OffsetDateTime::UNIX_EPOCH + Duration::seconds(unix_secs_of(id))
}

/// Start of a UTC hour, in unix seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HourBucket(i64);

impl HourBucket {
    /// Bucket containing the given unix second.
    #[inline]
    pub fn containing(unix_secs: i64) -> Self {
        Self(unix_secs - unix_secs.rem_euclid(SECS_PER_HOUR))
    }

    pub fn of(ts: OffsetDateTime) -> Self {
        Self::containing(ts.unix_timestamp())
    }

    #[inline]
    pub fn of_snowflake(id: u64) -> Self {
        Self::containing(unix_secs_of(id))
    }

    /// Parse a `YYYY-MM-DD HH:MM:SS` label (UTC) and truncate it to its hour.
    pub fn parse_label(label: &str) -> Option<Self> {
        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        let dt = PrimitiveDateTime::parse(label.trim(), format).ok()?;
        Some(Self::of(dt.assume_utc()))
    }

    #[inline]
    pub fn start_secs(self) -> i64 {
        self.0
    }

    pub fn start(self) -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(self.0)
    }

    pub fn year_month(self) -> YearMonth {
        YearMonth::of(self.start())
    }
}
