//! Query parameters and result rows for the published store.

use serde::Serialize;
use time::{Date, Duration, OffsetDateTime};

/// Filters shared by the report queries. Every field is optional; an id that
/// matches nothing simply yields an empty result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub channel_id: Option<u64>,
    pub user_id: Option<u64>,
    /// First day included (UTC).
    pub start: Option<Date>,
    /// Last day included (UTC).
    pub end: Option<Date>,
}

impl ReportFilter {
    pub fn channel(mut self, id: u64) -> Self {
        self.channel_id = Some(id);
        self
    }
    pub fn user(mut self, id: u64) -> Self {
        self.user_id = Some(id);
        self
    }
    pub fn between(mut self, start: Option<Date>, end: Option<Date>) -> Self {
        self.start = start;
        self.end = end;
        self
    }
}

/// Parameters of the top-user selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopUsersQuery {
    pub guild_id: Option<u64>,
    /// Trailing window ending at `now`.
    pub window: Option<Duration>,
    pub limit: usize,
    /// Reference time for `window`; defaults to the current time.
    pub now: Option<OffsetDateTime>,
}

impl TopUsersQuery {
    pub fn new(limit: usize) -> Self {
        Self { guild_id: None, window: None, limit, now: None }
    }
    pub fn guild(mut self, id: u64) -> Self {
        self.guild_id = Some(id);
        self
    }
    pub fn window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }
    pub fn at(mut self, now: OffsetDateTime) -> Self {
        self.now = Some(now);
        self
    }

    /// Inclusive lower bound on hour buckets, in unix seconds.
    pub(crate) fn cutoff_secs(&self) -> Option<i64> {
        let window = self.window?;
        let now = self.now.unwrap_or_else(OffsetDateTime::now_utc);
        Some((now - window).unix_timestamp())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TopUser {
    pub internal_id: u64,
    /// Display name, or the stringified id when none was recorded.
    pub display_name: String,
    pub total: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NamedId {
    pub id: u64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChannelEntry {
    pub id: u64,
    pub guild_id: u64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MonthCount {
    pub month: String,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HourOfDayCount {
    /// "00".."23", UTC.
    pub hour: String,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShareRow {
    pub id: u64,
    /// Display name, or the stringified id.
    pub name: String,
    pub count: u64,
    /// Share of the filtered total, rounded to two decimals.
    pub percentage: f64,
}

pub(crate) fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((count as f64 / total as f64) * 10_000.0).round() / 100.0
}
