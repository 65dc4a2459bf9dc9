//! Read-only access to a published store.
//!
//! Every report is computed from the `messages` table (the hourly counts). A reader
//! keeps the file it opened; a rebuild published meanwhile is seen on the next open.

use crate::date::{date_end_secs, date_start_secs};
use crate::query::{
    percentage, ChannelEntry, HourOfDayCount, MonthCount, NamedId, ReportFilter, ShareRow, TopUser, TopUsersQuery,
};
use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OpenFlags, Row};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};

pub struct Store {
    conn: Connection,
    path: PathBuf,
}

// Ids that cannot be stored cannot match anything either.
fn filter_int(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(-1)
}

fn id_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)? as u64)
}

fn count_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)?.max(0) as u64)
}

fn name_or_id(name: Option<String>, id: u64) -> String {
    match name {
        Some(n) if !n.is_empty() => n,
        _ => id.to_string(),
    }
}

/// `WHERE ...` over the `messages m` alias plus its bound values.
fn where_clause(filter: &ReportFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    if let Some(c) = filter.channel_id {
        clauses.push("m.channel_id = ?");
        values.push(Value::Integer(filter_int(c)));
    }
    if let Some(u) = filter.user_id {
        clauses.push("m.user_id = ?");
        values.push(Value::Integer(filter_int(u)));
    }
    if let Some(start) = filter.start {
        clauses.push("m.hour >= ?");
        values.push(Value::Integer(date_start_secs(start)));
    }
    if let Some(end) = filter.end {
        clauses.push("m.hour < ?");
        values.push(Value::Integer(date_end_secs(end)));
    }
    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), values)
    }
}

impl Store {
    /// Open a published store read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("open store {}", path.display()))?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // -------- listings --------

    pub fn guilds(&self) -> Result<Vec<NamedId>> {
        let mut stmt = self.conn.prepare("SELECT guild_id, name FROM guilds ORDER BY name COLLATE NOCASE, guild_id")?;
        let rows = stmt.query_map([], |r| Ok(NamedId { id: id_at(r, 0)?, name: r.get(1)? }))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn channels(&self) -> Result<Vec<ChannelEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT channel_id, guild_id, name FROM channels ORDER BY name COLLATE NOCASE, channel_id")?;
        let rows = stmt.query_map([], |r| {
            Ok(ChannelEntry { id: id_at(r, 0)?, guild_id: id_at(r, 1)?, name: r.get(2)? })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Users ordered case-insensitively by name; unnamed users last, shown by id.
    pub fn users(&self) -> Result<Vec<NamedId>> {
        let mut stmt = self.conn.prepare("SELECT user_id, name FROM users ORDER BY name IS NULL, name, user_id")?;
        let rows = stmt.query_map([], |r| {
            let id = id_at(r, 0)?;
            Ok(NamedId { id, name: name_or_id(r.get(1)?, id) })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Case-insensitive lookup of a user's internal id by display name.
    pub fn user_by_name(&self, name: &str) -> Result<Option<u64>> {
        let mut stmt = self.conn.prepare("SELECT user_id FROM users WHERE name = ?1 ORDER BY user_id LIMIT 1")?;
        let mut rows = stmt.query([name])?;
        match rows.next()? {
            Some(r) => Ok(Some(id_at(r, 0)?)),
            None => Ok(None),
        }
    }

    /// `(external_id, internal_id)` for every external id the build resolved,
    /// including ones that are not the `external_id` of their user row.
    pub fn external_ids(&self) -> Result<Vec<(u64, u64)>> {
        let mut stmt = self.conn.prepare("SELECT external_id, user_id FROM user_aliases ORDER BY external_id")?;
        let rows = stmt.query_map([], |r| Ok((id_at(r, 0)?, id_at(r, 1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// "YYYY-MM" labels, ascending.
    pub fn months(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT month FROM months ORDER BY month")?;
        let rows = stmt.query_map([], |r| r.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // -------- time-bucketed and share reports --------

    pub fn total(&self, filter: &ReportFilter) -> Result<u64> {
        let (clause, values) = where_clause(filter);
        let sql = format!("SELECT COALESCE(SUM(m.count), 0) FROM messages m {clause}");
        let total = self.conn.query_row(&sql, params_from_iter(values.iter()), |r| count_at(r, 0))?;
        Ok(total)
    }

    pub fn by_month(&self, filter: &ReportFilter) -> Result<Vec<MonthCount>> {
        let (clause, values) = where_clause(filter);
        let sql = format!(
            "SELECT strftime('%Y-%m', m.hour, 'unixepoch') AS month, SUM(m.count)
             FROM messages m {clause} GROUP BY month ORDER BY month"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |r| {
            Ok(MonthCount { month: r.get(0)?, count: count_at(r, 1)? })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Totals per hour of the day (UTC), only for hours with messages.
    pub fn by_hour(&self, filter: &ReportFilter) -> Result<Vec<HourOfDayCount>> {
        let (clause, values) = where_clause(filter);
        let sql = format!(
            "SELECT strftime('%H', m.hour, 'unixepoch') AS agg_hour, SUM(m.count)
             FROM messages m {clause} GROUP BY agg_hour ORDER BY agg_hour"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |r| {
            Ok(HourOfDayCount { hour: r.get(0)?, count: count_at(r, 1)? })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// The `limit` most active users under `filter`, with their share of the total.
    pub fn by_user(&self, filter: &ReportFilter, limit: usize) -> Result<Vec<ShareRow>> {
        let total = self.total(filter)?;
        if total == 0 || limit == 0 {
            return Ok(Vec::new());
        }
        let (clause, mut values) = where_clause(filter);
        values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        let sql = format!(
            "SELECT m.user_id, u.name, SUM(m.count) AS total
             FROM messages m LEFT JOIN users u ON u.user_id = m.user_id
             {clause}
             GROUP BY m.user_id ORDER BY total DESC, m.user_id ASC LIMIT ?"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |r| {
            let id = id_at(r, 0)?;
            let count = count_at(r, 2)?;
            Ok(ShareRow { id, name: name_or_id(r.get(1)?, id), count, percentage: percentage(count, total) })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Every channel with messages under `filter`, with its share of the total.
    pub fn by_channel(&self, filter: &ReportFilter) -> Result<Vec<ShareRow>> {
        let total = self.total(filter)?;
        if total == 0 {
            return Ok(Vec::new());
        }
        let (clause, values) = where_clause(filter);
        let sql = format!(
            "SELECT m.channel_id, c.name, SUM(m.count) AS total
             FROM messages m LEFT JOIN channels c ON c.channel_id = m.channel_id
             {clause}
             GROUP BY m.channel_id ORDER BY total DESC, m.channel_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |r| {
            let id = id_at(r, 0)?;
            let count = count_at(r, 2)?;
            Ok(ShareRow { id, name: name_or_id(r.get(1)?, id), count, percentage: percentage(count, total) })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // -------- top users --------

    /// Highest-volume users, optionally within one guild and a trailing window.
    /// Ties are broken by ascending internal id; users with a zero total never appear.
    pub fn top_users(&self, q: &TopUsersQuery) -> Result<Vec<TopUser>> {
        if q.limit == 0 {
            return Ok(Vec::new());
        }
        let mut join = "";
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(guild_id) = q.guild_id {
            join = "JOIN channels c ON c.channel_id = m.channel_id";
            clauses.push("c.guild_id = ?");
            values.push(Value::Integer(filter_int(guild_id)));
        }
        if let Some(cutoff) = q.cutoff_secs() {
            clauses.push("m.hour >= ?");
            values.push(Value::Integer(cutoff));
        }
        let clause = if clauses.is_empty() { String::new() } else { format!("WHERE {}", clauses.join(" AND ")) };
        values.push(Value::Integer(i64::try_from(q.limit).unwrap_or(i64::MAX)));

        let sql = format!(
            "SELECT m.user_id, u.name, SUM(m.count) AS total
             FROM messages m {join}
             LEFT JOIN users u ON u.user_id = m.user_id
             {clause}
             GROUP BY m.user_id HAVING total > 0
             ORDER BY total DESC, m.user_id ASC LIMIT ?"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |r| {
            let internal_id = id_at(r, 0)?;
            Ok(TopUser { internal_id, display_name: name_or_id(r.get(1)?, internal_id), total: count_at(r, 2)? })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// `top_users` for every guild, keyed by guild id. Guilds without activity map
    /// to an empty ranking.
    pub fn top_users_per_guild(
        &self,
        window: Option<Duration>,
        limit: usize,
        now: Option<OffsetDateTime>,
    ) -> Result<BTreeMap<u64, Vec<TopUser>>> {
        let mut out = BTreeMap::new();
        for guild in self.guilds()? {
            let q = TopUsersQuery { guild_id: Some(guild.id), window, limit, now };
            out.insert(guild.id, self.top_users(&q)?);
        }
        Ok(out)
    }

    /// `channel_id -> guild_id` for every known channel.
    pub fn channel_guilds(&self) -> Result<BTreeMap<u64, u64>> {
        let mut stmt = self.conn.prepare("SELECT channel_id, guild_id FROM channels")?;
        let rows = stmt.query_map([], |r| Ok((id_at(r, 0)?, id_at(r, 1)?)))?;
        Ok(rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()?)
    }
}
