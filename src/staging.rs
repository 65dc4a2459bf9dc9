//! Builds a brand-new store file next to the live one.
//!
//! The staging file is never the one being served. If the build fails, or the
//! `StagingStore` is dropped before it is published, the file is deleted.

use crate::aggregate::HourlyCounts;
use crate::catalog::Catalog;
use crate::identity::IdentityReconciler;
use crate::progress::make_count_progress;
use crate::util::remove_with_backoff;
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

pub const SCHEMA: &str = "
    CREATE TABLE guilds (
        guild_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );
    CREATE TABLE channels (
        channel_id INTEGER PRIMARY KEY,
        guild_id INTEGER NOT NULL,
        name TEXT NOT NULL
    );
    CREATE INDEX channels_guild ON channels (guild_id);
    CREATE TABLE users (
        user_id INTEGER PRIMARY KEY,
        external_id INTEGER NOT NULL,
        name TEXT COLLATE NOCASE
    );
    CREATE TABLE user_aliases (
        external_id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL
    );
    CREATE TABLE months (
        month TEXT PRIMARY KEY
    );
    CREATE TABLE messages (
        channel_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        hour INTEGER NOT NULL,
        count INTEGER NOT NULL CHECK (count >= 0)
    );
    CREATE UNIQUE INDEX channel_user_hour ON messages (channel_id, user_id, hour);
    CREATE INDEX messages_user ON messages (user_id);
";

/// Row counts written to a staging store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StagingReport {
    pub guilds: u64,
    pub channels: u64,
    pub users: u64,
    pub duplicate_users: u64,
    /// External ids and the internal id each resolved to.
    pub aliases: u64,
    pub months: u64,
    pub rows: u64,
    pub rejected_rows: u64,
}

pub struct StagingStore {
    path: PathBuf,
    conn: Option<Connection>,
    keep: bool,
}

/// Staging location for a live store: same directory, so the final rename is atomic.
pub fn staging_path_for(live: &Path) -> PathBuf {
    let name = live.file_name().and_then(|s| s.to_str()).unwrap_or("store.db");
    let dir = live.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    dir.join(format!(".{}.staging-{}", name, std::process::id()))
}

pub(crate) fn sql_int(v: u64) -> Result<i64> {
    i64::try_from(v).map_err(|_| anyhow!("value {} does not fit in an SQLite integer", v))
}

impl StagingStore {
    /// Create an empty store with the full schema at `staging_path_for(live)`.
    pub fn create(live: &Path) -> Result<Self> {
        let path = staging_path_for(live);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        // A leftover from an aborted run is never live; start from nothing.
        remove_with_backoff(&path, 16, 50)?;
        let conn = Connection::open(&path).with_context(|| format!("create staging store {}", path.display()))?;
        let mut staging = Self { path, conn: Some(conn), keep: false };
        staging.conn()?.execute_batch("PRAGMA journal_mode = OFF;")?;
        staging.conn()?.execute_batch(SCHEMA).context("create staging schema")?;
        tracing::debug!(path = %staging.path.display(), "staging store created");
        Ok(staging)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&mut self) -> Result<&mut Connection> {
        self.conn.as_mut().ok_or_else(|| anyhow!("staging store {} is already closed", self.path.display()))
    }

    /// Insert guilds, channels, users, aliases, months, then counts, in one transaction.
    pub fn write_all(
        &mut self,
        catalog: &Catalog,
        users: &IdentityReconciler,
        counts: &HourlyCounts,
        progress: bool,
    ) -> Result<StagingReport> {
        let mut report = StagingReport::default();
        let tx = self.conn()?.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT INTO guilds (guild_id, name) VALUES (?1, ?2)")?;
            for g in catalog.guilds() {
                stmt.execute(params![sql_int(g.id)?, g.name])
                    .with_context(|| format!("insert guild {}", g.id))?;
                report.guilds += 1;
            }
        }
        {
            let mut stmt = tx.prepare("INSERT INTO channels (channel_id, guild_id, name) VALUES (?1, ?2, ?3)")?;
            for c in catalog.channels() {
                stmt.execute(params![sql_int(c.id)?, sql_int(c.guild_id)?, c.name])
                    .with_context(|| format!("insert channel {}", c.id))?;
                report.channels += 1;
            }
        }
        {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO users (user_id, external_id, name) VALUES (?1, ?2, ?3)")?;
            for u in users.identities() {
                let changed = stmt.execute(params![sql_int(u.internal_id)?, sql_int(u.external_id)?, u.display_name])?;
                if changed == 0 {
                    report.duplicate_users += 1;
                    tracing::warn!(internal_id = u.internal_id, "duplicate user row ignored by the store");
                } else {
                    report.users += 1;
                }
            }
        }
        {
            let mut stmt = tx.prepare("INSERT INTO user_aliases (external_id, user_id) VALUES (?1, ?2)")?;
            for (external_id, internal_id) in users.external_map() {
                stmt.execute(params![sql_int(external_id)?, sql_int(internal_id)?])?;
                report.aliases += 1;
            }
        }
        {
            let mut stmt = tx.prepare("INSERT INTO months (month) VALUES (?1)")?;
            for m in counts.months() {
                stmt.execute(params![m.to_string()])?;
                report.months += 1;
            }
        }
        {
            let rows = counts.sorted_rows();
            let pb = if progress { Some(make_count_progress(rows.len() as u64, "Staging: hourly counts")) } else { None };
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO messages (channel_id, user_id, hour, count) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (i, row) in rows.iter().enumerate() {
                if row.count == 0 {
                    continue;
                }
                let count = sql_int(row.count).with_context(|| {
                    format!("count for channel {} user {} hour {}", row.channel_id, row.user_id, row.hour.start_secs())
                })?;
                let changed = stmt.execute(params![
                    sql_int(row.channel_id)?,
                    sql_int(row.user_id)?,
                    row.hour.start_secs(),
                    count,
                ])?;
                if changed == 0 {
                    report.rejected_rows += 1;
                    tracing::warn!(
                        channel_id = row.channel_id,
                        user_id = row.user_id,
                        hour = row.hour.start_secs(),
                        "duplicate (channel, user, hour) row rejected"
                    );
                } else {
                    report.rows += 1;
                }
                if let Some(pb) = &pb {
                    if i % 4096 == 0 {
                        pb.set_position(i as u64);
                    }
                }
            }
            if let Some(pb) = pb {
                pb.finish_with_message("Staging: counts written");
            }
        }
        tx.commit().context("commit staging store")?;
        Ok(report)
    }

    /// Close the connection so the file is complete on disk.
    pub(crate) fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .map_err(|(_, e)| e)
                .with_context(|| format!("close staging store {}", self.path.display()))?;
        }
        Ok(())
    }

    /// The file now lives elsewhere (published); do not delete on drop.
    pub(crate) fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for StagingStore {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        drop(self.conn.take());
        if let Err(e) = remove_with_backoff(&self.path, 4, 25) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to discard staging store");
        } else {
            tracing::debug!(path = %self.path.display(), "staging store discarded");
        }
    }
}
