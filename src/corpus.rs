//! Training-corpus extraction: the message bodies of each guild's most active users.
//!
//! The ranking comes from the published store; the bodies are streamed again out of
//! the raw sources, since the store only keeps counts.

use crate::concurrency::fold_files_limited;
use crate::config::BuildOptions;
use crate::paths::discover_all;
use crate::query::TopUsersQuery;
use crate::sources::{RawRecord, RawSource, ReadOptions, ReadStats, SourceReader};
use crate::store::Store;
use crate::util::replace_file_atomic_backoff;
use ahash::{AHashMap, AHashSet};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};

/// Which users and which time span to extract.
#[derive(Clone, Copy, Debug)]
pub struct CorpusPlan {
    pub window: Option<Duration>,
    /// Top users per guild.
    pub limit: usize,
    /// Reference time for `window`; defaults to the current time.
    pub now: Option<OffsetDateTime>,
}

#[derive(Clone, Debug, Default)]
pub struct CorpusReport {
    /// One file per guild that has at least one ranked user.
    pub files: Vec<PathBuf>,
    pub messages: u64,
    pub read: ReadStats,
}

// Bodies collected per guild, in source order.
#[derive(Default)]
struct Bodies {
    by_guild: BTreeMap<u64, Vec<String>>,
    read: ReadStats,
}

struct Selection {
    top: AHashMap<u64, AHashSet<u64>>,
    channel_guilds: BTreeMap<u64, u64>,
    external_to_internal: AHashMap<u64, u64>,
    cutoff: Option<i64>,
}

impl Selection {
    fn accepts(&self, rec: &RawRecord) -> Option<u64> {
        let guild_id = self.channel_guilds.get(&rec.channel_id).copied().or(rec.guild_id)?;
        let users = self.top.get(&guild_id)?;
        let internal = match (rec.user.internal, rec.user.external) {
            (Some(id), _) => id,
            (None, Some(ext)) => *self.external_to_internal.get(&ext)?,
            (None, None) => return None,
        };
        if !users.contains(&internal) {
            return None;
        }
        if let Some(cutoff) = self.cutoff {
            if rec.moment.unix_secs() < cutoff {
                return None;
            }
        }
        Some(guild_id)
    }
}

// Bodies are written one per line.
fn one_line(body: &str) -> String {
    body.replace(['\r', '\n'], " ")
}

/// Write `<out_dir>/<guild_id>.txt` for every guild of the published store.
pub fn write_training_corpus(opts: &BuildOptions, out_dir: &Path, plan: &CorpusPlan) -> Result<CorpusReport> {
    let store = Store::open(&opts.store_path)?;
    let now = plan.now.unwrap_or_else(OffsetDateTime::now_utc);

    let ranked = store.top_users_per_guild(plan.window, plan.limit, Some(now))?;
    let top: AHashMap<u64, AHashSet<u64>> = ranked
        .iter()
        .filter(|(_, users)| !users.is_empty())
        .map(|(&guild, users)| (guild, users.iter().map(|u| u.internal_id).collect()))
        .collect();
    let cutoff = TopUsersQuery { guild_id: None, window: plan.window, limit: plan.limit, now: Some(now) }.cutoff_secs();
    let selection = Selection {
        top,
        channel_guilds: store.channel_guilds()?,
        external_to_internal: store.external_ids()?.into_iter().collect(),
        cutoff,
    };
    if selection.top.is_empty() {
        tracing::warn!("no ranked users in any guild; nothing to extract");
        return Ok(CorpusReport::default());
    }

    let discovered = discover_all(opts);
    let read_opts = ReadOptions { read_buffer_bytes: opts.read_buffer_bytes, with_content: true, progress: None };
    let bodies = fold_files_limited(
        &discovered.jobs,
        opts.file_concurrency,
        |job| {
            let mut by_guild: BTreeMap<u64, Vec<String>> = BTreeMap::new();
            let read = RawSource::from_job(job)
                .read_records(&read_opts, &mut |rec| {
                    let Some(content) = rec.content.as_deref() else { return Ok(()) };
                    if content.trim().is_empty() {
                        return Ok(());
                    }
                    if let Some(guild_id) = selection.accepts(&rec) {
                        by_guild.entry(guild_id).or_default().push(one_line(content));
                    }
                    Ok(())
                })
                .with_context(|| format!("processing {}", job.path.display()))?;
            Ok(Bodies { by_guild, read })
        },
        |acc: &mut Bodies, part: Bodies| {
            for (guild, mut lines) in part.by_guild {
                acc.by_guild.entry(guild).or_default().append(&mut lines);
            }
            acc.read += part.read;
        },
    )?;

    fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;
    let mut report = CorpusReport { read: bodies.read, ..Default::default() };
    let mut guilds: Vec<u64> = selection.top.keys().copied().collect();
    guilds.sort_unstable();
    for guild_id in guilds {
        let lines = bodies.by_guild.get(&guild_id).map(Vec::as_slice).unwrap_or(&[]);
        let dest = out_dir.join(format!("{guild_id}.txt"));
        let tmp = out_dir.join(format!(".{guild_id}.txt.tmp"));
        {
            let file = File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
            let mut out = BufWriter::with_capacity(opts.write_buffer_bytes, file);
            for line in lines {
                out.write_all(line.as_bytes())?;
                out.write_all(b"\n")?;
            }
            out.flush().with_context(|| format!("write {}", tmp.display()))?;
        }
        replace_file_atomic_backoff(&tmp, &dest)?;
        tracing::info!(guild_id, messages = lines.len(), path = %dest.display(), "corpus written");
        report.messages += lines.len() as u64;
        report.files.push(dest);
    }
    Ok(report)
}
