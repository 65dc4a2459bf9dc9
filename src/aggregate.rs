//! Streaming count aggregation.
//!
//! Records are folded into `channel -> user -> hour -> count` as they arrive, so memory
//! follows the number of distinct (channel, user, hour) triples rather than input volume.
//! Each worker owns its accumulator, keyed by the raw user reference; partial results
//! are merged explicitly at the end. Only then are the references reconciled, in a
//! fixed order, so neither merging nor id assignment depends on the order of sources.

use crate::concurrency::fold_files_limited;
use crate::date::YearMonth;
use crate::identity::{IdentityReconciler, UserRef};
use crate::paths::SourceJob;
use crate::snowflake::HourBucket;
use crate::sources::{RawRecord, RawSource, ReadOptions, ReadStats, SourceReader};
use ahash::AHashMap;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::hash::Hash;

/// Implement for any state that can absorb resolved records and be merged.
pub trait Aggregator: Send + Default {
    fn ingest(&mut self, record: &ResolvedRecord);
    fn merge(&mut self, other: Self);
}

/// A raw record after snowflake decoding and identity reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedRecord {
    pub channel_id: u64,
    pub user_id: u64,
    pub hour: HourBucket,
    pub count: u64,
}

/// One stored row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct HourlyCount {
    pub channel_id: u64,
    pub user_id: u64,
    pub hour: HourBucket,
    pub count: u64,
}

type HourMap = AHashMap<HourBucket, u64>;

/// Counts keyed by `U`: the internal user id once reconciled, or the raw `UserRef` before.
#[derive(Clone, Debug)]
pub struct HourlyCounts<U = u64> {
    counts: AHashMap<u64, AHashMap<U, HourMap>>,
    months: BTreeSet<YearMonth>,
}

impl<U> Default for HourlyCounts<U> {
    fn default() -> Self {
        Self { counts: AHashMap::new(), months: BTreeSet::new() }
    }
}

impl<U: Copy + Eq + Hash> HourlyCounts<U> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` to a triple. Zero counts leave no trace (no row, no month).
    pub fn add(&mut self, channel_id: u64, user: U, hour: HourBucket, count: u64) {
        if count == 0 {
            return;
        }
        let slot = self
            .counts
            .entry(channel_id)
            .or_default()
            .entry(user)
            .or_default()
            .entry(hour)
            .or_insert(0);
        *slot = slot.saturating_add(count);
        self.months.insert(hour.year_month());
    }

    pub fn get(&self, channel_id: u64, user: U, hour: HourBucket) -> u64 {
        self.counts
            .get(&channel_id)
            .and_then(|users| users.get(&user))
            .and_then(|hours| hours.get(&hour))
            .copied()
            .unwrap_or(0)
    }

    /// Distinct months with at least one message, ascending.
    pub fn months(&self) -> &BTreeSet<YearMonth> {
        &self.months
    }

    /// Number of distinct (channel, user, hour) triples.
    pub fn triples(&self) -> usize {
        self.counts.values().flat_map(|users| users.values()).map(|hours| hours.len()).sum()
    }

    pub fn channel_total(&self, channel_id: u64) -> u64 {
        self.counts
            .get(&channel_id)
            .map(|users| users.values().flat_map(|hours| hours.values()).sum())
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.keys().map(|&c| self.channel_total(c)).sum()
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.counts.keys().copied()
    }

    /// Add every count of `other` into `self`.
    pub fn merge(&mut self, other: Self) {
        // Fold the smaller map into the larger one.
        let (mut dst, src) = if self.counts.len() >= other.counts.len() {
            (std::mem::take(self), other)
        } else {
            (other, std::mem::take(self))
        };
        for (channel_id, users) in src.counts {
            let dst_users = dst.counts.entry(channel_id).or_default();
            for (user, hours) in users {
                let dst_hours = dst_users.entry(user).or_default();
                for (hour, count) in hours {
                    let slot = dst_hours.entry(hour).or_insert(0);
                    *slot = slot.saturating_add(count);
                }
            }
        }
        dst.months.extend(src.months);
        *self = dst;
    }
}

impl HourlyCounts {
    /// All rows in (channel, user, hour) order.
    pub fn sorted_rows(&self) -> Vec<HourlyCount> {
        let mut rows: Vec<HourlyCount> = self
            .counts
            .iter()
            .flat_map(|(&channel_id, users)| {
                users.iter().flat_map(move |(&user_id, hours)| {
                    hours.iter().map(move |(&hour, &count)| HourlyCount { channel_id, user_id, hour, count })
                })
            })
            .collect();
        rows.sort_unstable();
        rows
    }
}

impl HourlyCounts<UserRef> {
    /// Reconcile every distinct reference and re-key the counts by internal id.
    ///
    /// References carrying both ids are resolved first, then internal-only, then
    /// external-only ones, each in ascending order. Id allocation and duplicate
    /// reports therefore come out the same whichever source was read first.
    pub fn resolve_users(self, reconciler: &mut IdentityReconciler) -> HourlyCounts {
        let mut refs: Vec<UserRef> = self.counts.values().flat_map(|users| users.keys().copied()).collect();
        refs.sort_unstable_by_key(|r| {
            let rank = match (r.internal, r.external) {
                (Some(_), Some(_)) => 0,
                (Some(_), None) => 1,
                _ => 2,
            };
            (rank, r.internal, r.external)
        });
        refs.dedup();
        let ids: AHashMap<UserRef, u64> =
            refs.into_iter().filter_map(|r| reconciler.resolve(r).map(|id| (r, id))).collect();

        let mut resolved: HourlyCounts = HourlyCounts::new();
        for (channel_id, users) in self.counts {
            for (user, hours) in users {
                let Some(&user_id) = ids.get(&user) else { continue };
                for (hour, count) in hours {
                    resolved.ingest(&ResolvedRecord { channel_id, user_id, hour, count });
                }
            }
        }
        resolved
    }
}

impl Aggregator for HourlyCounts {
    fn ingest(&mut self, record: &ResolvedRecord) {
        self.add(record.channel_id, record.user_id, record.hour, record.count);
    }

    fn merge(&mut self, other: Self) {
        HourlyCounts::merge(self, other);
    }
}

/// Everything a build learns from the record-bearing sources.
#[derive(Debug, Default)]
pub struct SourceAccumulator {
    /// Counts keyed by the raw user reference; see `HourlyCounts::resolve_users`.
    pub counts: HourlyCounts<UserRef>,
    /// Guild membership learned from data (day log paths, archive `guild_id`).
    pub channel_guilds: AHashMap<u64, u64>,
    pub stats: ReadStats,
    /// Records that carried no usable user id.
    pub unresolved: u64,
}

impl SourceAccumulator {
    pub fn merge(&mut self, other: Self) {
        self.counts.merge(other.counts);
        for (channel, guild) in other.channel_guilds {
            self.channel_guilds.entry(channel).or_insert(guild);
        }
        self.stats += other.stats;
        self.unresolved += other.unresolved;
    }
}

/// Stream one source into a fresh accumulator.
pub fn ingest_source(source: &RawSource, opts: &ReadOptions) -> Result<SourceAccumulator> {
    let mut acc = SourceAccumulator::default();
    let stats = source.read_records(opts, &mut |rec: RawRecord| {
        if rec.user.internal.is_none() && rec.user.external.is_none() {
            acc.unresolved += 1;
            return Ok(());
        }
        if let Some(guild_id) = rec.guild_id {
            acc.channel_guilds.entry(rec.channel_id).or_insert(guild_id);
        }
        acc.counts.add(rec.channel_id, rec.user, rec.moment.hour(), rec.count);
        Ok(())
    })?;
    acc.stats = stats;
    Ok(acc)
}

/// Read every job (at most `file_concurrency` at once) and merge the partial results.
pub fn aggregate_sources(jobs: &[SourceJob], file_concurrency: usize, opts: &ReadOptions) -> Result<SourceAccumulator> {
    fold_files_limited(
        jobs,
        file_concurrency,
        |job| {
            ingest_source(&RawSource::from_job(job), opts).with_context(|| format!("processing {}", job.path.display()))
        },
        SourceAccumulator::merge,
    )
}
