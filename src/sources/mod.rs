//! Raw source readers.
//!
//! Every raw format decodes into the same `RawRecord`. The set of formats is closed
//! (`RawSource`), and the aggregation code only ever talks to `SourceReader`.

pub mod archive;
pub mod daylog;
pub mod identity;

use crate::identity::UserRef;
use crate::paths::{SourceJob, SourceKind};
use crate::snowflake::{unix_secs_of, HourBucket};
use anyhow::Result;
use indicatif::ProgressBar;
use std::io::{self, Read};
use std::ops::AddAssign;

/// When a record happened: a message-level snowflake or an already bucketed hour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Moment {
    Message(u64),
    Hour(HourBucket),
}

impl Moment {
    pub fn hour(self) -> HourBucket {
        match self {
            Moment::Message(id) => HourBucket::of_snowflake(id),
            Moment::Hour(h) => h,
        }
    }

    /// Best-known unix second (bucket start for pre-aggregated rows).
    pub fn unix_secs(self) -> i64 {
        match self {
            Moment::Message(id) => unix_secs_of(id),
            Moment::Hour(h) => h.start_secs(),
        }
    }
}

/// Uniform record produced by every reader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRecord {
    pub channel_id: u64,
    pub guild_id: Option<u64>,
    pub user: UserRef,
    pub moment: Moment,
    pub count: u64,
    pub content: Option<String>,
}

/// Skip counters surfaced by readers. Nothing here unwinds a build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub files: u64,
    pub records: u64,
    pub malformed: u64,
    pub empty: u64,
    pub corrupt_frames: u64,
}

impl AddAssign for ReadStats {
    fn add_assign(&mut self, o: Self) {
        self.files += o.files;
        self.records += o.records;
        self.malformed += o.malformed;
        self.empty += o.empty;
        self.corrupt_frames += o.corrupt_frames;
    }
}

/// Per-read knobs.
#[derive(Clone, Debug)]
pub struct ReadOptions {
    pub read_buffer_bytes: usize,
    /// Keep message bodies on records (only the corpus extractor needs them).
    pub with_content: bool,
    pub progress: Option<ProgressBar>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { read_buffer_bytes: 256 * 1024, with_content: false, progress: None }
    }
}

/// A source that can be streamed once, front to back.
pub trait SourceReader {
    fn read_records(
        &self,
        opts: &ReadOptions,
        on_record: &mut dyn FnMut(RawRecord) -> Result<()>,
    ) -> Result<ReadStats>;
}

/// The closed set of record-bearing source formats.
#[derive(Clone, Debug)]
pub enum RawSource {
    Archive(archive::ArchiveSource),
    DayLog(daylog::DayLogSource),
}

impl RawSource {
    pub fn from_job(job: &SourceJob) -> Self {
        match job.kind {
            SourceKind::Archive { compressed } => {
                RawSource::Archive(archive::ArchiveSource { path: job.path.clone(), compressed })
            }
            SourceKind::DayLog { guild_id, channel_id, compressed, .. } => RawSource::DayLog(daylog::DayLogSource {
                path: job.path.clone(),
                guild_id,
                channel_id,
                compressed,
            }),
        }
    }
}

impl SourceReader for RawSource {
    fn read_records(
        &self,
        opts: &ReadOptions,
        on_record: &mut dyn FnMut(RawRecord) -> Result<()>,
    ) -> Result<ReadStats> {
        match self {
            RawSource::Archive(a) => a.read_records(opts, on_record),
            RawSource::DayLog(d) => d.read_records(opts, on_record),
        }
    }
}

/// A `Read` wrapper that advances a progress bar by compressed bytes read.
pub(crate) struct ProgressReader<R: Read> {
    inner: R,
    pb: Option<ProgressBar>,
}

impl<R: Read> ProgressReader<R> {
    pub(crate) fn new(inner: R, pb: Option<ProgressBar>) -> Self {
        Self { inner, pb }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if let Some(pb) = &self.pb {
            pb.inc(n as u64);
        }
        Ok(n)
    }
}

/// Largest id or count the store can hold; SQLite integers are signed 64-bit.
pub(crate) const MAX_STORED: u64 = i64::MAX as u64;

#[inline]
pub(crate) fn storable(v: u64) -> Option<u64> {
    (v <= MAX_STORED).then_some(v)
}

/// Parse a decimal id, rejecting values the store could not hold.
#[inline]
pub(crate) fn parse_id(s: &str) -> Option<u64> {
    s.trim().parse().ok().and_then(storable)
}
