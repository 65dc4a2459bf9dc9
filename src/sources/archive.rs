//! Delimited archives: a header row, then either one row per message
//! (`message_id`, a user id) or one row per pre-aggregated hour (`hour`, `count`).

use super::{storable, Moment, RawRecord, ReadOptions, ReadStats, SourceReader};
use crate::identity::UserRef;
use crate::snowflake::HourBucket;
use crate::zstd_stream::open_stream;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct ArchiveSource {
    pub path: PathBuf,
    pub compressed: bool,
}

/// Recognised columns. Anything else in the header is ignored.
#[derive(Debug, Deserialize)]
struct ArchiveRow {
    channel_id: u64,
    guild_id: Option<u64>,
    message_id: Option<u64>,
    user_id: Option<u64>,
    int_user_id: Option<u64>,
    hour: Option<String>,
    count: Option<u64>,
    content: Option<String>,
}

/// Which row shapes the header can carry.
#[derive(Clone, Copy, Debug)]
struct HeaderShape {
    per_message: bool,
    pre_aggregated: bool,
}

fn inspect_header(headers: &csv::StringRecord) -> Result<HeaderShape> {
    let has = |name: &str| headers.iter().any(|h| h.trim() == name);
    if !has("channel_id") {
        bail!("archive header has no channel_id column");
    }
    if !has("user_id") && !has("int_user_id") {
        bail!("archive header has neither user_id nor int_user_id");
    }
    let shape = HeaderShape {
        per_message: has("message_id"),
        pre_aggregated: has("hour") && has("count"),
    };
    if !shape.per_message && !shape.pre_aggregated {
        bail!("archive header has neither message_id nor hour+count");
    }
    Ok(shape)
}

// `None` when a present value is out of the storable range.
fn optional_storable(v: Option<u64>) -> Option<Option<u64>> {
    match v {
        Some(v) => storable(v).map(Some),
        None => Some(None),
    }
}

impl ArchiveRow {
    /// `None` for rows the store could not represent: no user, no usable moment,
    /// or an id or count above the signed 64-bit range.
    fn into_record(self, with_content: bool) -> Option<RawRecord> {
        let channel_id = storable(self.channel_id)?;
        let guild_id = optional_storable(self.guild_id)?;
        let user = UserRef {
            internal: optional_storable(self.int_user_id)?,
            external: optional_storable(self.user_id)?,
        };
        if user.internal.is_none() && user.external.is_none() {
            return None;
        }
        let (moment, count) = match (optional_storable(self.message_id)?, self.hour.as_deref(), self.count) {
            (Some(id), _, _) => (Moment::Message(id), 1),
            (None, Some(label), Some(count)) => (Moment::Hour(HourBucket::parse_label(label)?), storable(count)?),
            _ => return None,
        };
        Some(RawRecord {
            channel_id,
            guild_id,
            user,
            moment,
            count,
            content: if with_content { self.content } else { None },
        })
    }
}

impl SourceReader for ArchiveSource {
    fn read_records(
        &self,
        opts: &ReadOptions,
        on_record: &mut dyn FnMut(RawRecord) -> Result<()>,
    ) -> Result<ReadStats> {
        let stream = open_stream(&self.path, self.compressed, opts.read_buffer_bytes, opts.progress.clone())?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(stream);

        // An archive whose header cannot be decoded is unusable as a whole.
        let headers = reader
            .headers()
            .with_context(|| format!("read archive header {}", self.path.display()))?
            .clone();
        let shape = inspect_header(&headers).with_context(|| format!("archive {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), ?shape, "reading archive");

        let mut stats = ReadStats { files: 1, ..Default::default() };
        let mut raw = csv::StringRecord::new();
        loop {
            match reader.read_record(&mut raw) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) if e.is_io_error() => {
                    return Err(e).with_context(|| format!("decode archive {}", self.path.display()));
                }
                Err(e) => {
                    stats.malformed += 1;
                    tracing::debug!(path = %self.path.display(), error = %e, "skipping malformed archive row");
                    continue;
                }
            }
            let row: ArchiveRow = match raw.deserialize(Some(&headers)) {
                Ok(row) => row,
                Err(e) => {
                    stats.malformed += 1;
                    tracing::debug!(path = %self.path.display(), error = %e, "skipping malformed archive row");
                    continue;
                }
            };
            match row.into_record(opts.with_content) {
                Some(rec) => {
                    stats.records += 1;
                    on_record(rec)?;
                }
                None => {
                    stats.malformed += 1;
                }
            }
        }
        Ok(stats)
    }
}
