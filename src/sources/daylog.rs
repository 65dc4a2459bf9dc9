//! Per-day, per-channel framed logs.
//!
//! Each file is a single zstd frame. Decompressed, it is a run of NUL-separated
//! records, each `message_id|send_time|user_id|content`. Only the first three
//! fields are fixed; the content keeps any further `|`.

use super::{parse_id, Moment, RawRecord, ReadOptions, ReadStats, SourceReader};
use crate::identity::UserRef;
use crate::zstd_stream::{for_each_nul_record, open_stream, warn_decode_skip};
use anyhow::Result;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct DayLogSource {
    pub path: PathBuf,
    pub guild_id: u64,
    pub channel_id: u64,
    pub compressed: bool,
}

/// Fields of one framed record, borrowed from the decode buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct FramedRecord<'a> {
    pub message_id: u64,
    pub send_time: &'a str,
    pub user_id: u64,
    pub content: &'a str,
}

/// Split one record. `None` for anything that does not carry the three fixed fields.
pub fn parse_framed(record: &str) -> Option<FramedRecord<'_>> {
    let mut parts = record.splitn(4, '|');
    let message_id = parts.next().and_then(parse_id)?;
    let send_time = parts.next()?;
    let user_id = parts.next().and_then(parse_id)?;
    let content = parts.next().unwrap_or("");
    Some(FramedRecord { message_id, send_time, user_id, content })
}

impl SourceReader for DayLogSource {
    fn read_records(
        &self,
        opts: &ReadOptions,
        on_record: &mut dyn FnMut(RawRecord) -> Result<()>,
    ) -> Result<ReadStats> {
        let mut stats = ReadStats { files: 1, ..Default::default() };
        let mut reader = open_stream(&self.path, self.compressed, opts.read_buffer_bytes, opts.progress.clone())?;

        let failure = for_each_nul_record(&mut reader, |bytes| {
            if bytes.iter().all(|b| b.is_ascii_whitespace()) {
                stats.empty += 1;
                return Ok(());
            }
            let text = String::from_utf8_lossy(bytes);
            let Some(rec) = parse_framed(&text) else {
                stats.malformed += 1;
                tracing::debug!(path = %self.path.display(), "skipping malformed framed record");
                return Ok(());
            };
            stats.records += 1;
            on_record(RawRecord {
                channel_id: self.channel_id,
                guild_id: Some(self.guild_id),
                user: UserRef::external(rec.user_id),
                moment: Moment::Message(rec.message_id),
                count: 1,
                content: opts.with_content.then(|| rec.content.to_string()),
            })
        })?;

        if let Some(e) = failure {
            stats.corrupt_frames += 1;
            warn_decode_skip(&self.path, &e);
        }
        Ok(stats)
    }
}
