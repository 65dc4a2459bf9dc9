//! Pipe-delimited identity dumps: one `id|name` line per guild, channel or user.
//! User lines may carry a third field with the internal id of a migrated account.

use super::{parse_id, ReadStats};
use crate::zstd_stream::for_each_line;
use anyhow::Result;
use std::path::Path;

/// One parsed dump line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DumpEntry {
    pub id: u64,
    pub name: String,
    pub internal_id: Option<u64>,
}

fn parse_line(line: &str, with_internal: bool) -> Option<DumpEntry> {
    let (id, rest) = line.split_once('|')?;
    let id = parse_id(id)?;
    if !with_internal {
        return Some(DumpEntry { id, name: rest.to_string(), internal_id: None });
    }
    let (name, internal_id) = match rest.rsplit_once('|') {
        Some((name, tail)) => match parse_id(tail) {
            Some(internal) => (name, Some(internal)),
            None => (rest, None),
        },
        None => (rest, None),
    };
    Some(DumpEntry { id, name: name.to_string(), internal_id })
}

/// Stream every entry of a dump file. Blank lines are ignored; lines that do not
/// parse are skipped and counted. With `with_internal`, a trailing numeric field
/// is taken as the internal id (user dumps only; names may contain `|`).
pub fn read_dump(
    path: &Path,
    with_internal: bool,
    read_buf_bytes: usize,
    mut on_entry: impl FnMut(DumpEntry),
) -> Result<ReadStats> {
    let mut stats = ReadStats { files: 1, ..Default::default() };
    for_each_line(path, false, read_buf_bytes, |line| {
        if line.trim().is_empty() {
            stats.empty += 1;
            return Ok(());
        }
        match parse_line(line, with_internal) {
            Some(entry) => {
                stats.records += 1;
                on_entry(entry);
            }
            None => {
                stats.malformed += 1;
                tracing::debug!(path = %path.display(), line, "skipping malformed dump line");
            }
        }
        Ok(())
    })?;
    Ok(stats)
}
