use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use zstd::stream::read::Decoder;

use crate::sources::ProgressReader;
use crate::util::open_with_backoff;

// ----------------------------- Helpers for full-error logging ------------------------------------

/// Log a per-file decode failure that is skipped rather than propagated.
pub(crate) fn warn_decode_skip(path: &Path, e: &dyn std::fmt::Display) {
    let abs = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    tracing::warn!(
        path = %abs.display(),
        error = %e,
        "skipping remainder of frame after decode error; records read before the error are kept"
    );
}

// ----------------------------- Opening ------------------------------------

/// Open `path` for sequential reading, decoding zstd when `compressed` is set.
///
/// We request `window_log_max(31)` up front to avoid "Frame requires too much memory"
/// on frames produced with long-distance matching.
pub fn open_stream(
    path: &Path,
    compressed: bool,
    read_buf_bytes: usize,
    pb: Option<ProgressBar>,
) -> Result<Box<dyn BufRead>> {
    let file = open_with_backoff(path, 16, 50).with_context(|| format!("open {}", path.display()))?;
    let counted = ProgressReader::new(file, pb);
    if compressed {
        let mut decoder = Decoder::new(counted).with_context(|| format!("zstd init {}", path.display()))?;
        decoder.window_log_max(31)?;
        Ok(Box::new(BufReader::with_capacity(read_buf_bytes, decoder)))
    } else {
        Ok(Box::new(BufReader::with_capacity(read_buf_bytes, counted)))
    }
}

// ----------------------------- Streaming ----------------------------------

/// Stream newline-terminated lines (trailing `\r` stripped). Invalid UTF-8 is replaced.
pub fn for_each_line(
    path: &Path,
    compressed: bool,
    read_buf_bytes: usize,
    mut on_line: impl FnMut(&str) -> Result<()>,
) -> Result<()> {
    let mut reader = open_stream(path, compressed, read_buf_bytes, None)?;
    let mut buf = Vec::with_capacity(4 * 1024);
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        if buf.ends_with(b"\n") {
            buf.pop();
            if buf.ends_with(b"\r") {
                buf.pop();
            }
        }
        on_line(&String::from_utf8_lossy(&buf))?;
    }
    Ok(())
}

/// Stream NUL-separated records out of an already opened reader.
///
/// Returns `Err` only when the callback fails. A read error part-way through the
/// stream (typically a damaged frame) is returned as `Ok(Some(err))` so the caller
/// can keep what was already delivered.
pub fn for_each_nul_record<R: BufRead + ?Sized>(
    reader: &mut R,
    mut on_record: impl FnMut(&[u8]) -> Result<()>,
) -> Result<Option<io::Error>> {
    let mut buf = Vec::with_capacity(1024);
    loop {
        buf.clear();
        let n = match reader.read_until(0, &mut buf) {
            Ok(n) => n,
            Err(e) => return Ok(Some(e)),
        };
        if n == 0 {
            return Ok(None);
        }
        if buf.last() == Some(&0) {
            buf.pop();
        }
        on_record(&buf)?;
    }
}

// ----------------------------- Integrity checks ----------------------------------

/// QUICK check: attempt to decode up to `max_decompressed_bytes` and stop.
pub fn quick_validate_zst(path: &Path, max_decompressed_bytes: u64) -> Result<()> {
    let file = open_with_backoff(path, 16, 50)?;
    let mut decoder = Decoder::new(file)?;
    decoder.window_log_max(31)?;
    let mut limited = decoder.take(max_decompressed_bytes);
    io::copy(&mut limited, &mut io::sink())?;
    Ok(())
}

/// FULL check: decode the entire stream to EOF.
pub fn validate_zst_full(path: &Path) -> Result<()> {
    let file = open_with_backoff(path, 16, 50)?;
    let mut decoder = Decoder::new(file)?;
    decoder.window_log_max(31)?;
    io::copy(&mut decoder, &mut io::sink())?;
    Ok(())
}
