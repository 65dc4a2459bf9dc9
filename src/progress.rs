//! Progress reporting: byte-based bars over source files and count-based bars over rows.

use crate::paths::SourceJob;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::fs;
use std::sync::{Arc, OnceLock};

/// Optional global MultiProgress that allows multiple bars to render concurrently.
/// If unset, progress bars draw to the default terminal target.
static GLOBAL_MP: OnceLock<Arc<MultiProgress>> = OnceLock::new();

/// Install a global MultiProgress used by all subsequently created progress bars.
/// Safe to call once; additional calls are ignored.
pub fn set_global_multiprogress(mp: Arc<MultiProgress>) {
    let _ = GLOBAL_MP.set(mp);
}

fn new_bar(total: u64) -> ProgressBar {
    if let Some(mp) = GLOBAL_MP.get() {
        mp.add(ProgressBar::new(total))
    } else {
        ProgressBar::new(total)
    }
}

fn styled(pb: ProgressBar, template: &str) -> ProgressBar {
    match ProgressStyle::with_template(template) {
        Ok(style) => pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  ")),
        Err(e) => tracing::debug!(error = %e, "progress template rejected; using default style"),
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Bytes-read bar over on-disk (possibly compressed) input.
pub fn make_progress_bar_labeled(total_bytes: u64, label: Option<&str>) -> ProgressBar {
    let pb = styled(
        new_bar(total_bytes),
        "{spinner:.green} {msg} {bytes:>10}/{total_bytes:<10} [{bar:.cyan/blue}] {percent:>3}%  \
         {bytes_per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}",
    );
    if let Some(msg) = label {
        pb.set_message(msg.to_string());
    }
    pb
}

/// Count-style progress bar (items processed out of total), with an optional label.
pub fn make_count_progress(total: u64, label: &str) -> ProgressBar {
    let pb = styled(
        new_bar(total),
        "{spinner:.green} {msg} {pos}/{len} [{bar:.cyan/blue}] {percent:>3}%  \
         it/s: {per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}",
    );
    if !label.is_empty() {
        pb.set_message(label.to_string());
    }
    pb
}

/// Sum of on-disk sizes; unreadable files count as zero.
pub fn total_compressed_size(files: &[SourceJob]) -> u64 {
    files
        .iter()
        .map(|j| fs::metadata(&j.path).map(|m| m.len()).unwrap_or(0))
        .sum()
}
