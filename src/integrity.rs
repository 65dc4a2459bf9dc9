//! Decode-check compressed sources before a build reads them.

use crate::concurrency::for_each_file_limited;
use crate::paths::{SourceJob, SourceKind};
use crate::progress::make_count_progress;
use crate::zstd_stream::{quick_validate_zst, validate_zst_full};
use parking_lot::Mutex;
use std::path::PathBuf;

/// Mode for integrity checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntegrityMode {
    /// Decode only the first `sample_bytes` (decompressed) per file.
    /// Fast and catches early corruption; cannot detect late/trailing corruption.
    Quick { sample_bytes: u64 },
    /// Decode entire stream; slowest but most thorough (validates checksums).
    Full,
}

fn is_compressed(job: &SourceJob) -> bool {
    match job.kind {
        SourceKind::Archive { compressed } => compressed,
        SourceKind::DayLog { compressed, .. } => compressed,
    }
}

/// Check every compressed job and return `(path, error_message)` for each failure.
/// Plain-text sources are skipped. Progress ticks once per file.
pub fn check_sources(
    jobs: &[SourceJob],
    mode: IntegrityMode,
    file_concurrency: usize,
    progress: bool,
) -> Vec<(PathBuf, String)> {
    let files: Vec<SourceJob> = jobs.iter().filter(|j| is_compressed(j)).cloned().collect();
    let label = match mode {
        IntegrityMode::Quick { .. } => "Integrity (quick)",
        IntegrityMode::Full => "Integrity (full)",
    };
    let pb = if progress { Some(make_count_progress(files.len() as u64, label)) } else { None };

    let errors = Mutex::new(Vec::<(PathBuf, String)>::new());
    // The closure never fails; failures are collected instead.
    let _ = for_each_file_limited(&files, file_concurrency, |job| {
        let res = match mode {
            IntegrityMode::Quick { sample_bytes } => quick_validate_zst(&job.path, sample_bytes),
            IntegrityMode::Full => validate_zst_full(&job.path),
        };
        if let Err(e) = res {
            tracing::warn!(path = %job.path.display(), error = %e, "integrity check failed");
            errors.lock().push((job.path.clone(), format!("{e:#}")));
        }
        if let Some(pb) = &pb {
            pb.inc(1);
        }
        Ok(())
    });

    if let Some(pb) = pb {
        pb.finish_with_message("done");
    }
    let mut errors = errors.into_inner();
    errors.sort();
    errors
}
