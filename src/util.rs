use anyhow::{Context, Result};
use std::fs;
use std::fs::File;
use std::io;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

static INIT_ONCE: std::sync::Once = std::sync::Once::new();
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
    });
}

/// Configure the global rayon pool once; later calls are ignored by rayon.
pub fn init_thread_pool(parallelism: Option<usize>) {
    if let Some(n) = parallelism {
        if n > 0 {
            rayon::ThreadPoolBuilder::new().num_threads(n).build_global().ok();
        }
    }
}

// -------- robust open/rename with backoff (Windows-friendly) --------

/// Return true for transient/retriable I/O errors often seen on Windows when
/// filter drivers (AV/backup), USB/NAS volumes, or sharing violations occur.
fn is_retriable_io_error(e: &io::Error) -> bool {
    match e.raw_os_error() {
        // Common Windows transient codes:
        //   5   = Access is denied (often AV/share)
        //   32  = Sharing violation
        //   33  = Lock violation
        //   1224= The requested operation cannot be performed on a file with a user-mapped section open
        //   21  = Device not ready
        Some(5) | Some(32) | Some(33) | Some(1224) | Some(21) => true,
        _ => false,
    }
}

/// Open a file with retries/backoff for transient errors.
pub fn open_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    let mut last_err: Option<io::Error> = None;
    for i in 0..tries.max(1) {
        match File::open(path) {
            Ok(f) => return Ok(f),
            Err(e) if is_retriable_io_error(&e) => {
                last_err = Some(e);
                sleep(Duration::from_millis(delay_ms.saturating_mul((i + 1) as u64)));
                continue;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "open failed")))
}

/// Remove a file with retries/backoff for transient errors.
/// Succeeds if the file doesn't exist.
pub fn remove_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> Result<()> {
    let mut last_err: Option<io::Error> = None;
    for i in 0..tries.max(1) {
        match fs::remove_file(path) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) if is_retriable_io_error(&e) => {
                last_err = Some(e);
                sleep(Duration::from_millis(delay_ms.saturating_mul((i + 1) as u64)));
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "remove failed")))
        .with_context(|| format!("remove (retries) {}", path.display()))
}

/// Rename a file with retries/backoff for transient errors.
fn rename_with_backoff(src: &Path, dest: &Path, tries: usize, delay_ms: u64) -> Result<()> {
    let mut last_err: Option<io::Error> = None;
    for i in 0..tries.max(1) {
        match fs::rename(src, dest) {
            Ok(_) => return Ok(()),
            Err(e) if is_retriable_io_error(&e) => {
                last_err = Some(e);
                sleep(Duration::from_millis(delay_ms.saturating_mul((i + 1) as u64)));
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("rename {} -> {}", src.display(), dest.display())),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "rename failed")))
        .with_context(|| format!("rename (retries) {} -> {}", src.display(), dest.display()))
}

/// Atomically replace `dest` with `tmp` in one rename.
///
/// `dest` is never removed first and there is no copy fallback: until the rename
/// succeeds the old `dest` stays in place, and readers see either it or `tmp`.
/// Both paths must be on the same filesystem.
pub fn replace_file_atomic_backoff(tmp: &Path, dest: &Path) -> Result<()> {
    rename_with_backoff(tmp, dest, 20, 50)
}
