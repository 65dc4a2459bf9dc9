use crate::integrity::IntegrityMode;
use std::path::{Path, PathBuf};

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct BuildOptions {
    pub raw_dir: PathBuf,
    pub guilds_file: PathBuf,         // raw_dir/guilds.txt (required)
    pub channels_dir: PathBuf,        // raw_dir/channels/<guild_id>.txt
    pub users_dir: PathBuf,           // raw_dir/users/*.txt
    pub archives_dir: PathBuf,        // raw_dir/archives/*.csv[.zst]
    pub logs_dir: PathBuf,            // raw_dir/logs/<guild>/<channel>/<day>[.zst]
    pub store_path: PathBuf,          // live store, replaced atomically on success
    pub parallelism: Option<usize>,   // Some(N) to set rayon threads, None to use default
    pub file_concurrency: usize,      // limit number of source files decoded concurrently
    pub progress: bool,               // show progress bar
    pub progress_label: Option<String>,
    pub integrity: Option<IntegrityMode>, // decode-check compressed sources before building

    // IO tuning
    pub read_buffer_bytes: usize,     // BufReader capacity
    pub write_buffer_bytes: usize,    // BufWriter capacity (corpus output)
}

impl Default for BuildOptions {
    fn default() -> Self {
        let default_read = 256 * 1024;
        let default_write = 256 * 1024;

        Self::for_raw_dir(PathBuf::from("./raw"), PathBuf::from("./ddd.db"), default_read, default_write)
    }
}

impl BuildOptions {
    fn for_raw_dir(raw: PathBuf, store_path: PathBuf, read: usize, write: usize) -> Self {
        Self {
            guilds_file: raw.join("guilds.txt"),
            channels_dir: raw.join("channels"),
            users_dir: raw.join("users"),
            archives_dir: raw.join("archives"),
            logs_dir: raw.join("logs"),
            raw_dir: raw,
            store_path,
            parallelism: None,
            file_concurrency: 4,
            progress: true,
            progress_label: None,
            integrity: None,
            read_buffer_bytes: read,
            write_buffer_bytes: write,
        }
    }

    pub fn with_raw_dir(self, raw_dir: impl AsRef<Path>) -> Self {
        let mut next = Self::for_raw_dir(
            raw_dir.as_ref().to_path_buf(),
            self.store_path,
            self.read_buffer_bytes,
            self.write_buffer_bytes,
        );
        next.parallelism = self.parallelism;
        next.file_concurrency = self.file_concurrency;
        next.progress = self.progress;
        next.progress_label = self.progress_label;
        next.integrity = self.integrity;
        next
    }
    pub fn with_store_path(mut self, path: impl AsRef<Path>) -> Self {
        self.store_path = path.as_ref().to_path_buf();
        self
    }
    pub fn with_parallelism(mut self, threads: usize) -> Self {
        self.parallelism = Some(threads);
        self
    }
    pub fn with_file_concurrency(mut self, n: usize) -> Self {
        self.file_concurrency = n.max(1);
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }
    pub fn with_integrity(mut self, mode: Option<IntegrityMode>) -> Self {
        self.integrity = mode;
        self
    }

    // IO buffers tuning
    pub fn with_io_read_buffer(mut self, bytes: usize) -> Self {
        self.read_buffer_bytes = bytes.max(8 * 1024);
        self
    }
    pub fn with_io_write_buffer(mut self, bytes: usize) -> Self {
        self.write_buffer_bytes = bytes.max(8 * 1024);
        self
    }

    /// Apply `DDD_RAW_DIR`, `DDD_STORE`, `DDD_PARALLELISM` and `DDD_FILE_CONCURRENCY`.
    /// Unparseable numbers are ignored with a warning.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("DDD_RAW_DIR") {
            if !dir.trim().is_empty() {
                self = self.with_raw_dir(dir.trim());
            }
        }
        if let Ok(store) = std::env::var("DDD_STORE") {
            if !store.trim().is_empty() {
                self = self.with_store_path(store.trim());
            }
        }
        if let Some(n) = env_usize("DDD_PARALLELISM") {
            self = self.with_parallelism(n);
        }
        if let Some(n) = env_usize("DDD_FILE_CONCURRENCY") {
            self = self.with_file_concurrency(n);
        }
        self
    }
}

fn env_usize(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!("{} is set but is not a number: {}", key, raw);
            None
        }
    }
}
