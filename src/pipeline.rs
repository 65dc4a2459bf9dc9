use crate::aggregate::{aggregate_sources, SourceAccumulator};
use crate::catalog::Catalog;
use crate::config::BuildOptions;
use crate::corpus::{write_training_corpus, CorpusPlan, CorpusReport};
use crate::identity::{IdentityReconciler, UserIdentity};
use crate::integrity::{check_sources, IntegrityMode};
use crate::paths::discover_all;
use crate::progress::{make_progress_bar_labeled, total_compressed_size};
use crate::publish::publish;
use crate::sources::identity::read_dump;
use crate::sources::{ReadOptions, ReadStats};
use crate::staging::{StagingReport, StagingStore};
use crate::store::Store;
use crate::util::{init_thread_pool, init_tracing_once};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};

#[derive(Clone, Default)]
pub struct ChatLogETL {
    pub(crate) opts: BuildOptions,
}

/// What a successful build read, skipped and wrote.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Archives and day logs.
    pub sources: ReadStats,
    /// Guild, channel and user dumps.
    pub dumps: ReadStats,
    /// Records without any user id.
    pub unresolved: u64,
    /// Conflicting identity rows dropped by the reconciler.
    pub duplicate_identities: u64,
    /// Sum of every stored count.
    pub messages: u64,
    pub store: StagingReport,
}

impl ChatLogETL {
    pub fn new() -> Self {
        Self { opts: BuildOptions::default() }
    }

    pub fn from_options(opts: BuildOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.opts
    }

    // -------- Builder methods --------
    pub fn raw_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_raw_dir(dir); self }
    pub fn store_path(mut self, path: impl AsRef<Path>) -> Self { self.opts = self.opts.with_store_path(path); self }
    pub fn parallelism(mut self, threads: usize) -> Self { self.opts = self.opts.with_parallelism(threads); self }
    pub fn file_concurrency(mut self, n: usize) -> Self { self.opts = self.opts.with_file_concurrency(n); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn progress_label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_progress_label(label); self }
    pub fn integrity(mut self, mode: Option<IntegrityMode>) -> Self { self.opts = self.opts.with_integrity(mode); self }
    pub fn io_read_buffer(mut self, bytes: usize) -> Self { self.opts = self.opts.with_io_read_buffer(bytes); self }
    pub fn io_write_buffer(mut self, bytes: usize) -> Self { self.opts = self.opts.with_io_write_buffer(bytes); self }
    pub fn env_overrides(mut self) -> Self { self.opts = self.opts.with_env_overrides(); self }

    // -------- Operations --------

    /// Rebuild the store from the raw directory and publish it.
    ///
    /// The live store is only touched by the final rename; any earlier error leaves
    /// it as it was and discards the staging file.
    pub fn build(&self) -> Result<BuildReport> {
        init_tracing_once();
        init_thread_pool(self.opts.parallelism);
        let opts = &self.opts;
        let read_buf = opts.read_buffer_bytes;

        let discovered = discover_all(opts);
        if !discovered.guilds_file.is_file() {
            bail!("guild dump not found at {}", discovered.guilds_file.display());
        }
        if discovered.jobs.is_empty() {
            tracing::warn!("No source files found. Check raw_dir ({}).", opts.raw_dir.display());
        } else {
            tracing::info!("Planned {} source files for processing.", discovered.jobs.len());
        }

        if let Some(mode) = opts.integrity {
            let failures = check_sources(&discovered.jobs, mode, opts.file_concurrency, opts.progress);
            if let Some((path, err)) = failures.first() {
                bail!(
                    "{} source file(s) failed the integrity check; first: {}: {}",
                    failures.len(),
                    path.display(),
                    err
                );
            }
        }

        let mut report = BuildReport::default();

        // Identity dumps first, so dump names win over ids seen only in data.
        let mut catalog = Catalog::new();
        report.dumps += read_dump(&discovered.guilds_file, false, read_buf, |e| catalog.add_guild(e.id, &e.name))
            .with_context(|| format!("reading {}", discovered.guilds_file.display()))?;
        for dump in &discovered.channel_dumps {
            report.dumps += read_dump(&dump.path, false, read_buf, |e| catalog.add_channel(e.id, dump.guild_id, &e.name))
                .with_context(|| format!("reading {}", dump.path.display()))?;
        }
        let mut reconciler = IdentityReconciler::new();
        for path in &discovered.user_dumps {
            report.dumps += read_dump(path, true, read_buf, |e| {
                match e.internal_id {
                    Some(internal_id) => reconciler.register(UserIdentity {
                        internal_id,
                        external_id: e.id,
                        display_name: Some(e.name),
                    }),
                    None => reconciler.register_external(e.id, &e.name),
                };
            })
            .with_context(|| format!("reading {}", path.display()))?;
        }
        tracing::info!(
            guilds = catalog.guilds().count(),
            channels = catalog.channels().count(),
            users = reconciler.len(),
            "identity dumps loaded"
        );

        let pb = if opts.progress {
            let label = opts.progress_label.as_deref().unwrap_or("Aggregating sources");
            Some(make_progress_bar_labeled(total_compressed_size(&discovered.jobs), Some(label)))
        } else {
            None
        };
        let read_opts = ReadOptions { read_buffer_bytes: read_buf, with_content: false, progress: pb.clone() };
        let SourceAccumulator { counts, channel_guilds, stats, unresolved } =
            aggregate_sources(&discovered.jobs, opts.file_concurrency, &read_opts)?;
        if let Some(pb) = pb {
            pb.finish_with_message("Aggregation done");
        }
        let counts = counts.resolve_users(&mut reconciler);

        for (&channel_id, &guild_id) in &channel_guilds {
            catalog.observe_channel(channel_id, guild_id);
        }
        for channel_id in counts.channel_ids() {
            if catalog.guild_of(channel_id).is_none() {
                tracing::warn!(channel_id, "counts for a channel with no known guild; kept without a channel row");
            }
        }

        report.sources = stats;
        report.unresolved = unresolved;
        report.duplicate_identities = reconciler.duplicates();
        report.messages = counts.total();
        tracing::info!(
            files = stats.files,
            records = stats.records,
            malformed = stats.malformed,
            empty = stats.empty,
            corrupt_frames = stats.corrupt_frames,
            unresolved,
            triples = counts.triples(),
            messages = report.messages,
            "aggregation finished"
        );

        let mut staging = StagingStore::create(&opts.store_path)?;
        report.store = staging.write_all(&catalog, &reconciler, &counts, opts.progress)?;
        publish(staging, &opts.store_path)?;
        tracing::info!(
            guilds = report.store.guilds,
            channels = report.store.channels,
            users = report.store.users,
            months = report.store.months,
            rows = report.store.rows,
            rejected_rows = report.store.rejected_rows,
            duplicate_identities = report.duplicate_identities,
            "build finished"
        );
        Ok(report)
    }

    /// Check every compressed source without building. Returns `(path, error)` per
    /// failing file.
    pub fn check_integrity(&self, mode: IntegrityMode) -> Result<Vec<(PathBuf, String)>> {
        init_tracing_once();
        init_thread_pool(self.opts.parallelism);
        let discovered = discover_all(&self.opts);
        Ok(check_sources(&discovered.jobs, mode, self.opts.file_concurrency, self.opts.progress))
    }

    /// Open the published store for queries.
    pub fn open_store(&self) -> Result<Store> {
        Store::open(&self.opts.store_path)
    }

    /// Write `<out_dir>/<guild_id>.txt` with the bodies of each guild's `limit` most
    /// active users, restricted to the trailing `window`.
    pub fn training_corpus(&self, out_dir: impl AsRef<Path>, window: Option<Duration>, limit: usize) -> Result<CorpusReport> {
        self.training_corpus_at(out_dir, window, limit, OffsetDateTime::now_utc())
    }

    /// `training_corpus` with an explicit reference time for the window.
    pub fn training_corpus_at(
        &self,
        out_dir: impl AsRef<Path>,
        window: Option<Duration>,
        limit: usize,
        now: OffsetDateTime,
    ) -> Result<CorpusReport> {
        init_tracing_once();
        init_thread_pool(self.opts.parallelism);
        let plan = CorpusPlan { window, limit, now: Some(now) };
        write_training_corpus(&self.opts, out_dir.as_ref(), &plan)
    }
}
