mod config;
mod date;
mod snowflake;
mod identity;
mod paths;
mod zstd_stream;
mod sources;

mod catalog;
mod aggregate;
mod concurrency;
mod staging;
mod publish;

mod query;
mod store;
mod corpus;

mod progress;
mod integrity;
mod util;
mod pipeline;

pub use crate::config::BuildOptions;
pub use crate::date::YearMonth;
pub use crate::pipeline::{BuildReport, ChatLogETL};
pub use crate::snowflake::{timestamp_of, unix_secs_of, HourBucket, DISCORD_EPOCH_MS};
pub use crate::identity::{IdentityReconciler, Registration, UserIdentity, UserRef};

// Raw sources and the uniform record they decode into.
pub use crate::paths::{discover_all, Discovered, SourceJob, SourceKind};
pub use crate::sources::{Moment, RawRecord, RawSource, ReadOptions, ReadStats, SourceReader};
pub use crate::sources::daylog::{parse_framed, FramedRecord};

// Aggregation and the store build.
pub use crate::aggregate::{aggregate_sources, Aggregator, HourlyCount, HourlyCounts, ResolvedRecord, SourceAccumulator};
pub use crate::catalog::{Catalog, Channel, Guild};
pub use crate::staging::{staging_path_for, StagingReport, StagingStore, SCHEMA};
pub use crate::publish::publish;

// Read-only query surface.
pub use crate::store::Store;
pub use crate::query::{ChannelEntry, HourOfDayCount, MonthCount, NamedId, ReportFilter, ShareRow, TopUser, TopUsersQuery};
pub use crate::corpus::{CorpusPlan, CorpusReport};

// Expose multiprogress and progress helpers.
pub use crate::progress::{set_global_multiprogress, make_count_progress, make_progress_bar_labeled};

// Expose integrity checker mode, and (optionally) direct zstd validators.
pub use crate::integrity::{check_sources, IntegrityMode};
pub use crate::zstd_stream::{quick_validate_zst, validate_zst_full};

//export robust file ops from util so binaries can import from crate root.
pub use crate::util::{open_with_backoff, remove_with_backoff, replace_file_atomic_backoff};
