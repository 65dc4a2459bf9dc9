//! Swap a finished staging store into the live position.

use crate::staging::StagingStore;
use crate::util::replace_file_atomic_backoff;
use anyhow::{Context, Result};
use std::path::Path;

/// Make `staging` the live store at `live` with a single rename.
///
/// Until the rename succeeds the previous store is untouched. If anything fails
/// here the staging file is discarded when `staging` drops.
pub fn publish(mut staging: StagingStore, live: &Path) -> Result<()> {
    staging.close()?;
    replace_file_atomic_backoff(staging.path(), live)
        .with_context(|| format!("publish {}", live.display()))?;
    staging.keep();
    tracing::info!(path = %live.display(), "store published");
    Ok(())
}
