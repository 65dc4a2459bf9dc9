//! Concurrency helpers: limit the number of source files decoded in parallel.

use crate::paths::SourceJob;
use anyhow::Result;
use rayon::prelude::*;

/// Limit parallelism across source files: at most `limit` decoders in flight.
pub fn for_each_file_limited<F>(files: &[SourceJob], limit: usize, f: F) -> Result<()>
where
    F: Sync + Fn(&SourceJob) -> Result<()>,
{
    if limit <= 1 {
        for job in files {
            f(job)?;
        }
        return Ok(());
    }
    for chunk in files.chunks(limit) {
        chunk.par_iter().try_for_each(|job| f(job))?;
    }
    Ok(())
}

/// Map every file to a partial result (at most `limit` at once) and fold the partials
/// into one value in file order.
pub fn fold_files_limited<T, F, M>(files: &[SourceJob], limit: usize, map: F, mut merge: M) -> Result<T>
where
    T: Send + Default,
    F: Sync + Fn(&SourceJob) -> Result<T>,
    M: FnMut(&mut T, T),
{
    let mut total = T::default();
    if limit <= 1 {
        for job in files {
            let part = map(job)?;
            merge(&mut total, part);
        }
        return Ok(total);
    }
    for chunk in files.chunks(limit) {
        let parts = chunk.par_iter().map(|job| map(job)).collect::<Result<Vec<_>>>()?;
        for part in parts {
            merge(&mut total, part);
        }
    }
    Ok(total)
}
