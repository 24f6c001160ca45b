//! Worker-pool plumbing shared by the fetch and transform stages.
//!
//! Both stages run one task per block number inside a [`JoinSet`], keeping at
//! most `concurrency` tasks in flight. On the first failure no new tasks are
//! started; tasks already in flight finish naturally and the first error is
//! the one surfaced to the caller.

use eyre::{Report, Result, bail, eyre};
use tokio::task::JoinSet;

/// Reject inverted ranges and zero concurrency before any I/O happens.
pub(crate) fn validate_range(start: u64, end: u64, concurrency: usize) -> Result<()> {
    if start > end {
        bail!("invalid block range: start {start} is past end {end}");
    }
    if concurrency == 0 {
        bail!("concurrency must be at least 1");
    }
    Ok(())
}

/// Wait for one task to finish and record its failure, keeping only the
/// first error seen.
pub(crate) async fn collect_next(
    tasks: &mut JoinSet<Result<()>>,
    first_error: &mut Option<Report>,
) {
    let Some(joined) = tasks.join_next().await else { return };
    let result = joined.unwrap_or_else(|err| Err(eyre!("indexing worker panicked: {err}")));
    if let Err(err) = result {
        first_error.get_or_insert(err);
    }
}
