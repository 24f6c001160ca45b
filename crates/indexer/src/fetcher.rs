//! Node fetch stage: pull a contiguous block range from the node and persist
//! each raw block into the blocks table.

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use clickhouse::ColumnStore;
use extractor::NodeClient;
use eyre::{Context, Result};
use primitives::FetchTimings;
use tokio::task::JoinSet;
use tracing::info;

use crate::pool;

const PROGRESS_EVERY: u64 = 100;

/// Fetch every block in `[start, end]` from `node` and store it, with at
/// most `concurrency` blocks in flight. Fails fast on the first fetch or
/// store error; blocks already stored stay stored, which is safe because
/// re-indexing a number overwrites its row wholesale.
pub async fn index_from_node<N, S>(
    node: Arc<N>,
    store: Arc<S>,
    start: u64,
    end: u64,
    concurrency: usize,
) -> Result<()>
where
    N: NodeClient + ?Sized + 'static,
    S: ColumnStore + ?Sized + 'static,
{
    pool::validate_range(start, end, concurrency)?;
    info!(start, end, concurrency, "indexing blocks from node");

    let started = Instant::now();
    let completed = Arc::new(AtomicU64::new(0));
    let timings = Arc::new(Mutex::new(FetchTimings::default()));
    let mut tasks: JoinSet<Result<()>> = JoinSet::new();
    let mut first_error = None;

    for number in start..=end {
        while tasks.len() >= concurrency && first_error.is_none() {
            pool::collect_next(&mut tasks, &mut first_error).await;
        }
        if first_error.is_some() {
            break;
        }

        let node = Arc::clone(&node);
        let store = Arc::clone(&store);
        let completed = Arc::clone(&completed);
        let timings = Arc::clone(&timings);
        tasks.spawn(async move {
            let (block, fetch) = node.get_block(number).await?;
            store
                .save_block(&block)
                .await
                .wrap_err_with(|| format!("Failed to store block {number}"))?;

            timings.lock().unwrap_or_else(PoisonError::into_inner).add(&fetch);
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if done % PROGRESS_EVERY == 0 {
                let spent = *timings.lock().unwrap_or_else(PoisonError::into_inner);
                info!(
                    blocks = done,
                    blocks_per_sec =
                        format!("{:.1}", done as f64 / started.elapsed().as_secs_f64()),
                    fetch_timings = ?spent,
                    "block fetch progress"
                );
            }
            Ok(())
        });
    }

    while !tasks.is_empty() {
        pool::collect_next(&mut tasks, &mut first_error).await;
    }
    if let Some(err) = first_error {
        return Err(err);
    }

    info!(
        blocks = completed.load(Ordering::Relaxed),
        elapsed = ?started.elapsed(),
        "block range stored"
    );
    Ok(())
}
