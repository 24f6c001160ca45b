//! Transform stage: read raw blocks back from the store, run the transform
//! registry over each one and flush the derived mutations.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use clickhouse::{ColumnStore, MutationTarget};
use eyre::{Context, Result, eyre};
use primitives::BulkMutations;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::{
    pool,
    transforms::{SignalCache, Transform},
};

const PROGRESS_EVERY: u64 = 500;

/// Transform every block in `[start, end]` with at most `concurrency` blocks
/// in flight. Blocks are read from the blocks table; a missing block is
/// fatal, the fetch stage must have covered the range first.
///
/// A transform's own failure only discards that transform's contribution for
/// that block. A store write failure aborts the whole range: retrying at the
/// block level is pointless once the store is unavailable.
pub async fn index_from_store<S>(
    store: Arc<S>,
    start: u64,
    end: u64,
    transforms: Arc<Vec<Box<dyn Transform>>>,
    concurrency: usize,
) -> Result<()>
where
    S: ColumnStore + ?Sized + 'static,
{
    pool::validate_range(start, end, concurrency)?;
    info!(start, end, concurrency, transforms = transforms.len(), "transforming stored blocks");

    // One signal cache per invocation: deduplication never leaks across runs.
    let cache = Arc::new(SignalCache::with_defaults());
    let started = Instant::now();
    let completed = Arc::new(AtomicU64::new(0));
    let mut tasks: JoinSet<Result<()>> = JoinSet::new();
    let mut first_error = None;

    for number in start..=end {
        while tasks.len() >= concurrency && first_error.is_none() {
            pool::collect_next(&mut tasks, &mut first_error).await;
        }
        if first_error.is_some() {
            break;
        }

        let store = Arc::clone(&store);
        let transforms = Arc::clone(&transforms);
        let cache = Arc::clone(&cache);
        let completed = Arc::clone(&completed);
        tasks.spawn(async move {
            transform_block(&*store, &transforms, &cache, number).await?;

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if done % PROGRESS_EVERY == 0 {
                info!(
                    blocks = done,
                    blocks_per_sec =
                        format!("{:.1}", done as f64 / started.elapsed().as_secs_f64()),
                    "transform progress"
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
        "block range transformed"
    );
    Ok(())
}

async fn transform_block<S>(
    store: &S,
    transforms: &[Box<dyn Transform>],
    cache: &SignalCache,
    number: u64,
) -> Result<()>
where
    S: ColumnStore + ?Sized,
{
    let block = store
        .get_block(number)
        .await?
        .ok_or_else(|| eyre!("block {number} is not in the blocks table; fetch it first"))?;

    let mut data = BulkMutations::new();
    let mut metadata = BulkMutations::new();
    for transform in transforms {
        match transform.apply(&block, cache) {
            Ok((block_data, block_metadata)) => {
                data.extend(block_data);
                metadata.extend(block_metadata);
            }
            Err(err) => warn!(
                block = number,
                transform = transform.name(),
                error = %err,
                "transform failed, skipping its output for this block"
            ),
        }
    }

    if !data.is_empty() {
        store
            .write_bulk(&data, MutationTarget::Data)
            .await
            .wrap_err_with(|| format!("Failed to write data rows for block {number}"))?;
    }
    if !metadata.is_empty() {
        store
            .write_bulk(&metadata, MutationTarget::MetadataUpdates)
            .await
            .wrap_err_with(|| format!("Failed to write metadata updates for block {number}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, U256};
    use clickhouse::mem::MemStore;
    use eyre::bail;
    use primitives::Block;

    use crate::{support, transforms::registry};

    use super::*;

    struct BrokenTransform;

    impl Transform for BrokenTransform {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn prefix(&self) -> &'static str {
            "BROKEN:"
        }

        fn apply(
            &self,
            _block: &Block,
            _cache: &SignalCache,
        ) -> Result<(BulkMutations, BulkMutations)> {
            bail!("scripted transform failure")
        }
    }

    async fn store_with_chain(head: u64) -> Arc<MemStore> {
        let store = Arc::new(MemStore::default());
        for number in 0..=head {
            store.save_block(&support::sample_block(number)).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn derives_rows_for_every_block() {
        let store = store_with_chain(9).await;

        index_from_store(Arc::clone(&store), 0, 9, Arc::new(registry()), 4).await.unwrap();

        let keys = store.data_keys();
        assert!(keys.contains(&"B:000000000000".to_owned()));
        assert!(keys.contains(&"B:000000000009".to_owned()));
        assert_eq!(store.get_last_watermark(clickhouse::BlockTable::Data).await.unwrap(), Some(9));
    }

    #[tokio::test]
    async fn a_missing_block_is_fatal() {
        let store = store_with_chain(5).await;
        store.remove_block(3);

        let err = index_from_store(Arc::clone(&store), 0, 5, Arc::new(registry()), 2)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("block 3"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn a_broken_transform_does_not_poison_the_block() {
        let store = store_with_chain(2).await;
        let transforms: Vec<Box<dyn Transform>> =
            vec![Box::new(BrokenTransform), Box::new(crate::transforms::BlockTransform)];

        index_from_store(Arc::clone(&store), 0, 2, Arc::new(transforms), 2).await.unwrap();

        // The healthy transform's rows still landed.
        assert!(store.data_keys().contains(&"B:000000000001".to_owned()));
    }

    #[tokio::test]
    async fn empty_batches_never_reach_the_store() {
        let store = store_with_chain(3).await;
        let transforms: Vec<Box<dyn Transform>> = vec![];

        index_from_store(Arc::clone(&store), 0, 3, Arc::new(transforms), 2).await.unwrap();

        assert_eq!(store.data_write_calls(), 0);
        assert_eq!(store.metadata_write_calls(), 0);
    }

    #[tokio::test]
    async fn signal_deduplication_is_per_invocation() {
        let from = Address::repeat_byte(0x11);
        let to = Address::repeat_byte(0x22);
        let store = Arc::new(MemStore::default());
        let mut block = support::sample_block(0);
        block.transactions = vec![support::transaction(0, from, Some(to), U256::from(5u64))];
        store.save_block(&block).await.unwrap();

        index_from_store(Arc::clone(&store), 0, 0, Arc::new(registry()), 1).await.unwrap();
        index_from_store(Arc::clone(&store), 0, 0, Arc::new(registry()), 1).await.unwrap();

        // A fresh cache per invocation means the second run enqueues the same
        // signals again rather than considering them already sent.
        assert_eq!(store.metadata_write_calls(), 2);
        assert_eq!(store.pending_metadata().len(), 2);
    }

    #[tokio::test]
    async fn a_failing_write_aborts_the_range() {
        let store = store_with_chain(4).await;
        store.fail_writes(true);

        let err = index_from_store(Arc::clone(&store), 0, 4, Arc::new(registry()), 2)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to write"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn inverted_ranges_fail_before_any_read() {
        let store = Arc::new(MemStore::default());
        assert!(index_from_store(store, 7, 2, Arc::new(registry()), 2).await.is_err());
    }
}
