//! Perpetual sync loop: compare the node head against the stored watermarks
//! and re-drive the fetch and transform stages on a fixed cadence.

use std::{sync::Arc, time::Duration};

use clickhouse::{BlockTable, ColumnStore};
use extractor::NodeClient;
use eyre::Result;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::{fetcher::index_from_node, pipeline::index_from_store, transforms::Transform};

/// Tuning knobs of the sync loop.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Trailing blocks re-fetched every cycle to absorb reorgs near the tip.
    pub blocks_offset: u64,
    /// Trailing blocks re-transformed every cycle.
    pub data_offset: u64,
    /// Concurrency bound of the fetch stage.
    pub blocks_concurrency: usize,
    /// Concurrency bound of the transform stage.
    pub data_concurrency: usize,
    /// Pause between cycles.
    pub interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            blocks_offset: 100,
            data_offset: 1000,
            blocks_concurrency: 30,
            data_concurrency: 30,
            interval: Duration::from_secs(14),
        }
    }
}

/// One sync cycle: read the three watermarks and run whichever stages are
/// behind the node head. Re-indexing the trailing offset window is the
/// reorg-tolerance mechanism; overwriting those rows is idempotent.
pub async fn sync_once<N, S>(
    node: &Arc<N>,
    store: &Arc<S>,
    transforms: &Arc<Vec<Box<dyn Transform>>>,
    config: &SyncConfig,
) -> Result<()>
where
    N: NodeClient + ?Sized + 'static,
    S: ColumnStore + ?Sized + 'static,
{
    let head = node.get_latest_block_number().await?;
    let blocks_watermark = store.get_last_watermark(BlockTable::Blocks).await?;
    let data_watermark = store.get_last_watermark(BlockTable::Data).await?;
    debug!(head, ?blocks_watermark, ?data_watermark, "sync cycle watermarks");

    if blocks_watermark.is_none_or(|mark| mark < head) {
        let start = blocks_watermark.map_or(0, |mark| mark.saturating_sub(config.blocks_offset));
        info!(start, end = head, "blocks table is behind the node head");
        index_from_node(
            Arc::clone(node),
            Arc::clone(store),
            start,
            head,
            config.blocks_concurrency,
        )
        .await?;
    }

    if data_watermark.is_none_or(|mark| mark < head) {
        let start = data_watermark.map_or(0, |mark| mark.saturating_sub(config.data_offset));
        info!(start, end = head, "data table is behind the node head");
        index_from_store(
            Arc::clone(store),
            start,
            head,
            Arc::clone(transforms),
            config.data_concurrency,
        )
        .await?;
    }

    Ok(())
}

/// Run sync cycles until a fatal error. Termination is external: the process
/// is shut down by signal, and crash recovery is the orchestration layer's
/// job.
pub async fn run_sync<N, S>(
    node: Arc<N>,
    store: Arc<S>,
    transforms: Arc<Vec<Box<dyn Transform>>>,
    config: SyncConfig,
) -> Result<()>
where
    N: NodeClient + ?Sized + 'static,
    S: ColumnStore + ?Sized + 'static,
{
    info!(interval = ?config.interval, "starting the sync loop");
    loop {
        sync_once(&node, &store, &transforms, &config).await?;
        sleep(config.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use clickhouse::{MutationTarget, mem::MemStore, rowkey::block_row_key};
    use primitives::{BulkMutations, Mutation};

    use crate::{support, support::MockNode, transforms::registry};

    use super::*;

    #[tokio::test]
    async fn offsets_rewind_the_fetch_window() {
        let node = Arc::new(MockNode::with_chain(1000));
        let store = Arc::new(MemStore::default());
        // Blocks table caught up to 990, data table to 990 as well.
        store.save_block(&support::sample_block(990)).await.unwrap();
        let mut batch = BulkMutations::new();
        batch.push(block_row_key(990), Mutation::new().set_cell("b", "hash", "0x00"));
        store.write_bulk(&batch, MutationTarget::Data).await.unwrap();

        let config = SyncConfig {
            blocks_offset: 100,
            data_offset: 50,
            blocks_concurrency: 8,
            data_concurrency: 8,
            ..SyncConfig::default()
        };
        sync_once(&node, &store, &Arc::new(registry()), &config).await.unwrap();

        let fetched = node.fetched();
        assert_eq!(fetched.iter().min(), Some(&890));
        assert_eq!(fetched.iter().max(), Some(&1000));
        assert_eq!(fetched.len(), 111);

        // The transform stage caught the data table up to the head.
        assert_eq!(store.get_last_watermark(BlockTable::Data).await.unwrap(), Some(1000));
    }

    #[tokio::test]
    async fn empty_tables_backfill_from_genesis() {
        let node = Arc::new(MockNode::with_chain(25));
        let store = Arc::new(MemStore::default());

        sync_once(&node, &store, &Arc::new(registry()), &SyncConfig::default()).await.unwrap();

        assert_eq!(store.block_numbers().len(), 26);
        assert_eq!(store.get_last_watermark(BlockTable::Blocks).await.unwrap(), Some(25));
    }

    #[tokio::test]
    async fn a_caught_up_store_triggers_nothing() {
        let node = Arc::new(MockNode::with_chain(10));
        let store = Arc::new(MemStore::default());
        for number in 0..=10 {
            store.save_block(&support::sample_block(number)).await.unwrap();
        }
        let mut batch = BulkMutations::new();
        batch.push(block_row_key(10), Mutation::new().set_cell("b", "hash", "0x00"));
        store.write_bulk(&batch, MutationTarget::Data).await.unwrap();
        let data_writes_before = store.data_write_calls();

        sync_once(&node, &store, &Arc::new(registry()), &SyncConfig::default()).await.unwrap();

        assert!(node.fetched().is_empty());
        assert_eq!(store.data_write_calls(), data_writes_before);
    }
}
