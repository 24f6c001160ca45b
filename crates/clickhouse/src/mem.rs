//! In-memory [`ColumnStore`] used by pipeline tests. Mirrors the persistence
//! semantics of the real store: overwrite-by-key, watermarks derived from
//! stored rows, processed flags on metadata signals.

use std::{
    collections::BTreeMap,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use eyre::{Result, bail, eyre};
use primitives::{Block, BulkMutations, Cell};

use crate::{BlockTable, ColumnStore, MutationTarget, rowkey};

/// In-memory column store. All operations are synchronous under the hood;
/// the async trait surface matches the real client.
#[derive(Debug, Default)]
pub struct MemStore {
    blocks: Mutex<BTreeMap<u64, Block>>,
    data: Mutex<BTreeMap<String, Vec<Cell>>>,
    metadata: Mutex<BTreeMap<String, bool>>,
    data_writes: AtomicUsize,
    metadata_writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemStore {
    /// New empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `write_bulk` fail, to exercise the hard-failure
    /// path.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `write_bulk` calls that targeted the data table.
    pub fn data_write_calls(&self) -> usize {
        self.data_writes.load(Ordering::SeqCst)
    }

    /// Number of `write_bulk` calls that targeted the metadata table.
    pub fn metadata_write_calls(&self) -> usize {
        self.metadata_writes.load(Ordering::SeqCst)
    }

    /// All stored block numbers, ascending.
    pub fn block_numbers(&self) -> Vec<u64> {
        lock(&self.blocks).keys().copied().collect()
    }

    /// All data row keys, ascending.
    pub fn data_keys(&self) -> Vec<String> {
        lock(&self.data).keys().cloned().collect()
    }

    /// Cells stored under one data row key.
    pub fn data_row(&self, key: &str) -> Option<Vec<Cell>> {
        lock(&self.data).get(key).cloned()
    }

    /// Pending (unprocessed) metadata keys, ascending.
    pub fn pending_metadata(&self) -> Vec<String> {
        lock(&self.metadata)
            .iter()
            .filter(|(_, processed)| !**processed)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Drop a stored block, to fabricate gaps.
    pub fn remove_block(&self, number: u64) {
        lock(&self.blocks).remove(&number);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ColumnStore for MemStore {
    async fn save_block(&self, block: &Block) -> Result<()> {
        lock(&self.blocks).insert(block.number, block.clone());
        Ok(())
    }

    async fn get_block(&self, number: u64) -> Result<Option<Block>> {
        Ok(lock(&self.blocks).get(&number).cloned())
    }

    async fn get_last_watermark(&self, table: BlockTable) -> Result<Option<u64>> {
        match table {
            BlockTable::Blocks => Ok(lock(&self.blocks).keys().next_back().copied()),
            BlockTable::Data => {
                let data = lock(&self.data);
                data.keys()
                    .filter(|key| key.starts_with(rowkey::BLOCK_PREFIX))
                    .next_back()
                    .map(|key| {
                        rowkey::parse_block_number(key, rowkey::BLOCK_PREFIX)
                            .ok_or_else(|| eyre!("malformed block row key: {key}"))
                    })
                    .transpose()
            }
        }
    }

    async fn get_block_numbers(
        &self,
        table: BlockTable,
        start: u64,
        end: u64,
    ) -> Result<Vec<u64>> {
        match table {
            BlockTable::Blocks => {
                Ok(lock(&self.blocks).range(start..=end).map(|(number, _)| *number).collect())
            }
            BlockTable::Data => {
                let data = lock(&self.data);
                data.keys()
                    .filter_map(|key| rowkey::parse_block_number(key, rowkey::BLOCK_PREFIX))
                    .filter(|number| (start..=end).contains(number))
                    .map(Ok)
                    .collect()
            }
        }
    }

    async fn write_bulk(&self, batch: &BulkMutations, target: MutationTarget) -> Result<()> {
        match target {
            MutationTarget::Data => self.data_writes.fetch_add(1, Ordering::SeqCst),
            MutationTarget::MetadataUpdates => self.metadata_writes.fetch_add(1, Ordering::SeqCst),
        };
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("induced write failure for {}", target.name());
        }
        match target {
            MutationTarget::Data => {
                let mut data = lock(&self.data);
                for (key, mutation) in batch.iter() {
                    data.insert(key.to_owned(), mutation.cells().to_vec());
                }
            }
            MutationTarget::MetadataUpdates => {
                let mut metadata = lock(&self.metadata);
                for key in batch.keys() {
                    metadata.entry(key.clone()).or_insert(false);
                }
            }
        }
        Ok(())
    }

    async fn get_metadata_updates(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        Ok(lock(&self.metadata)
            .iter()
            .filter(|(key, processed)| !**processed && key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .take(limit)
            .collect())
    }

    async fn mark_metadata_updates_processed(&self, keys: &[String]) -> Result<()> {
        let mut metadata = lock(&self.metadata);
        for key in keys {
            metadata.insert(key.clone(), true);
        }
        Ok(())
    }
}
