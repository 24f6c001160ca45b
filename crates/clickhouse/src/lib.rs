//! `ClickHouse`-backed column store for the Etherscribe indexer.
//!
//! Three tables back the indexing pipeline: raw block snapshots, derived
//! data rows keyed by composite row keys, and pending metadata-update
//! signals. All of them are `ReplacingMergeTree` so re-indexing the same key
//! collapses to the latest version.

/// In-memory store for tests
#[cfg(feature = "test-util")]
pub mod mem;
/// Row structs
pub mod models;
/// Row-key schema
pub mod rowkey;
/// Table DDL
pub mod schema;
/// Store client
pub mod store;
/// Column wrapper types
pub mod types;

use async_trait::async_trait;
use eyre::Result;
use primitives::{Block, BulkMutations};

pub use store::ClickhouseStore;

/// Tables that hold one row set per block number and therefore carry a
/// watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTable {
    /// Raw block snapshots
    Blocks,
    /// Derived data rows
    Data,
}

impl BlockTable {
    /// Backing table name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Blocks => schema::BLOCKS_TABLE,
            Self::Data => schema::DATA_TABLE,
        }
    }
}

/// Write targets for bulk mutation batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationTarget {
    /// Derived data rows
    Data,
    /// Pending metadata-update signals
    MetadataUpdates,
}

impl MutationTarget {
    /// Backing table name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Data => schema::DATA_TABLE,
            Self::MetadataUpdates => schema::METADATA_UPDATES_TABLE,
        }
    }
}

/// Column store operations the indexing pipeline depends on. Implemented by
/// [`ClickhouseStore`] and, for tests, by [`mem::MemStore`].
#[async_trait]
pub trait ColumnStore: Send + Sync {
    /// Persist one raw block snapshot, overwriting any previous row for the
    /// same number.
    async fn save_block(&self, block: &Block) -> Result<()>;

    /// Point-read a raw block snapshot.
    async fn get_block(&self, number: u64) -> Result<Option<Block>>;

    /// Highest block number present in `table`, or `None` for an empty
    /// table. Derived from stored rows, never from a separate counter.
    async fn get_last_watermark(&self, table: BlockTable) -> Result<Option<u64>>;

    /// Distinct block numbers present in `table` within `[start, end]`,
    /// ascending.
    async fn get_block_numbers(&self, table: BlockTable, start: u64, end: u64)
    -> Result<Vec<u64>>;

    /// Apply one bulk mutation batch to `target`. An empty batch is a no-op.
    async fn write_bulk(&self, batch: &BulkMutations, target: MutationTarget) -> Result<()>;

    /// Up to `limit` pending metadata-update keys under `prefix`, ascending.
    async fn get_metadata_updates(&self, prefix: &str, limit: usize) -> Result<Vec<String>>;

    /// Mark the given metadata-update keys as consumed.
    async fn mark_metadata_updates_processed(&self, keys: &[String]) -> Result<()>;
}
