//! Core primitives for the Etherscribe indexer.
/// Shared bounded cache
pub mod cache;
/// Chain block snapshots
pub mod chain;
/// Bulk mutation batches
pub mod mutations;

pub use cache::{BoundedCache, DEFAULT_CACHE_CAPACITY, DEFAULT_EVICT_BATCH};
pub use chain::{Block, FetchTimings, InternalTransaction, Transaction, Uncle};
pub use mutations::{BulkMutations, Cell, Mutation};
