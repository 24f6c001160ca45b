//! Core indexing pipeline: bounded-concurrency block retrieval, per-block
//! transforms into column-store mutations, gap auditing, the perpetual sync
//! loop and metadata-update reconciliation.

/// Node fetch stage
pub mod fetcher;
/// Gap auditing
pub mod gaps;
/// Transform stage
pub mod pipeline;
/// Metadata-update reconciliation
pub mod reconciler;
/// Perpetual sync loop
pub mod sync;
/// Transform registry
pub mod transforms;

mod pool;

#[cfg(test)]
mod support;

pub use fetcher::index_from_node;
pub use gaps::{Gap, check_for_gaps};
pub use pipeline::index_from_store;
pub use reconciler::{BalanceLogger, BalanceSink, reconcile};
pub use sync::{SyncConfig, run_sync, sync_once};
pub use transforms::{SignalCache, Transform, registry};
