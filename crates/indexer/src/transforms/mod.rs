//! The transform registry. Each transform derives rows for one key namespace
//! from a raw block; namespaces are pairwise disjoint so transforms can be
//! added or removed without migrating the others.

/// Block-header and uncle rows
pub mod block;
/// Token transfer rows
pub mod transfers;
/// Transaction and call-trace rows
pub mod tx;

use alloy_primitives::Address;
use clickhouse::rowkey::{NATIVE_TOKEN, balance_update_key};
use eyre::Result;
use primitives::{Block, BoundedCache, BulkMutations, Mutation};

pub use block::{BlockTransform, UncleTransform};
pub use transfers::{Erc20Transform, Erc721Transform, Erc1155Transform};
pub use tx::{InternalTxTransform, TxTransform};

/// Cache of metadata-signal keys already enqueued during one pipeline
/// invocation. Shared by all transforms across all worker tasks of that
/// invocation, never across invocations.
pub type SignalCache = BoundedCache<String, ()>;

/// A derivation step turning one raw block into column-store mutations.
///
/// Transforms are independent of each other: each one writes only under its
/// own row-key prefix, so their relative order within a block is irrelevant.
pub trait Transform: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Row-key prefix this transform writes under.
    fn prefix(&self) -> &'static str;

    /// Derive the `(data, metadata)` mutation batches for `block`. An error
    /// discards only this transform's contribution for this block.
    fn apply(&self, block: &Block, cache: &SignalCache)
    -> Result<(BulkMutations, BulkMutations)>;
}

/// Every registered transform, in registration order.
pub fn registry() -> Vec<Box<dyn Transform>> {
    vec![
        Box::new(BlockTransform),
        Box::new(TxTransform),
        Box::new(InternalTxTransform),
        Box::new(Erc20Transform),
        Box::new(Erc721Transform),
        Box::new(Erc1155Transform),
        Box::new(UncleTransform),
    ]
}

/// Enqueue a balance recomputation signal for `address`, unless the address
/// is the zero address (mints and burns move nothing anyone owns) or the same
/// signal was already enqueued during this invocation.
pub(crate) fn push_balance_signal(
    metadata: &mut BulkMutations,
    cache: &SignalCache,
    address: Address,
    token: &str,
) {
    if address.is_zero() {
        return;
    }
    let key = balance_update_key(address, token);
    if cache.insert_if_absent(key.clone(), ()) {
        metadata.push(key, Mutation::new());
    }
}

/// Native-currency variant of [`push_balance_signal`].
pub(crate) fn push_native_balance_signal(
    metadata: &mut BulkMutations,
    cache: &SignalCache,
    address: Address,
) {
    push_balance_signal(metadata, cache, address, NATIVE_TOKEN);
}
