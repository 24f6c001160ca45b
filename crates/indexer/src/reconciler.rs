//! Metadata-update reconciliation: drain queued balance signals, recompute
//! each balance against the node, and hand the results to a sink.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use clickhouse::{ColumnStore, rowkey::NATIVE_TOKEN};
use extractor::NodeClient;
use eyre::{Context, Result, bail};
use tracing::info;

/// Consumer of recomputed balances. `token` is `None` for the native asset.
#[async_trait]
pub trait BalanceSink: Send + Sync {
    /// Accept one recomputed balance.
    async fn apply(&self, address: Address, token: Option<Address>, balance: U256) -> Result<()>;
}

/// Sink that only logs the recomputed balances.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceLogger;

#[async_trait]
impl BalanceSink for BalanceLogger {
    async fn apply(&self, address: Address, token: Option<Address>, balance: U256) -> Result<()> {
        match token {
            Some(token) => info!(%address, %token, %balance, "recomputed token balance"),
            None => info!(%address, %balance, "recomputed native balance"),
        }
        Ok(())
    }
}

enum Signal {
    NativeBalance { address: Address },
    TokenBalance { owner: Address, token: Address },
}

/// Parse a metadata-update row key. A key outside the balance namespace is
/// fatal: a malformed queue means a transform bug, not a skippable row.
fn parse_signal(key: &str) -> Result<Signal> {
    let mut parts = key.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("B"), Some(address), Some(token), None) => {
            let address = address
                .parse::<Address>()
                .wrap_err_with(|| format!("malformed address in metadata-update key: {key}"))?;
            if token == NATIVE_TOKEN {
                Ok(Signal::NativeBalance { address })
            } else {
                let token = token
                    .parse::<Address>()
                    .wrap_err_with(|| format!("malformed token in metadata-update key: {key}"))?;
                Ok(Signal::TokenBalance { owner: address, token })
            }
        }
        _ => bail!("unrecognized metadata-update key: {key}"),
    }
}

/// Drain the metadata-update queue in batches of `batch_limit` keys,
/// recomputing every queued balance from the node. Keys are marked processed
/// only after the whole batch has been applied, so a crash re-runs the batch;
/// recomputation from live node state makes the replay harmless.
pub async fn reconcile<N, S, K>(node: &N, store: &S, sink: &K, batch_limit: usize) -> Result<()>
where
    N: NodeClient + ?Sized,
    S: ColumnStore + ?Sized,
    K: BalanceSink + ?Sized,
{
    if batch_limit == 0 {
        bail!("metadata batch limit must be at least 1");
    }

    loop {
        let keys = store.get_metadata_updates("", batch_limit).await?;
        if keys.is_empty() {
            return Ok(());
        }

        for key in &keys {
            let signal = parse_signal(key)?;
            match signal {
                Signal::NativeBalance { address } => {
                    let balance = node
                        .get_balance(address)
                        .await
                        .wrap_err_with(|| format!("Failed to recompute balance for {key}"))?;
                    sink.apply(address, None, balance)
                        .await
                        .wrap_err_with(|| format!("Failed to apply balance for {key}"))?;
                }
                Signal::TokenBalance { owner, token } => {
                    let balance = node
                        .get_token_balance(owner, token)
                        .await
                        .wrap_err_with(|| format!("Failed to recompute balance for {key}"))?;
                    sink.apply(owner, Some(token), balance)
                        .await
                        .wrap_err_with(|| format!("Failed to apply balance for {key}"))?;
                }
            }
        }

        store.mark_metadata_updates_processed(&keys).await?;
        info!(updates = keys.len(), "processed a batch of metadata updates");

        if keys.len() < batch_limit {
            return Ok(());
        }
    }
}
