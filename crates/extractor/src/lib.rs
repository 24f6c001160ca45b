//! Etherscribe extractor: materializes full blocks (header, transactions,
//! receipts, call traces, uncles) from an execution-layer node over HTTP,
//! and serves the balance lookups the metadata reconciler needs.

/// Transport retry policy
pub mod retries;

use std::{collections::HashMap, time::Instant};

use alloy::providers::{
    Provider, ProviderBuilder, RootProvider, fillers::FillProvider,
    utils::JoinedRecommendedFillers,
};
use alloy_consensus::Transaction as _;
use alloy_network_primitives::ReceiptResponse as _;
use alloy_primitives::{Address, B256, U256};
use alloy_rpc_client::ClientBuilder;
use alloy_rpc_types_eth::{Block as RpcBlock, BlockId, BlockNumberOrTag, TransactionReceipt};
use alloy_rpc_types_trace::parity::{Action, CallType, LocalizedTransactionTrace, TraceOutput};
use alloy_sol_macro::sol;
use async_trait::async_trait;
use derive_more::Debug;
use eyre::{Context, Result, bail, eyre};
use tracing::debug;
use url::Url;

use primitives::{Block, FetchTimings, InternalTransaction, Transaction, Uncle};

use crate::retries::retry_layer;

/// Alias to the default provider with all recommended fillers (read-only).
pub type DefaultProvider = FillProvider<JoinedRecommendedFillers, RootProvider>;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    #[derive(std::fmt::Debug)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
    }
}

/// Node operations the indexing pipeline depends on. [`Extractor`] is the
/// production implementation; tests script their own.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Fully materialize the block at `number`, with per-phase fetch timings.
    async fn get_block(&self, number: u64) -> Result<(Block, FetchTimings)>;

    /// Number of the node's current head block.
    async fn get_latest_block_number(&self) -> Result<u64>;

    /// Native balance of `address` at the latest block.
    async fn get_balance(&self, address: Address) -> Result<U256>;

    /// ERC-20 balance of `owner` on the `token` contract at the latest block.
    async fn get_token_balance(&self, owner: Address, token: Address) -> Result<U256>;
}

/// Extractor client over a single execution-layer HTTP endpoint. The node
/// must serve `trace_block` in addition to the standard `eth` namespace.
#[derive(Clone, Debug)]
pub struct Extractor {
    #[debug(skip)]
    provider: DefaultProvider,
}

impl Extractor {
    /// Create a new extractor for the node at `rpc_url`.
    pub fn new(rpc_url: Url) -> Self {
        let client = ClientBuilder::default().layer(retry_layer()).http(rpc_url);
        let provider = ProviderBuilder::new().connect_client(client);
        Self { provider }
    }
}

#[async_trait]
impl NodeClient for Extractor {
    async fn get_block(&self, number: u64) -> Result<(Block, FetchTimings)> {
        let mut timings = FetchTimings::default();

        let started = Instant::now();
        let rpc_block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .full()
            .await
            .wrap_err_with(|| format!("Failed to fetch block {number}"))?
            .ok_or_else(|| eyre!("block {number} not found"))?;
        timings.headers = started.elapsed();

        let started = Instant::now();
        let receipts = self
            .provider
            .get_block_receipts(BlockId::Number(BlockNumberOrTag::Number(number)))
            .await
            .wrap_err_with(|| format!("Failed to fetch receipts for block {number}"))?
            .ok_or_else(|| eyre!("missing receipts for block {number}"))?;
        timings.receipts = started.elapsed();

        let started = Instant::now();
        let traces: Vec<LocalizedTransactionTrace> = self
            .provider
            .raw_request("trace_block".into(), (BlockNumberOrTag::Number(number),))
            .await
            .wrap_err_with(|| format!("Failed to fetch traces for block {number}"))?;
        timings.traces = started.elapsed();

        let started = Instant::now();
        let mut uncles = Vec::with_capacity(rpc_block.uncles.len());
        for index in 0..rpc_block.uncles.len() {
            let uncle = self
                .provider
                .get_uncle(BlockId::Number(BlockNumberOrTag::Number(number)), index as u64)
                .await
                .wrap_err_with(|| format!("Failed to fetch uncle {index} of block {number}"))?
                .ok_or_else(|| eyre!("uncle {index} of block {number} not found"))?;
            uncles.push(uncle);
        }
        timings.uncles = started.elapsed();

        let block = assemble_block(rpc_block, receipts, traces, uncles)?;
        debug!(block = block.number, txs = block.transactions.len(), "fetched block");
        Ok((block, timings))
    }

    async fn get_latest_block_number(&self) -> Result<u64> {
        self.provider.get_block_number().await.wrap_err("Failed to fetch latest block number")
    }

    async fn get_balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address)
            .await
            .wrap_err_with(|| format!("Failed to fetch balance of {address}"))
    }

    async fn get_token_balance(&self, owner: Address, token: Address) -> Result<U256> {
        let contract = IERC20::new(token, self.provider.clone());
        contract
            .balanceOf(owner)
            .call()
            .await
            .wrap_err_with(|| format!("balanceOf({owner}) failed on token {token}"))
    }
}

/// Merge the raw RPC responses for one block into a [`Block`] snapshot.
fn assemble_block(
    rpc_block: RpcBlock,
    receipts: Vec<TransactionReceipt>,
    traces: Vec<LocalizedTransactionTrace>,
    uncles: Vec<RpcBlock>,
) -> Result<Block> {
    let number = rpc_block.header.number;
    let mut internal = group_internal_transactions(traces);

    let txs: Vec<_> = rpc_block.transactions.into_transactions().collect();
    if txs.len() != receipts.len() {
        bail!("block {number}: {} transactions but {} receipts", txs.len(), receipts.len());
    }

    let mut transactions = Vec::with_capacity(txs.len());
    for (i, (tx, receipt)) in txs.into_iter().zip(receipts).enumerate() {
        let hash = *tx.inner.tx_hash();
        if receipt.transaction_hash() != hash {
            bail!("block {number}: receipt {i} does not match transaction {hash}");
        }
        transactions.push(Transaction {
            hash,
            index: tx.transaction_index.unwrap_or(i as u64),
            from: tx.inner.signer(),
            to: tx.inner.to(),
            nonce: tx.inner.nonce(),
            value: tx.inner.value(),
            gas_limit: tx.inner.gas_limit(),
            gas_used: receipt.gas_used(),
            effective_gas_price: receipt.effective_gas_price(),
            input: tx.inner.input().clone(),
            status: receipt.status(),
            contract_address: receipt.contract_address(),
            logs: receipt.inner.logs().to_vec(),
            internal: internal.remove(&hash).unwrap_or_default(),
        });
    }

    let uncles = uncles
        .into_iter()
        .map(|uncle| Uncle {
            number: uncle.header.number,
            hash: uncle.header.hash,
            miner: uncle.header.beneficiary,
            difficulty: uncle.header.difficulty,
            gas_limit: uncle.header.gas_limit,
            gas_used: uncle.header.gas_used,
            timestamp: uncle.header.timestamp,
        })
        .collect();

    Ok(Block {
        number,
        hash: rpc_block.header.hash,
        parent_hash: rpc_block.header.parent_hash,
        timestamp: rpc_block.header.timestamp,
        miner: rpc_block.header.beneficiary,
        difficulty: rpc_block.header.difficulty,
        gas_limit: rpc_block.header.gas_limit,
        gas_used: rpc_block.header.gas_used,
        base_fee_per_gas: rpc_block.header.base_fee_per_gas,
        transactions,
        uncles,
    })
}

/// Group nested trace frames by transaction hash. Top-level frames repeat
/// the transaction itself and reward traces have no transaction; both are
/// skipped.
fn group_internal_transactions(
    traces: Vec<LocalizedTransactionTrace>,
) -> HashMap<B256, Vec<InternalTransaction>> {
    let mut grouped: HashMap<B256, Vec<InternalTransaction>> = HashMap::new();
    for localized in traces {
        if localized.trace.trace_address.is_empty() {
            continue;
        }
        let Some(tx_hash) = localized.transaction_hash else { continue };
        let (from, to, value, call_type) = match &localized.trace.action {
            Action::Call(call) => {
                (call.from, call.to, call.value, call_type_label(call.call_type))
            }
            Action::Create(create) => {
                let created = match &localized.trace.result {
                    Some(TraceOutput::Create(out)) => out.address,
                    _ => Address::ZERO,
                };
                (create.from, created, create.value, "create")
            }
            Action::Selfdestruct(selfdestruct) => (
                selfdestruct.address,
                selfdestruct.refund_address,
                selfdestruct.balance,
                "selfdestruct",
            ),
            Action::Reward(_) => continue,
        };
        grouped.entry(tx_hash).or_default().push(InternalTransaction {
            path: localized.trace.trace_address.clone(),
            from,
            to,
            value,
            call_type: call_type.to_owned(),
            error: localized.trace.error.clone(),
        });
    }
    grouped
}

const fn call_type_label(call_type: CallType) -> &'static str {
    match call_type {
        CallType::CallCode => "callcode",
        CallType::DelegateCall => "delegatecall",
        CallType::StaticCall => "staticcall",
        _ => "call",
    }
}
