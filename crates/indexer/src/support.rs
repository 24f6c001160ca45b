//! Scripted collaborators and block fixtures shared by the unit tests.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_rpc_types_eth::Log;
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use extractor::NodeClient;
use eyre::{Result, bail, eyre};
use primitives::{Block, FetchTimings, InternalTransaction, Transaction, Uncle};

use crate::transforms::transfers::{erc20, erc721, erc1155};

/// Node double scripted with a chain of generated blocks and fixed balances.
pub(crate) struct MockNode {
    head: u64,
    blocks: HashMap<u64, Block>,
    native: HashMap<Address, U256>,
    tokens: HashMap<(Address, Address), U256>,
    fail_at: Option<u64>,
    fetched: Mutex<Vec<u64>>,
}

impl MockNode {
    /// A node whose chain is `0..=head`, every block generated by
    /// [`sample_block`].
    pub(crate) fn with_chain(head: u64) -> Self {
        let blocks = (0..=head).map(|number| (number, sample_block(number))).collect();
        Self {
            head,
            blocks,
            native: HashMap::new(),
            tokens: HashMap::new(),
            fail_at: None,
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Make `get_block` fail for `number`.
    pub(crate) fn fail_at(&mut self, number: u64) {
        self.fail_at = Some(number);
    }

    /// Script the native balance returned for `address`.
    pub(crate) fn set_balance(&mut self, address: Address, balance: U256) {
        self.native.insert(address, balance);
    }

    /// Script the token balance returned for `(owner, token)`.
    pub(crate) fn set_token_balance(&mut self, owner: Address, token: Address, balance: U256) {
        self.tokens.insert((owner, token), balance);
    }

    /// Block numbers requested through `get_block`, in request order.
    pub(crate) fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn get_block(&self, number: u64) -> Result<(Block, FetchTimings)> {
        self.fetched.lock().unwrap_or_else(PoisonError::into_inner).push(number);
        if self.fail_at == Some(number) {
            bail!("scripted failure at block {number}");
        }
        let block = self
            .blocks
            .get(&number)
            .cloned()
            .ok_or_else(|| eyre!("no block {number} scripted"))?;
        Ok((block, FetchTimings::default()))
    }

    async fn get_latest_block_number(&self) -> Result<u64> {
        Ok(self.head)
    }

    async fn get_balance(&self, address: Address) -> Result<U256> {
        Ok(self.native.get(&address).copied().unwrap_or_default())
    }

    async fn get_token_balance(&self, owner: Address, token: Address) -> Result<U256> {
        Ok(self.tokens.get(&(owner, token)).copied().unwrap_or_default())
    }
}

/// Deterministic empty block for `number`.
pub(crate) fn sample_block(number: u64) -> Block {
    Block {
        number,
        hash: B256::from(U256::from(number)),
        parent_hash: B256::from(U256::from(number.saturating_sub(1))),
        timestamp: 1_700_000_000 + number * 12,
        miner: Address::repeat_byte(0x42),
        difficulty: U256::from(2u64),
        gas_limit: 30_000_000,
        gas_used: 0,
        base_fee_per_gas: Some(7),
        transactions: vec![],
        uncles: vec![],
    }
}

/// Uncle header fixture numbered `number`.
pub(crate) fn sample_uncle(number: u64) -> Uncle {
    Uncle {
        number,
        hash: B256::from(U256::from(number + 1_000)),
        miner: Address::repeat_byte(0x43),
        difficulty: U256::from(1u64),
        gas_limit: 30_000_000,
        gas_used: 0,
        timestamp: 1_700_000_000 + number * 12,
    }
}

/// Successful transaction fixture.
pub(crate) fn transaction(
    index: u64,
    from: Address,
    to: Option<Address>,
    value: U256,
) -> Transaction {
    Transaction {
        hash: B256::from(U256::from(index + 500_000)),
        index,
        from,
        to,
        nonce: index,
        value,
        gas_limit: 100_000,
        gas_used: 21_000,
        effective_gas_price: 12,
        input: Bytes::new(),
        status: true,
        contract_address: None,
        logs: vec![],
        internal: vec![],
    }
}

/// Value-carrying internal call frame fixture.
pub(crate) fn internal_call(path: Vec<usize>, value: U256) -> InternalTransaction {
    InternalTransaction {
        path,
        from: Address::repeat_byte(0x51),
        to: Address::repeat_byte(0x52),
        value,
        call_type: "call".to_owned(),
        error: None,
    }
}

fn receipt_log(address: Address, topics: Vec<B256>, data: Vec<u8>, log_index: u64) -> Log {
    Log {
        inner: alloy_primitives::Log::new_unchecked(address, topics, data.into()),
        block_hash: None,
        block_number: None,
        block_timestamp: None,
        transaction_hash: None,
        transaction_index: None,
        log_index: Some(log_index),
        removed: false,
    }
}

/// An ERC-20 `Transfer` log: two indexed parties, value in the data section.
pub(crate) fn erc20_transfer_log(
    token: Address,
    from: Address,
    to: Address,
    value: U256,
    log_index: u64,
) -> Log {
    let event = erc20::Transfer { from, to, value };
    receipt_log(
        token,
        vec![erc20::Transfer::SIGNATURE_HASH, from.into_word(), to.into_word()],
        event.encode_data(),
        log_index,
    )
}

/// An ERC-721 `Transfer` log: all three arguments indexed.
pub(crate) fn erc721_transfer_log(
    token: Address,
    from: Address,
    to: Address,
    token_id: U256,
    log_index: u64,
) -> Log {
    receipt_log(
        token,
        vec![
            erc721::Transfer::SIGNATURE_HASH,
            from.into_word(),
            to.into_word(),
            B256::from(token_id),
        ],
        Vec::new(),
        log_index,
    )
}

/// An ERC-1155 `TransferSingle` log.
pub(crate) fn erc1155_single_log(
    token: Address,
    operator: Address,
    from: Address,
    to: Address,
    id: U256,
    value: U256,
    log_index: u64,
) -> Log {
    let event = erc1155::TransferSingle { operator, from, to, id, value };
    receipt_log(
        token,
        vec![
            erc1155::TransferSingle::SIGNATURE_HASH,
            operator.into_word(),
            from.into_word(),
            to.into_word(),
        ],
        event.encode_data(),
        log_index,
    )
}

/// An ERC-1155 `TransferBatch` log.
pub(crate) fn erc1155_batch_log(
    token: Address,
    operator: Address,
    from: Address,
    to: Address,
    ids: Vec<U256>,
    values: Vec<U256>,
    log_index: u64,
) -> Log {
    let event = erc1155::TransferBatch { operator, from, to, ids, values };
    receipt_log(
        token,
        vec![
            erc1155::TransferBatch::SIGNATURE_HASH,
            operator.into_word(),
            from.into_word(),
            to.into_word(),
        ],
        event.encode_data(),
        log_index,
    )
}
