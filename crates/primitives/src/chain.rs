//! Block snapshot types produced by the node client and persisted raw.

use std::time::Duration;

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_rpc_types_eth::Log;
use serde::{Deserialize, Serialize};

/// Fully materialized execution-layer block: header fields, transactions with
/// their receipts and call traces, and uncle headers. Immutable once fetched;
/// re-indexing the same number overwrites the stored row wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Block number
    pub number: u64,
    /// Block hash
    pub hash: B256,
    /// Parent block hash
    pub parent_hash: B256,
    /// Block timestamp
    pub timestamp: u64,
    /// Beneficiary of the block reward
    pub miner: Address,
    /// Block difficulty
    pub difficulty: U256,
    /// Gas limit
    pub gas_limit: u64,
    /// Gas used by all transactions
    pub gas_used: u64,
    /// Base fee per gas, absent before the London fork
    pub base_fee_per_gas: Option<u64>,
    /// Transactions in execution order
    pub transactions: Vec<Transaction>,
    /// Uncle headers in declaration order
    pub uncles: Vec<Uncle>,
}

/// A top-level transaction merged with its receipt and call traces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction hash
    pub hash: B256,
    /// Position within the block
    pub index: u64,
    /// Sender
    pub from: Address,
    /// Recipient, absent for contract creations
    pub to: Option<Address>,
    /// Sender nonce
    pub nonce: u64,
    /// Transferred value in wei
    pub value: U256,
    /// Gas limit
    pub gas_limit: u64,
    /// Gas used, from the receipt
    pub gas_used: u64,
    /// Effective gas price paid, from the receipt
    pub effective_gas_price: u128,
    /// Call data
    pub input: Bytes,
    /// Whether execution succeeded, from the receipt
    pub status: bool,
    /// Address of the created contract, if any
    pub contract_address: Option<Address>,
    /// Logs emitted by this transaction
    pub logs: Vec<Log>,
    /// Internal calls below the top-level frame, from the trace
    pub internal: Vec<InternalTransaction>,
}

/// A single internal call frame extracted from a transaction trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalTransaction {
    /// Trace address of this frame (position at each call depth)
    pub path: Vec<usize>,
    /// Caller
    pub from: Address,
    /// Callee, or the refund/created address for selfdestructs and creations
    pub to: Address,
    /// Transferred value in wei
    pub value: U256,
    /// Call type label (call, delegatecall, create, selfdestruct, ...)
    pub call_type: String,
    /// Error message if this frame reverted
    pub error: Option<String>,
}

impl InternalTransaction {
    /// Trace address rendered as a stable row-key segment, e.g. `0-2-1`.
    pub fn path_label(&self) -> String {
        self.path.iter().map(|p| p.to_string()).collect::<Vec<_>>().join("-")
    }
}

/// An uncle (ommer) header attached to a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Uncle {
    /// Uncle block number
    pub number: u64,
    /// Uncle block hash
    pub hash: B256,
    /// Beneficiary of the uncle reward
    pub miner: Address,
    /// Uncle difficulty
    pub difficulty: U256,
    /// Gas limit
    pub gas_limit: u64,
    /// Gas used
    pub gas_used: u64,
    /// Uncle timestamp
    pub timestamp: u64,
}

/// Wall-clock time spent in each fetch phase of one block retrieval.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchTimings {
    /// Header plus transaction bodies
    pub headers: Duration,
    /// Transaction receipts
    pub receipts: Duration,
    /// Call traces
    pub traces: Duration,
    /// Uncle headers
    pub uncles: Duration,
}

impl FetchTimings {
    /// Total time spent fetching across all phases.
    pub fn total(&self) -> Duration {
        self.headers + self.receipts + self.traces + self.uncles
    }

    /// Accumulate another block's timings into this one.
    pub fn add(&mut self, other: &Self) {
        self.headers += other.headers;
        self.receipts += other.receipts;
        self.traces += other.traces;
        self.uncles += other.uncles;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        Block {
            number: 17,
            hash: B256::repeat_byte(0xaa),
            parent_hash: B256::repeat_byte(0xab),
            timestamp: 1_700_000_000,
            miner: Address::repeat_byte(0x11),
            difficulty: U256::from(2u64),
            gas_limit: 30_000_000,
            gas_used: 21_000,
            base_fee_per_gas: Some(7),
            transactions: vec![Transaction {
                hash: B256::repeat_byte(0xcc),
                index: 0,
                from: Address::repeat_byte(0x22),
                to: Some(Address::repeat_byte(0x33)),
                nonce: 4,
                value: U256::from(1_000u64),
                gas_limit: 21_000,
                gas_used: 21_000,
                effective_gas_price: 12,
                input: Bytes::new(),
                status: true,
                contract_address: None,
                logs: vec![],
                internal: vec![InternalTransaction {
                    path: vec![0, 2],
                    from: Address::repeat_byte(0x22),
                    to: Address::repeat_byte(0x44),
                    value: U256::from(5u64),
                    call_type: "call".to_owned(),
                    error: None,
                }],
            }],
            uncles: vec![],
        }
    }

    #[test]
    fn block_round_trips_through_json() {
        let block = sample_block();
        let body = serde_json::to_string(&block).unwrap();
        let back: Block = serde_json::from_str(&body).unwrap();
        assert_eq!(back.number, block.number);
        assert_eq!(back.hash, block.hash);
        assert_eq!(back.transactions.len(), 1);
        assert_eq!(back.transactions[0].internal[0].path, vec![0, 2]);
    }

    #[test]
    fn path_label_joins_trace_address() {
        let itx = &sample_block().transactions[0].internal[0];
        assert_eq!(itx.path_label(), "0-2");
    }

    #[test]
    fn timings_accumulate() {
        let mut total = FetchTimings::default();
        total.add(&FetchTimings {
            headers: Duration::from_millis(5),
            receipts: Duration::from_millis(3),
            traces: Duration::from_millis(2),
            uncles: Duration::ZERO,
        });
        total.add(&FetchTimings {
            headers: Duration::from_millis(1),
            receipts: Duration::ZERO,
            traces: Duration::ZERO,
            uncles: Duration::from_millis(4),
        });
        assert_eq!(total.total(), Duration::from_millis(15));
        assert_eq!(total.headers, Duration::from_millis(6));
    }
}
