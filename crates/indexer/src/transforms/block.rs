//! Block-header and uncle transforms.

use clickhouse::rowkey::{BLOCK_PREFIX, UNCLE_PREFIX, block_row_key, uncle_row_key};
use eyre::Result;
use primitives::{Block, BulkMutations, Mutation};

use crate::transforms::{SignalCache, Transform};

const BLOCK_FAMILY: &str = "b";
const UNCLE_FAMILY: &str = "u";

/// Writes one `B:<number>` row per block with the header fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockTransform;

impl Transform for BlockTransform {
    fn name(&self) -> &'static str {
        "blocks"
    }

    fn prefix(&self) -> &'static str {
        BLOCK_PREFIX
    }

    fn apply(
        &self,
        block: &Block,
        _cache: &SignalCache,
    ) -> Result<(BulkMutations, BulkMutations)> {
        let mut mutation = Mutation::new()
            .set_cell(BLOCK_FAMILY, "hash", format!("{:#x}", block.hash))
            .set_cell(BLOCK_FAMILY, "parent_hash", format!("{:#x}", block.parent_hash))
            .set_cell(BLOCK_FAMILY, "timestamp", block.timestamp.to_string())
            .set_cell(BLOCK_FAMILY, "miner", format!("{:#x}", block.miner))
            .set_cell(BLOCK_FAMILY, "difficulty", block.difficulty.to_string())
            .set_cell(BLOCK_FAMILY, "gas_limit", block.gas_limit.to_string())
            .set_cell(BLOCK_FAMILY, "gas_used", block.gas_used.to_string());
        if let Some(base_fee) = block.base_fee_per_gas {
            mutation = mutation.set_cell(BLOCK_FAMILY, "base_fee", base_fee.to_string());
        }
        mutation = mutation
            .set_cell(BLOCK_FAMILY, "tx_count", block.transactions.len().to_string())
            .set_cell(BLOCK_FAMILY, "uncle_count", block.uncles.len().to_string());

        let mut data = BulkMutations::new();
        data.push(block_row_key(block.number), mutation);
        Ok((data, BulkMutations::new()))
    }
}

/// Writes one `U:<number>:<position>` row per uncle header.
#[derive(Debug, Clone, Copy, Default)]
pub struct UncleTransform;

impl Transform for UncleTransform {
    fn name(&self) -> &'static str {
        "uncles"
    }

    fn prefix(&self) -> &'static str {
        UNCLE_PREFIX
    }

    fn apply(
        &self,
        block: &Block,
        _cache: &SignalCache,
    ) -> Result<(BulkMutations, BulkMutations)> {
        let mut data = BulkMutations::new();
        for (position, uncle) in block.uncles.iter().enumerate() {
            let mutation = Mutation::new()
                .set_cell(UNCLE_FAMILY, "hash", format!("{:#x}", uncle.hash))
                .set_cell(UNCLE_FAMILY, "number", uncle.number.to_string())
                .set_cell(UNCLE_FAMILY, "miner", format!("{:#x}", uncle.miner))
                .set_cell(UNCLE_FAMILY, "difficulty", uncle.difficulty.to_string())
                .set_cell(UNCLE_FAMILY, "gas_limit", uncle.gas_limit.to_string())
                .set_cell(UNCLE_FAMILY, "gas_used", uncle.gas_used.to_string())
                .set_cell(UNCLE_FAMILY, "timestamp", uncle.timestamp.to_string());
            data.push(uncle_row_key(block.number, position), mutation);
        }
        Ok((data, BulkMutations::new()))
    }
}
