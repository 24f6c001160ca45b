//! ERC-20, ERC-721 and ERC-1155 transfer transforms.
//!
//! ERC-20 and ERC-721 share the `Transfer` event signature. They are told
//! apart by topic count: ERC-20 leaves the value in the data section while
//! ERC-721 indexes the token id as a third topic, so decoding a log against
//! the wrong shape fails and the log falls through to the other transform.

use alloy_primitives::{Address, U256};
use alloy_rpc_types_eth::Log;
use clickhouse::rowkey::{
    ERC20_PREFIX, ERC721_PREFIX, ERC1155_PREFIX, erc20_row_key, erc721_row_key, erc1155_row_key,
};
use eyre::Result;
use primitives::{Block, BulkMutations, Mutation};

use crate::transforms::{SignalCache, Transform, push_balance_signal};

const ERC20_FAMILY: &str = "e20";
const ERC721_FAMILY: &str = "e721";
const ERC1155_FAMILY: &str = "e1155";

/// ERC-20 transfer event.
pub mod erc20 {
    alloy_sol_macro::sol! {
        #[allow(missing_docs)]
        #[derive(Debug)]
        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}

/// ERC-721 transfer event.
pub mod erc721 {
    alloy_sol_macro::sol! {
        #[allow(missing_docs)]
        #[derive(Debug)]
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
    }
}

/// ERC-1155 transfer events.
pub mod erc1155 {
    alloy_sol_macro::sol! {
        #[allow(missing_docs)]
        #[derive(Debug)]
        event TransferSingle(
            address indexed operator,
            address indexed from,
            address indexed to,
            uint256 id,
            uint256 value
        );

        #[allow(missing_docs)]
        #[derive(Debug)]
        event TransferBatch(
            address indexed operator,
            address indexed from,
            address indexed to,
            uint256[] ids,
            uint256[] values
        );
    }
}

fn log_position(log: &Log, fallback: usize) -> usize {
    log.log_index.map_or(fallback, |index| index as usize)
}

/// Writes one `ERC20:<number>:<tx index>:<log index>` row per decoded ERC-20
/// transfer and signals token-balance recomputation for both parties.
#[derive(Debug, Clone, Copy, Default)]
pub struct Erc20Transform;

impl Transform for Erc20Transform {
    fn name(&self) -> &'static str {
        "erc20"
    }

    fn prefix(&self) -> &'static str {
        ERC20_PREFIX
    }

    fn apply(
        &self,
        block: &Block,
        cache: &SignalCache,
    ) -> Result<(BulkMutations, BulkMutations)> {
        let mut data = BulkMutations::new();
        let mut metadata = BulkMutations::new();

        for tx in &block.transactions {
            if !tx.status {
                continue;
            }
            for (position, log) in tx.logs.iter().enumerate() {
                let Ok(decoded) = log.log_decode::<erc20::Transfer>() else { continue };
                let token = decoded.address();
                let transfer = decoded.data();

                let mutation = Mutation::new()
                    .set_cell(ERC20_FAMILY, "token", format!("{token:#x}"))
                    .set_cell(ERC20_FAMILY, "from", format!("{:#x}", transfer.from))
                    .set_cell(ERC20_FAMILY, "to", format!("{:#x}", transfer.to))
                    .set_cell(ERC20_FAMILY, "value", transfer.value.to_string());
                data.push(
                    erc20_row_key(block.number, tx.index, log_position(log, position)),
                    mutation,
                );

                let token_id = format!("{token:#x}");
                push_balance_signal(&mut metadata, cache, transfer.from, &token_id);
                push_balance_signal(&mut metadata, cache, transfer.to, &token_id);
            }
        }

        Ok((data, metadata))
    }
}

/// Writes one `ERC721:<number>:<tx index>:<log index>` row per decoded
/// ERC-721 transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Erc721Transform;

impl Transform for Erc721Transform {
    fn name(&self) -> &'static str {
        "erc721"
    }

    fn prefix(&self) -> &'static str {
        ERC721_PREFIX
    }

    fn apply(
        &self,
        block: &Block,
        cache: &SignalCache,
    ) -> Result<(BulkMutations, BulkMutations)> {
        let mut data = BulkMutations::new();
        let mut metadata = BulkMutations::new();

        for tx in &block.transactions {
            if !tx.status {
                continue;
            }
            for (position, log) in tx.logs.iter().enumerate() {
                let Ok(decoded) = log.log_decode::<erc721::Transfer>() else { continue };
                let token = decoded.address();
                let transfer = decoded.data();

                let mutation = Mutation::new()
                    .set_cell(ERC721_FAMILY, "token", format!("{token:#x}"))
                    .set_cell(ERC721_FAMILY, "from", format!("{:#x}", transfer.from))
                    .set_cell(ERC721_FAMILY, "to", format!("{:#x}", transfer.to))
                    .set_cell(ERC721_FAMILY, "token_id", transfer.tokenId.to_string());
                data.push(
                    erc721_row_key(block.number, tx.index, log_position(log, position)),
                    mutation,
                );

                let token_id = format!("{token:#x}");
                push_balance_signal(&mut metadata, cache, transfer.from, &token_id);
                push_balance_signal(&mut metadata, cache, transfer.to, &token_id);
            }
        }

        Ok((data, metadata))
    }
}

/// Writes `ERC1155:<number>:<tx index>:<log index>[:<k>]` rows per decoded
/// ERC-1155 transfer; batch transfers get one row per transferred id.
#[derive(Debug, Clone, Copy, Default)]
pub struct Erc1155Transform;

impl Transform for Erc1155Transform {
    fn name(&self) -> &'static str {
        "erc1155"
    }

    fn prefix(&self) -> &'static str {
        ERC1155_PREFIX
    }

    fn apply(
        &self,
        block: &Block,
        cache: &SignalCache,
    ) -> Result<(BulkMutations, BulkMutations)> {
        let mut data = BulkMutations::new();
        let mut metadata = BulkMutations::new();

        for tx in &block.transactions {
            if !tx.status {
                continue;
            }
            for (position, log) in tx.logs.iter().enumerate() {
                let log_index = log_position(log, position);

                if let Ok(decoded) = log.log_decode::<erc1155::TransferSingle>() {
                    let token = decoded.address();
                    let transfer = decoded.data();
                    let mutation = single_row(token, transfer);
                    data.push(erc1155_row_key(block.number, tx.index, log_index, None), mutation);

                    let token_id = format!("{token:#x}");
                    push_balance_signal(&mut metadata, cache, transfer.from, &token_id);
                    push_balance_signal(&mut metadata, cache, transfer.to, &token_id);
                    continue;
                }

                if let Ok(decoded) = log.log_decode::<erc1155::TransferBatch>() {
                    let token = decoded.address();
                    let transfer = decoded.data();
                    for (pos, (id, amount)) in
                        transfer.ids.iter().zip(transfer.values.iter()).enumerate()
                    {
                        data.push(
                            erc1155_row_key(block.number, tx.index, log_index, Some(pos)),
                            batch_row(token, transfer, id, amount),
                        );
                    }

                    let token_id = format!("{token:#x}");
                    push_balance_signal(&mut metadata, cache, transfer.from, &token_id);
                    push_balance_signal(&mut metadata, cache, transfer.to, &token_id);
                }
            }
        }

        Ok((data, metadata))
    }
}

fn single_row(token: Address, transfer: &erc1155::TransferSingle) -> Mutation {
    Mutation::new()
        .set_cell(ERC1155_FAMILY, "token", format!("{token:#x}"))
        .set_cell(ERC1155_FAMILY, "operator", format!("{:#x}", transfer.operator))
        .set_cell(ERC1155_FAMILY, "from", format!("{:#x}", transfer.from))
        .set_cell(ERC1155_FAMILY, "to", format!("{:#x}", transfer.to))
        .set_cell(ERC1155_FAMILY, "token_id", transfer.id.to_string())
        .set_cell(ERC1155_FAMILY, "amount", transfer.value.to_string())
}

fn batch_row(
    token: Address,
    transfer: &erc1155::TransferBatch,
    id: &U256,
    amount: &U256,
) -> Mutation {
    Mutation::new()
        .set_cell(ERC1155_FAMILY, "token", format!("{token:#x}"))
        .set_cell(ERC1155_FAMILY, "operator", format!("{:#x}", transfer.operator))
        .set_cell(ERC1155_FAMILY, "from", format!("{:#x}", transfer.from))
        .set_cell(ERC1155_FAMILY, "to", format!("{:#x}", transfer.to))
        .set_cell(ERC1155_FAMILY, "token_id", id.to_string())
        .set_cell(ERC1155_FAMILY, "amount", amount.to_string())
}
