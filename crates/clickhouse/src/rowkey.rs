//! Row-key schema shared by the transforms (producers) and the store
//! (range and watermark reads).
//!
//! Block numbers are zero-padded to a fixed width so lexicographic key order
//! equals numeric order; the store's "last key" and range queries rely on
//! this. Keys carry no chain prefix: one database per chain.

use alloy_primitives::Address;

/// Block-header rows in the data table.
pub const BLOCK_PREFIX: &str = "B:";
/// Top-level transaction rows.
pub const TX_PREFIX: &str = "TX:";
/// Internal (call-trace) transaction rows.
pub const ITX_PREFIX: &str = "ITX:";
/// ERC-20 transfer rows.
pub const ERC20_PREFIX: &str = "ERC20:";
/// ERC-721 transfer rows.
pub const ERC721_PREFIX: &str = "ERC721:";
/// ERC-1155 transfer rows.
pub const ERC1155_PREFIX: &str = "ERC1155:";
/// Uncle rows.
pub const UNCLE_PREFIX: &str = "U:";

/// Balance namespace of metadata-update signals. Lives in the
/// metadata-updates table, unrelated to [`BLOCK_PREFIX`] despite the equal
/// spelling.
pub const BALANCE_PREFIX: &str = "B:";

/// Token identifier of the native currency in balance signals.
pub const NATIVE_TOKEN: &str = "00";

const BLOCK_PAD: usize = 12;

/// Block number zero-padded to the fixed key width.
pub fn padded_block_number(number: u64) -> String {
    format!("{number:0width$}", width = BLOCK_PAD)
}

/// Key of a block-header row: `B:<number>`.
pub fn block_row_key(number: u64) -> String {
    format!("{BLOCK_PREFIX}{}", padded_block_number(number))
}

/// Key of a transaction row: `TX:<number>:<index>`.
pub fn tx_row_key(number: u64, tx_index: u64) -> String {
    format!("{TX_PREFIX}{}:{tx_index:05}", padded_block_number(number))
}

/// Key of an internal transaction row: `ITX:<number>:<index>:<path>`.
pub fn itx_row_key(number: u64, tx_index: u64, path: &str) -> String {
    format!("{ITX_PREFIX}{}:{tx_index:05}:{path}", padded_block_number(number))
}

/// Key of an ERC-20 transfer row: `ERC20:<number>:<tx index>:<log index>`.
pub fn erc20_row_key(number: u64, tx_index: u64, log_index: usize) -> String {
    format!("{ERC20_PREFIX}{}:{tx_index:05}:{log_index:05}", padded_block_number(number))
}

/// Key of an ERC-721 transfer row: `ERC721:<number>:<tx index>:<log index>`.
pub fn erc721_row_key(number: u64, tx_index: u64, log_index: usize) -> String {
    format!("{ERC721_PREFIX}{}:{tx_index:05}:{log_index:05}", padded_block_number(number))
}

/// Key of an ERC-1155 transfer row. Batch transfers append the position
/// within the batch so each transferred id gets its own row.
pub fn erc1155_row_key(
    number: u64,
    tx_index: u64,
    log_index: usize,
    batch_pos: Option<usize>,
) -> String {
    let block = padded_block_number(number);
    let base = format!("{ERC1155_PREFIX}{block}:{tx_index:05}:{log_index:05}");
    match batch_pos {
        Some(pos) => format!("{base}:{pos:03}"),
        None => base,
    }
}

/// Key of an uncle row: `U:<number>:<position>`.
pub fn uncle_row_key(number: u64, position: usize) -> String {
    format!("{UNCLE_PREFIX}{}:{position:02}", padded_block_number(number))
}

/// Key of a balance metadata-update signal: `B:<address>:<token>`. The token
/// is [`NATIVE_TOKEN`] for the native currency or the token contract address.
pub fn balance_update_key(address: Address, token: &str) -> String {
    format!("{BALANCE_PREFIX}{address:#x}:{token}")
}

/// Extract the block number from a block-scoped row key such as
/// `B:000000000017` or `TX:000000000017:00003`, given its prefix.
pub fn parse_block_number(key: &str, prefix: &str) -> Option<u64> {
    let rest = key.strip_prefix(prefix)?;
    let number = rest.split(':').next()?;
    number.parse().ok()
}
