//! Row structs mirroring the table schemas in [`crate::schema`].

use clickhouse::Row;
use serde::{Deserialize, Serialize};

use crate::types::HashBytes;

/// One raw block snapshot. The body is the JSON-encoded
/// [`primitives::Block`].
#[derive(Debug, Row, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockRow {
    /// Block number
    pub block_number: u64,
    /// Block hash
    pub block_hash: HashBytes,
    /// JSON-encoded block snapshot
    pub body: String,
}

/// One derived data cell.
#[derive(Debug, Row, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataRow {
    /// Composite row key
    pub row_key: String,
    /// Column family
    pub family: String,
    /// Column qualifier
    pub qualifier: String,
    /// Cell value
    pub value: String,
}

/// One metadata-update signal version.
#[derive(Debug, Row, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataUpdateRow {
    /// Signal key
    pub row_key: String,
    /// 1 once the signal has been consumed
    pub processed: u8,
}

/// Key-only projection used by watermark and listing queries.
#[derive(Debug, Row, Serialize, Deserialize)]
pub(crate) struct KeyRow {
    pub(crate) row_key: String,
}

/// Number-only projection used by watermark and gap queries.
#[derive(Debug, Row, Serialize, Deserialize)]
pub(crate) struct NumberRow {
    pub(crate) block_number: u64,
}
