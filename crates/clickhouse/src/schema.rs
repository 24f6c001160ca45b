//! Schema definitions for `ClickHouse` tables

/// Table schema definition
#[derive(Debug)]
pub struct TableSchema {
    /// Table name
    pub name: &'static str,
    /// Column definitions
    pub columns: &'static str,
    /// Table engine
    pub engine: &'static str,
    /// Sorting key
    pub order_by: &'static str,
}

/// Raw block snapshots keyed by number
pub const BLOCKS_TABLE: &str = "blocks";
/// Derived rows keyed by composite row keys
pub const DATA_TABLE: &str = "data";
/// Pending recomputation signals
pub const METADATA_UPDATES_TABLE: &str = "metadata_updates";

/// Names of all tables
pub const TABLES: &[&str] = &[BLOCKS_TABLE, DATA_TABLE, METADATA_UPDATES_TABLE];

/// Schema definitions for tables
pub const TABLE_SCHEMAS: &[TableSchema] = &[
    TableSchema {
        name: BLOCKS_TABLE,
        columns: "block_number UInt64,
                 block_hash FixedString(32),
                 body String,
                 inserted_at DateTime64(3) DEFAULT now64()",
        engine: "ReplacingMergeTree(inserted_at)",
        order_by: "block_number",
    },
    TableSchema {
        name: DATA_TABLE,
        columns: "row_key String,
                 family LowCardinality(String),
                 qualifier String,
                 value String,
                 inserted_at DateTime64(3) DEFAULT now64()",
        engine: "ReplacingMergeTree(inserted_at)",
        order_by: "row_key, family, qualifier",
    },
    TableSchema {
        name: METADATA_UPDATES_TABLE,
        columns: "row_key String,
                 processed UInt8,
                 updated_at DateTime64(3) DEFAULT now64()",
        engine: "ReplacingMergeTree(updated_at)",
        order_by: "row_key",
    },
];
