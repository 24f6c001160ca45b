//! `ClickHouse` store client: database bootstrap, raw block persistence,
//! watermark and range reads, bulk mutation writes, and metadata-update
//! consumption.

use std::time::Instant;

use clickhouse::{Client, Row};
use derive_more::Debug;
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use tracing::{debug, error, info};
use url::Url;

use async_trait::async_trait;
use primitives::{Block, BulkMutations};

use crate::{
    BlockTable, ColumnStore, MutationTarget,
    models::{BlockRow, DataRow, KeyRow, MetadataUpdateRow, NumberRow},
    rowkey,
    schema::{BLOCKS_TABLE, DATA_TABLE, METADATA_UPDATES_TABLE, TABLE_SCHEMAS, TABLES, TableSchema},
};

/// `ClickHouse` store client.
#[derive(Clone, Debug)]
pub struct ClickhouseStore {
    /// Base client
    #[debug(skip)]
    base: Client,
    /// Database name
    db_name: String,
}

impl ClickhouseStore {
    /// Create a new store client.
    pub fn new(url: Url, db_name: String, username: String, password: String) -> Result<Self> {
        let client = Client::default()
            .with_url(url)
            .with_database(db_name.clone())
            .with_user(username)
            .with_password(password);

        Ok(Self { base: client, db_name })
    }

    /// Create a table with the given schema.
    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let query = format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (
                {}
            ) ENGINE = {}
            ORDER BY ({})",
            self.db_name, schema.name, schema.columns, schema.engine, schema.order_by
        );

        self.base
            .query(&query)
            .execute()
            .await
            .wrap_err_with(|| format!("Failed to create {} table", schema.name))
    }

    /// Drop a table if it exists.
    async fn drop_table(&self, table_name: &str) -> Result<()> {
        self.base
            .query(&format!("DROP TABLE IF EXISTS {}.{}", self.db_name, table_name))
            .execute()
            .await
            .wrap_err_with(|| format!("Failed to drop {} table", table_name))
    }

    /// Create the database and tables, optionally dropping existing tables
    /// first.
    pub async fn init_db(&self, reset: bool) -> Result<()> {
        self.base
            .query(&format!("CREATE DATABASE IF NOT EXISTS {}", self.db_name))
            .execute()
            .await?;

        if reset {
            for table in TABLES {
                self.drop_table(table).await?;
            }
            info!(db_name = %self.db_name, "Database reset complete");
        }

        for schema in TABLE_SCHEMAS {
            self.create_table(schema).await?;
        }
        Ok(())
    }

    async fn fetch<R>(&self, query: &str) -> Result<Vec<R>>
    where
        R: Row + for<'b> Deserialize<'b>,
    {
        let client = self.base.clone();
        let start = Instant::now();

        let result = client.query(query).fetch_all::<R>().await;

        let duration_ms = start.elapsed().as_millis();
        match &result {
            Ok(rows) => {
                debug!(query = %query, duration_ms, rows = rows.len(), "ClickHouse query executed")
            }
            Err(e) => error!(query = %query, duration_ms, error = %e, "ClickHouse query failed"),
        }
        result.map_err(Into::into)
    }
}

#[async_trait]
impl ColumnStore for ClickhouseStore {
    async fn save_block(&self, block: &Block) -> Result<()> {
        let body = serde_json::to_string(block)
            .wrap_err_with(|| format!("Failed to encode block {}", block.number))?;
        let row =
            BlockRow { block_number: block.number, block_hash: block.hash.into(), body };

        let client = self.base.clone().with_database(&self.db_name);
        let mut insert = client.insert(BLOCKS_TABLE)?;
        insert.write(&row).await?;
        insert.end().await.wrap_err_with(|| format!("Failed to persist block {}", block.number))
    }

    async fn get_block(&self, number: u64) -> Result<Option<Block>> {
        let query = format!(
            "SELECT block_number, block_hash, body FROM {}.{BLOCKS_TABLE} \
             WHERE block_number = {number} ORDER BY inserted_at DESC LIMIT 1",
            self.db_name
        );
        let rows = self.fetch::<BlockRow>(&query).await?;
        match rows.into_iter().next() {
            Some(row) => serde_json::from_str(&row.body)
                .map(Some)
                .wrap_err_with(|| format!("Failed to decode stored block {number}")),
            None => Ok(None),
        }
    }

    async fn get_last_watermark(&self, table: BlockTable) -> Result<Option<u64>> {
        match table {
            BlockTable::Blocks => {
                let query = format!(
                    "SELECT block_number FROM {}.{BLOCKS_TABLE} \
                     ORDER BY block_number DESC LIMIT 1",
                    self.db_name
                );
                let rows = self.fetch::<NumberRow>(&query).await?;
                Ok(rows.into_iter().next().map(|row| row.block_number))
            }
            BlockTable::Data => {
                let query = format!(
                    "SELECT row_key FROM {}.{DATA_TABLE} \
                     WHERE row_key LIKE '{}%' ORDER BY row_key DESC LIMIT 1",
                    self.db_name,
                    rowkey::BLOCK_PREFIX
                );
                let rows = self.fetch::<KeyRow>(&query).await?;
                rows.into_iter()
                    .next()
                    .map(|row| {
                        rowkey::parse_block_number(&row.row_key, rowkey::BLOCK_PREFIX)
                            .ok_or_else(|| eyre!("malformed block row key: {}", row.row_key))
                    })
                    .transpose()
            }
        }
    }

    async fn get_block_numbers(
        &self,
        table: BlockTable,
        start: u64,
        end: u64,
    ) -> Result<Vec<u64>> {
        match table {
            BlockTable::Blocks => {
                let query = format!(
                    "SELECT DISTINCT block_number FROM {}.{BLOCKS_TABLE} \
                     WHERE block_number BETWEEN {start} AND {end} ORDER BY block_number",
                    self.db_name
                );
                let rows = self.fetch::<NumberRow>(&query).await?;
                Ok(rows.into_iter().map(|row| row.block_number).collect())
            }
            BlockTable::Data => {
                let lo = rowkey::block_row_key(start);
                let hi = rowkey::block_row_key(end);
                let query = format!(
                    "SELECT DISTINCT row_key FROM {}.{DATA_TABLE} \
                     WHERE row_key >= '{lo}' AND row_key <= '{hi}' ORDER BY row_key",
                    self.db_name
                );
                let rows = self.fetch::<KeyRow>(&query).await?;
                rows.into_iter()
                    .map(|row| {
                        rowkey::parse_block_number(&row.row_key, rowkey::BLOCK_PREFIX)
                            .ok_or_else(|| eyre!("malformed block row key: {}", row.row_key))
                    })
                    .collect()
            }
        }
    }

    async fn write_bulk(&self, batch: &BulkMutations, target: MutationTarget) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let client = self.base.clone().with_database(&self.db_name);
        match target {
            MutationTarget::Data => {
                let mut insert = client.insert(DATA_TABLE)?;
                for (key, mutation) in batch.iter() {
                    for cell in mutation.cells() {
                        insert
                            .write(&DataRow {
                                row_key: key.to_owned(),
                                family: cell.family.to_owned(),
                                qualifier: cell.qualifier.clone(),
                                value: cell.value.clone(),
                            })
                            .await?;
                    }
                }
                insert.end().await.wrap_err("Failed to flush data mutations")?;
            }
            MutationTarget::MetadataUpdates => {
                // Only the key carries meaning for a pending signal; cell
                // contents are not persisted.
                let mut insert = client.insert(METADATA_UPDATES_TABLE)?;
                for key in batch.keys() {
                    insert
                        .write(&MetadataUpdateRow { row_key: key.clone(), processed: 0 })
                        .await?;
                }
                insert.end().await.wrap_err("Failed to flush metadata updates")?;
            }
        }
        debug!(table = target.name(), rows = batch.len(), "applied bulk mutations");
        Ok(())
    }

    async fn get_metadata_updates(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let query = format!(
            "SELECT row_key FROM {}.{METADATA_UPDATES_TABLE} FINAL \
             WHERE processed = 0 AND row_key LIKE '{prefix}%' \
             ORDER BY row_key LIMIT {limit}",
            self.db_name
        );
        let rows = self.fetch::<KeyRow>(&query).await?;
        Ok(rows.into_iter().map(|row| row.row_key).collect())
    }

    async fn mark_metadata_updates_processed(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let client = self.base.clone().with_database(&self.db_name);
        let mut insert = client.insert(METADATA_UPDATES_TABLE)?;
        for key in keys {
            insert.write(&MetadataUpdateRow { row_key: key.clone(), processed: 1 }).await?;
        }
        insert.end().await.wrap_err("Failed to mark metadata updates processed")
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, B256, U256};
    use clickhouse::test::{Mock, handlers};
    use primitives::{Block, Mutation};

    use super::*;
    use crate::types::HashBytes;

    fn store_for(mock: &Mock) -> ClickhouseStore {
        let url = Url::parse(mock.url()).unwrap();
        ClickhouseStore::new(url, "db".to_owned(), "user".into(), "pass".into()).unwrap()
    }

    fn sample_block(number: u64) -> Block {
        Block {
            number,
            hash: B256::repeat_byte(0x42),
            parent_hash: B256::repeat_byte(0x41),
            timestamp: 1_700_000_000,
            miner: Address::repeat_byte(0x11),
            difficulty: U256::ZERO,
            gas_limit: 30_000_000,
            gas_used: 0,
            base_fee_per_gas: Some(10),
            transactions: vec![],
            uncles: vec![],
        }
    }

    #[tokio::test]
    async fn get_block_decodes_stored_body() {
        let mock = Mock::new();
        let block = sample_block(7);
        mock.add(handlers::provide(vec![BlockRow {
            block_number: 7,
            block_hash: HashBytes::from(block.hash),
            body: serde_json::to_string(&block).unwrap(),
        }]));

        let store = store_for(&mock);
        let got = store.get_block(7).await.unwrap().expect("block present");
        assert_eq!(got.number, 7);
        assert_eq!(got.hash, block.hash);
    }

    #[tokio::test]
    async fn get_block_missing_returns_none() {
        let mock = Mock::new();
        mock.add(handlers::provide(Vec::<BlockRow>::new()));

        let store = store_for(&mock);
        assert!(store.get_block(9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blocks_watermark_reads_highest_number() {
        let mock = Mock::new();
        mock.add(handlers::provide(vec![NumberRow { block_number: 1234 }]));

        let store = store_for(&mock);
        let watermark = store.get_last_watermark(BlockTable::Blocks).await.unwrap();
        assert_eq!(watermark, Some(1234));
    }

    #[tokio::test]
    async fn empty_table_has_no_watermark() {
        let mock = Mock::new();
        mock.add(handlers::provide(Vec::<NumberRow>::new()));

        let store = store_for(&mock);
        assert_eq!(store.get_last_watermark(BlockTable::Blocks).await.unwrap(), None);
    }

    #[tokio::test]
    async fn data_watermark_parses_last_block_key() {
        let mock = Mock::new();
        mock.add(handlers::provide(vec![KeyRow { row_key: "B:000000001234".to_owned() }]));

        let store = store_for(&mock);
        let watermark = store.get_last_watermark(BlockTable::Data).await.unwrap();
        assert_eq!(watermark, Some(1234));
    }

    #[tokio::test]
    async fn data_watermark_rejects_malformed_keys() {
        let mock = Mock::new();
        mock.add(handlers::provide(vec![KeyRow { row_key: "B:not-a-number".to_owned() }]));

        let store = store_for(&mock);
        assert!(store.get_last_watermark(BlockTable::Data).await.is_err());
    }

    #[tokio::test]
    async fn data_block_numbers_parse_sorted_keys() {
        let mock = Mock::new();
        mock.add(handlers::provide(vec![
            KeyRow { row_key: "B:000000000010".to_owned() },
            KeyRow { row_key: "B:000000000012".to_owned() },
        ]));

        let store = store_for(&mock);
        let numbers = store.get_block_numbers(BlockTable::Data, 10, 12).await.unwrap();
        assert_eq!(numbers, vec![10, 12]);
    }

    #[tokio::test]
    async fn metadata_updates_return_pending_keys() {
        let mock = Mock::new();
        mock.add(handlers::provide(vec![
            KeyRow { row_key: format!("B:{:#x}:00", Address::repeat_byte(1)) },
            KeyRow { row_key: format!("B:{:#x}:00", Address::repeat_byte(2)) },
        ]));

        let store = store_for(&mock);
        let keys = store.get_metadata_updates("B:", 100).await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys[0].starts_with("B:0x"));
    }

    #[tokio::test]
    async fn empty_bulk_write_skips_the_store() {
        // No handler registered: any request would fail the test.
        let mock = Mock::new();
        let store = store_for(&mock);
        store.write_bulk(&BulkMutations::new(), MutationTarget::Data).await.unwrap();
    }

    #[test]
    fn bulk_batch_expands_to_one_row_per_cell() {
        let mut batch = BulkMutations::new();
        batch.push(
            "B:000000000001",
            Mutation::new().set_cell("b", "hash", "0xaa").set_cell("b", "miner", "0xbb"),
        );
        let cells: usize = batch.iter().map(|(_, m)| m.cells().len()).sum();
        assert_eq!(cells, 2);
    }
}
