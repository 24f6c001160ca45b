//! Gap auditing: report missing block numbers in a trailing window of a
//! table's sequence.

use clickhouse::{BlockTable, ColumnStore};
use eyre::Result;
use tracing::debug;

/// A maximal run of consecutive missing block numbers, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    /// First missing number
    pub start: u64,
    /// Last missing number
    pub end: u64,
}

/// Scan the `lookback` block numbers trailing the watermark of `table` and
/// return every gap, in ascending order. An empty table reports the whole
/// requested window as one gap. Read-only; safe to run while ingestion is
/// writing (transient gaps mid-flush may show up).
pub async fn check_for_gaps<S>(store: &S, table: BlockTable, lookback: u64) -> Result<Vec<Gap>>
where
    S: ColumnStore + ?Sized,
{
    let Some(watermark) = store.get_last_watermark(table).await? else {
        return Ok(vec![Gap { start: 0, end: lookback }]);
    };

    let window_start = watermark.saturating_sub(lookback);
    let present = store.get_block_numbers(table, window_start, watermark).await?;
    debug!(
        table = table.name(),
        window_start,
        watermark,
        present = present.len(),
        "scanning for gaps"
    );

    let mut gaps = Vec::new();
    let mut stored = present.into_iter().peekable();
    let mut run_start = None;
    for number in window_start..=watermark {
        if stored.peek() == Some(&number) {
            stored.next();
            if let Some(start) = run_start.take() {
                gaps.push(Gap { start, end: number - 1 });
            }
        } else if run_start.is_none() {
            run_start = Some(number);
        }
    }
    if let Some(start) = run_start {
        gaps.push(Gap { start, end: watermark });
    }
    Ok(gaps)
}

#[cfg(test)]
mod tests {
    use clickhouse::mem::MemStore;

    use crate::support;

    use super::*;

    async fn store_with_blocks(numbers: &[u64]) -> MemStore {
        let store = MemStore::default();
        for &number in numbers {
            store.save_block(&support::sample_block(number)).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn a_dense_window_has_no_gaps() {
        let numbers: Vec<u64> = (100..=110).collect();
        let store = store_with_blocks(&numbers).await;

        let gaps = check_for_gaps(&store, BlockTable::Blocks, 10).await.unwrap();
        assert!(gaps.is_empty());
    }

    #[tokio::test]
    async fn a_missing_run_is_reported_once() {
        let numbers: Vec<u64> =
            (100..=110).filter(|n| !(105..=107).contains(n)).collect();
        let store = store_with_blocks(&numbers).await;

        let gaps = check_for_gaps(&store, BlockTable::Blocks, 10).await.unwrap();
        assert_eq!(gaps, vec![Gap { start: 105, end: 107 }]);
    }

    #[tokio::test]
    async fn disjoint_runs_stay_separate() {
        let numbers: Vec<u64> =
            (100..=110).filter(|n| *n != 102 && *n != 108 && *n != 109).collect();
        let store = store_with_blocks(&numbers).await;

        let gaps = check_for_gaps(&store, BlockTable::Blocks, 10).await.unwrap();
        assert_eq!(
            gaps,
            vec![Gap { start: 102, end: 102 }, Gap { start: 108, end: 109 }]
        );
    }

    #[tokio::test]
    async fn a_gap_at_the_window_start_is_found() {
        let numbers: Vec<u64> = (103..=110).collect();
        let store = store_with_blocks(&numbers).await;

        let gaps = check_for_gaps(&store, BlockTable::Blocks, 10).await.unwrap();
        assert_eq!(gaps, vec![Gap { start: 100, end: 102 }]);
    }

    #[tokio::test]
    async fn an_empty_table_reports_the_whole_window() {
        let store = MemStore::default();

        let gaps = check_for_gaps(&store, BlockTable::Blocks, 500).await.unwrap();
        assert_eq!(gaps, vec![Gap { start: 0, end: 500 }]);
    }

    #[tokio::test]
    async fn the_data_table_is_audited_through_its_row_keys() {
        let store = MemStore::default();
        for number in [7u64, 8, 10] {
            let mut batch = primitives::BulkMutations::new();
            batch.push(
                clickhouse::rowkey::block_row_key(number),
                primitives::Mutation::new().set_cell("b", "hash", "0x00"),
            );
            store.write_bulk(&batch, clickhouse::MutationTarget::Data).await.unwrap();
        }

        let gaps = check_for_gaps(&store, BlockTable::Data, 5).await.unwrap();
        assert_eq!(gaps, vec![Gap { start: 5, end: 6 }, Gap { start: 9, end: 9 }]);
    }
}
