//! Entrypoint.

use std::{sync::Arc, time::Duration};

use clap::Parser;
use clickhouse::{BlockTable, ClickhouseStore, ColumnStore};
use config::Opts;
use dotenvy::dotenv;
use extractor::Extractor;
use indexer::{
    BalanceLogger, SyncConfig, check_for_gaps, index_from_node, index_from_store, reconcile,
    registry, run_sync,
};
use runtime::{ShutdownSignal, run_until_shutdown};
use tracing::{info, warn};
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    if let Ok(custom_env_file) = std::env::var("ENV_FILE") {
        dotenvy::from_filename(custom_env_file)?;
    } else {
        // Try the default .env file, and ignore if it doesn't exist.
        dotenv().ok();
    }

    let opts = Opts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    info!("Etherscribe indexer starting...");

    let store = Arc::new(ClickhouseStore::new(
        opts.clickhouse.url.clone(),
        opts.clickhouse.db.clone(),
        opts.clickhouse.username.clone(),
        opts.clickhouse.password.clone(),
    )?);
    store.init_db(opts.reset_db).await?;

    let node = Arc::new(Extractor::new(opts.rpc.url.clone()));
    let transforms = Arc::new(registry());

    // A crashed previous run may have left balance signals queued; drain them
    // before any indexing mode starts producing new ones.
    reconcile(&*node, &*store, &BalanceLogger, opts.metadata_batch).await?;

    if let Some(number) = opts.block {
        index_from_node(Arc::clone(&node), Arc::clone(&store), number, number, 1).await?;
        index_from_store(Arc::clone(&store), number, number, Arc::clone(&transforms), 1).await?;
        reconcile(&*node, &*store, &BalanceLogger, opts.metadata_batch).await?;
        return Ok(());
    }

    let mut ran_one_shot = false;
    if let (Some(start), Some(end)) = (opts.blocks_start, opts.blocks_end) {
        index_from_node(
            Arc::clone(&node),
            Arc::clone(&store),
            start,
            end,
            opts.blocks_concurrency,
        )
        .await?;
        ran_one_shot = true;
    }
    if let (Some(start), Some(end)) = (opts.data_start, opts.data_end) {
        index_from_store(
            Arc::clone(&store),
            start,
            end,
            Arc::clone(&transforms),
            opts.data_concurrency,
        )
        .await?;
        reconcile(&*node, &*store, &BalanceLogger, opts.metadata_batch).await?;
        ran_one_shot = true;
    }
    if opts.check_blocks_gaps {
        report_gaps(&*store, BlockTable::Blocks, opts.gaps_lookback).await?;
        ran_one_shot = true;
    }
    if opts.check_data_gaps {
        report_gaps(&*store, BlockTable::Data, opts.gaps_lookback).await?;
        ran_one_shot = true;
    }
    if ran_one_shot {
        return Ok(());
    }

    let config = SyncConfig {
        blocks_offset: opts.blocks_offset,
        data_offset: opts.data_offset,
        blocks_concurrency: opts.blocks_concurrency,
        data_concurrency: opts.data_concurrency,
        interval: Duration::from_secs(opts.sync_interval_secs),
    };
    let shutdown = ShutdownSignal::new()?;
    run_until_shutdown(run_sync(node, store, transforms, config), shutdown, || {
        info!("Shutdown signal received, stopping the sync loop");
    })
    .await
}

async fn report_gaps<S>(store: &S, table: BlockTable, lookback: u64) -> eyre::Result<()>
where
    S: ColumnStore + ?Sized,
{
    let gaps = check_for_gaps(store, table, lookback).await?;
    if gaps.is_empty() {
        info!(table = table.name(), lookback, "no gaps found");
        return Ok(());
    }
    for gap in &gaps {
        warn!(table = table.name(), start = gap.start, end = gap.end, "missing block range");
    }
    info!(table = table.name(), gaps = gaps.len(), "gap audit finished");
    Ok(())
}
