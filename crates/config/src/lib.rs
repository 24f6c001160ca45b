//! Etherscribe configuration
use clap::Parser;
use derive_more::Debug;
use url::Url;

/// Clickhouse database configuration options
#[derive(Debug, Clone, Parser)]
pub struct ClickhouseOpts {
    /// Clickhouse URL
    #[clap(id = "clickhouse_url", long = "clickhouse-url", env = "CLICKHOUSE_URL")]
    pub url: Url,
    /// Clickhouse database
    #[clap(long = "clickhouse-db", env = "CLICKHOUSE_DB")]
    pub db: String,
    /// Clickhouse username
    #[clap(long = "clickhouse-username", env = "CLICKHOUSE_USERNAME")]
    pub username: String,
    /// Clickhouse password
    #[clap(long = "clickhouse-password", env = "CLICKHOUSE_PASSWORD")]
    #[debug(skip)]
    pub password: String,
}

/// Node endpoint configuration options
#[derive(Debug, Clone, Parser)]
pub struct RpcOpts {
    /// Execution-layer JSON-RPC URL
    #[clap(id = "rpc_url", long = "rpc-url", env = "RPC_URL")]
    pub url: Url,
}

/// CLI options for etherscribe
#[derive(Debug, Clone, Parser)]
pub struct Opts {
    /// Clickhouse database configuration
    #[clap(flatten)]
    pub clickhouse: ClickhouseOpts,

    /// Node endpoint configuration
    #[clap(flatten)]
    pub rpc: RpcOpts,

    /// Fetch and transform exactly this block, then exit
    #[clap(long)]
    pub block: Option<u64>,

    /// First block of a fetch range (with `--blocks-end`)
    #[clap(long)]
    pub blocks_start: Option<u64>,
    /// Last block of a fetch range (with `--blocks-start`)
    #[clap(long)]
    pub blocks_end: Option<u64>,
    /// Worker bound of the fetch stage
    #[clap(long, default_value = "30")]
    pub blocks_concurrency: usize,

    /// First block of a transform range (with `--data-end`)
    #[clap(long)]
    pub data_start: Option<u64>,
    /// Last block of a transform range (with `--data-start`)
    #[clap(long)]
    pub data_end: Option<u64>,
    /// Worker bound of the transform stage
    #[clap(long, default_value = "30")]
    pub data_concurrency: usize,

    /// Trailing blocks re-fetched every sync cycle
    #[clap(long, default_value = "100")]
    pub blocks_offset: u64,
    /// Trailing blocks re-transformed every sync cycle
    #[clap(long, default_value = "1000")]
    pub data_offset: u64,

    /// Audit the blocks table for gaps, then exit
    #[clap(long)]
    pub check_blocks_gaps: bool,
    /// Audit the data table for gaps, then exit
    #[clap(long)]
    pub check_data_gaps: bool,
    /// Blocks scanned below the watermark by a gap audit
    #[clap(long, default_value = "1000000")]
    pub gaps_lookback: u64,

    /// Metadata-update signals drained per reconciler batch
    #[clap(long, default_value = "10000")]
    pub metadata_batch: usize,
    /// Seconds between sync cycles
    #[clap(long, default_value = "14")]
    pub sync_interval_secs: u64,

    /// If set, drop & re-create all tables (local/dev only)
    #[clap(long)]
    pub reset_db: bool,
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::Opts;

    const BASE_ARGS: [&str; 11] = [
        "etherscribe",
        "--clickhouse-url",
        "http://localhost:8123",
        "--clickhouse-db",
        "etherscribe",
        "--clickhouse-username",
        "default",
        "--clickhouse-password",
        "hunter2",
        "--rpc-url",
        "http://localhost:8545",
    ];

    #[test]
    fn test_verify_cli() {
        Opts::command().debug_assert()
    }

    #[test]
    fn defaults_match_the_perpetual_mode() {
        let opts = Opts::try_parse_from(BASE_ARGS).unwrap();
        assert_eq!(opts.block, None);
        assert_eq!(opts.blocks_concurrency, 30);
        assert_eq!(opts.data_concurrency, 30);
        assert_eq!(opts.blocks_offset, 100);
        assert_eq!(opts.data_offset, 1000);
        assert_eq!(opts.gaps_lookback, 1_000_000);
        assert_eq!(opts.metadata_batch, 10_000);
        assert_eq!(opts.sync_interval_secs, 14);
        assert!(!opts.check_blocks_gaps);
        assert!(!opts.reset_db);
    }

    #[test]
    fn range_flags_parse_together() {
        let mut args: Vec<&str> = BASE_ARGS.to_vec();
        args.extend(["--blocks-start", "100", "--blocks-end", "200", "--blocks-concurrency", "8"]);
        let opts = Opts::try_parse_from(args).unwrap();
        assert_eq!(opts.blocks_start, Some(100));
        assert_eq!(opts.blocks_end, Some(200));
        assert_eq!(opts.blocks_concurrency, 8);
    }

    #[test]
    fn the_password_never_reaches_debug_output() {
        let opts = Opts::try_parse_from(BASE_ARGS).unwrap();
        let rendered = format!("{:?}", opts.clickhouse);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("etherscribe"));
    }
}
