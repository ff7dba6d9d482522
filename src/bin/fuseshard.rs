//! Benchmark driver: build a sharded fuse filter over random keys and query it.
//!
//! ```text
//! fuseshard <SHARD_COUNT> <THREAD_COUNT> [--keys N] [--max-shard-capacity N]
//!           [--seed N] [--fingerprint 8|16|32]
//! ```
//!
//! Progress events are forwarded from `tracing` to `env_logger` on stderr
//! (`RUST_LOG`, default `info`).

use clap::Parser;
use env_logger::{Builder, Env};
use fuseshard::core::{DEFAULT_MAX_SHARD_CAPACITY, DEFAULT_TOTAL_KEYS};
use fuseshard::{FingerprintWidth, Pipeline, PipelineConfig};
use tracing::error;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "fuseshard",
    version,
    about = "Build and query a sharded binary fuse filter over random 64-bit keys",
    arg_required_else_help = true
)]
struct Cli {
    /// Number of sub-filters to split the keys across
    shard_count: usize,

    /// Worker threads used to populate the sub-filters
    thread_count: usize,

    /// Total keys to generate
    #[arg(long, default_value_t = DEFAULT_TOTAL_KEYS)]
    keys: usize,

    /// Largest number of keys a single sub-filter may hold
    #[arg(long, default_value_t = DEFAULT_MAX_SHARD_CAPACITY)]
    max_shard_capacity: usize,

    /// RNG seed for the key workload
    #[arg(long)]
    seed: Option<u64>,

    /// Fingerprint width in bits: 8, 16 or 32
    #[arg(long, default_value = "32")]
    fingerprint: FingerprintWidth,
}

fn init_logger() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() -> ExitCode {
    init_logger();
    let cli = Cli::parse();

    let mut config = PipelineConfig::new(cli.shard_count, cli.thread_count)
        .with_total_keys(cli.keys)
        .with_max_shard_capacity(cli.max_shard_capacity)
        .with_fingerprint(cli.fingerprint);
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }

    let pipeline = match Pipeline::new(config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match pipeline.run() {
        Ok(report) => {
            println!(
                "found {} of {} queries ({} present, observed fp rate {:.3e})",
                report.found,
                report.total_keys,
                report.retained_keys,
                report.false_positive_rate()
            );
            println!(
                "allocate {:.3}s, generate {:.3}s, populate {:.3}s, query {:.3}s, {} filter bytes",
                report.allocate_time.as_secs_f64(),
                report.generate_time.as_secs_f64(),
                report.populate_time.as_secs_f64(),
                report.query_time.as_secs_f64(),
                report.memory_bytes
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
