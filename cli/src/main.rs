//! ChainStream CLI — follow a Steem-family chain from the terminal.
//!
//! # Commands
//! ```
//! chainstream head
//! chainstream block    <num>
//! chainstream stream   --start <n> [--stop <n>] [--ops vote,transfer] [--raw] [--only-ops]
//! chainstream stats    --start <n> --stop <n>
//! chainstream estimate --time 2018-03-09T06:21:06Z [--forward] [--coarse]
//! chainstream wait     --block <n> [--repetitions <n>]
//! chainstream confirm  --tx '<signed transaction json>' [--attempts <n>]
//! ```

use std::process;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;

use chainstream_core::block::parse_time;
use chainstream_core::{ChainMode, Direction, Precision, StreamError, StreamOptions};
use chainstream_steem::BlockchainBuilder;

mod logging;

use logging::{init_tracing, LogConfig};

#[derive(Parser)]
#[command(
    name = "chainstream",
    about = "Stream blocks and operations from a Steem-family node",
    version
)]
struct Cli {
    /// Node URL
    #[arg(long, global = true, default_value = chainstream_steem::builder::DEFAULT_URL)]
    url: String,

    /// Use appbase APIs instead of condenser_api
    #[arg(long, global = true)]
    appbase: bool,

    /// "head" or "irreversible"
    #[arg(long, global = true, default_value = "head")]
    mode: ChainMode,

    /// Blocks fetched concurrently while catching up
    #[arg(long, global = true, default_value_t = 1)]
    batch_size: u64,

    /// trace | debug | info | warn | error
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit JSON logs on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current block number and time
    Head,

    /// Print one normalized block as JSON
    Block {
        num: u64,
    },

    /// Stream operations as JSON lines
    Stream {
        #[arg(long)]
        start: Option<u64>,
        /// Follow the head forever when omitted
        #[arg(long)]
        stop: Option<u64>,
        /// Comma-separated operation types, e.g. vote,transfer
        #[arg(long, value_delimiter = ',')]
        ops: Vec<String>,
        /// Emit the [type, value] pair instead of the flat view
        #[arg(long)]
        raw: bool,
        /// Skip transaction context
        #[arg(long)]
        only_ops: bool,
    },

    /// Count operations per type over a block range
    Stats {
        #[arg(long)]
        start: u64,
        #[arg(long)]
        stop: u64,
    },

    /// Estimate the block number produced at a point in time
    Estimate {
        /// RFC 3339 or `%Y-%m-%dT%H:%M:%S` (UTC)
        #[arg(long)]
        time: String,
        /// First block at or after the time, instead of the last before it
        #[arg(long)]
        forward: bool,
        /// Interpolate only; no search
        #[arg(long)]
        coarse: bool,
    },

    /// Wait until a block exists and print it
    Wait {
        #[arg(long)]
        block: u64,
        #[arg(long)]
        repetitions: Option<u32>,
    },

    /// Wait for a signed transaction to be included
    Confirm {
        /// Signed transaction JSON
        #[arg(long)]
        tx: String,
        #[arg(long)]
        attempts: Option<u32>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(&LogConfig {
        level: cli.log_level.clone(),
        json: cli.json_logs,
        ..Default::default()
    });

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(exit_code(&e));
    }
}

/// 2 = a bounded wait ran out, 3 = retrying cannot help, 1 = anything else.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<StreamError>() {
        Some(e) if e.is_timeout() => 2,
        Some(e) if e.is_terminal() => 3,
        _ => 1,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let chain = BlockchainBuilder::new()
        .url(&cli.url)
        .appbase(cli.appbase)
        .mode(cli.mode)
        .batch_size(cli.batch_size)
        .build()
        .context("failed to create node client")?;

    match cli.command {
        Commands::Head => {
            let block = chain.get_current_block().await?;
            println!("Block:  {}", block.number);
            println!("Time:   {} ({})", block.time().format("%Y-%m-%dT%H:%M:%S"), block.unix_timestamp());
            println!("Ops:    {}", block.op_count());
            println!("Mode:   {}", chain.config().mode);
        }

        Commands::Block { num } => {
            let block = chain
                .get_block(num)
                .await?
                .ok_or_else(|| anyhow!("block {num} not found"))?;
            println!("{}", serde_json::to_string_pretty(&block)?);
        }

        Commands::Stream {
            start,
            stop,
            ops,
            raw,
            only_ops,
        } => {
            let mut opts = StreamOptions::new().op_names(ops).raw_ops(raw).only_ops(only_ops);
            opts.start = start;
            opts.stop = stop;
            let mut stream = chain.stream(opts);
            while let Some(op) = stream.try_next().await? {
                println!("{}", serde_json::to_string(&op)?);
            }
        }

        Commands::Stats { start, stop } => {
            let counts = chain.ops_statistics(start, stop).await?;
            let total: u64 = counts.values().sum();
            println!("Blocks {start}..={stop}: {total} operations");
            for (op_type, count) in &counts {
                println!("  {op_type:<32} {count}");
            }
        }

        Commands::Estimate { time, forward, coarse } => {
            let at = parse_time(&time).ok_or_else(|| anyhow!("unrecognized time '{time}'"))?;
            let direction = if forward { Direction::Forward } else { Direction::Backward };
            let precision = if coarse { Precision::Coarse } else { Precision::Accurate };
            let num = chain.get_estimated_block_num(at, direction, precision).await?;
            let produced = chain.block_time(num).await?;
            println!("Block:  {num}");
            println!("Time:   {}", produced.format("%Y-%m-%dT%H:%M:%S"));
        }

        Commands::Wait { block, repetitions } => {
            let found = chain.wait_for_and_get_block(block, repetitions).await?;
            println!("Block {} at {}", found.number, found.time().format("%Y-%m-%dT%H:%M:%S"));
        }

        Commands::Confirm { tx, attempts } => {
            let tx: serde_json::Value = serde_json::from_str(&tx).context("--tx is not valid JSON")?;
            let block = chain.await_transaction(&tx, attempts).await?;
            println!("Confirmed in block {block}");
        }
    }

    Ok(())
}
