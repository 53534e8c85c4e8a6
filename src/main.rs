//! Command-line interface for dbbench
//!
//! # Usage Examples
//!
//! ```bash
//! # Insert throughput for 1, 4 and 8 workers
//! dbbench insert -t local-pg -w 1,4,8 --num-inserts 10000 --timeout 30m
//!
//! # Query timings with batch-inserted data already present
//! dbbench query -t local-pg -r 5
//!
//! # In-cluster roles (configured through POD_NAME, COLLECTOR_URL,
//! # RUN_CONFIG and WORKER_COUNT)
//! dbbench collector
//! dbbench worker
//! ```

use clap::{Parser, Subcommand};
use dbbench::collector::{run_collector_process, CollectorArgs};
use dbbench::insert::{run_insert, InsertArgs};
use dbbench::query::{run_query, QueryArgs};
use dbbench::worker::{run_worker, WorkerArgs};

#[derive(Parser)]
#[command(name = "dbbench")]
#[command(about = "Distributed insert and query benchmarks for databases")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure insert throughput for one or more worker counts
    Insert(InsertArgs),

    /// Measure query durations
    Query(QueryArgs),

    /// Run as a worker inside the cluster
    Worker(WorkerArgs),

    /// Run as the collector inside the cluster
    Collector(CollectorArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Insert(args) => run_insert(args).await,
        Commands::Query(args) => run_query(args).await,
        Commands::Worker(args) => run_worker(args).await,
        Commands::Collector(args) => run_collector_process(args).await,
    }
}
