//! `dbbench worker`: one worker pod of a run.

use anyhow::Context;
use bench_types::RunConfig;
use bench_worker::{create_backend, CollectorClient, WorkerCoordinator, WorkerTimings};
use clap::Args;
use tracing::info;

#[derive(Args, Clone, Debug)]
pub struct WorkerArgs {
    /// Identity of this worker, unique within the run
    #[arg(long, env = "POD_NAME")]
    pub identity: String,

    /// Base URL of the collector
    #[arg(long, env = "COLLECTOR_URL", default_value = "http://localhost:5000")]
    pub collector_url: String,

    /// Encoded run configuration
    #[arg(long, env = "RUN_CONFIG", hide_env_values = true)]
    pub run_config: String,

    /// Number of workers in the run
    #[arg(long, env = "WORKER_COUNT", default_value_t = 1)]
    pub worker_count: usize,
}

pub async fn run_worker(args: WorkerArgs) -> anyhow::Result<()> {
    let config = RunConfig::decode(&args.run_config).context("Failed to decode RUN_CONFIG")?;
    let backend = create_backend(&config)
        .with_context(|| format!("Failed to create backend '{}'", config.module))?;

    let timings = WorkerTimings::default();
    let collector = CollectorClient::new(&args.collector_url, timings.request_timeout)?;
    let coordinator = WorkerCoordinator::new(
        args.identity,
        config,
        args.worker_count,
        backend,
        collector,
    )
    .with_timings(timings);

    coordinator
        .run()
        .await
        .with_context(|| format!("Worker '{}' failed", coordinator.identity()))?;
    info!("Worker '{}' done", coordinator.identity());
    Ok(())
}
