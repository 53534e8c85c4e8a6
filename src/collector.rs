//! `dbbench collector`: the collector pod of a run.

use anyhow::Context;
use bench_collector::{run_collector, Collector};
use bench_types::{RunConfig, TaskKind};
use bench_worker::create_backend;
use clap::Args;
use tracing::info;

#[derive(Args, Clone, Debug)]
pub struct CollectorArgs {
    /// Address to listen on
    #[arg(long, env = "COLLECTOR_LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: String,

    /// Encoded run configuration
    #[arg(long, env = "RUN_CONFIG", hide_env_values = true)]
    pub run_config: String,

    /// Number of workers expected to report
    #[arg(long, env = "WORKER_COUNT", default_value_t = 1)]
    pub worker_count: usize,
}

pub async fn run_collector_process(args: CollectorArgs) -> anyhow::Result<()> {
    let config = RunConfig::decode(&args.run_config).context("Failed to decode RUN_CONFIG")?;
    let collector = Collector::new(config.task, args.worker_count);

    // Insert runs start from a prepared database; query runs read what is there.
    let init = async {
        if config.task == TaskKind::Insert {
            let backend = create_backend(&config)
                .with_context(|| format!("Failed to create backend '{}'", config.module))?;
            info!("Initialising backend {}", backend.name());
            backend.init().await?;
        }
        Ok::<(), anyhow::Error>(())
    };

    run_collector(&args.listen, collector, init).await
}
