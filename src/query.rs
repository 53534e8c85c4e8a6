//! `dbbench query`: time the named-query set.

use crate::run_config::build_run_config;
use crate::ControllerOpts;
use bench_controller::format_query_summary;
use bench_types::RunConfig;
use clap::Args;
use serde_json::{json, Map, Value};
use tracing::info;

#[derive(Args, Clone, Debug)]
pub struct QueryArgs {
    #[command(flatten)]
    pub opts: ControllerOpts,

    /// Worker counts to test, comma separated
    #[arg(short, long, value_delimiter = ',', default_value = "1")]
    pub workers: Vec<usize>,

    /// Number of times each query is executed per worker
    #[arg(short, long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub runs: u32,

    /// Number of deployments per worker count
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub repetitions: u32,
}

impl QueryArgs {
    pub fn run_config(&self, target: &crate::TargetConfig) -> anyhow::Result<RunConfig> {
        let mut fields = Map::new();
        fields.insert("task".to_string(), json!("query"));
        fields.insert("runs".to_string(), Value::from(self.runs));
        build_run_config(target, fields, &self.opts.extra_options)
    }
}

pub async fn run_query(args: QueryArgs) -> anyhow::Result<()> {
    if args.workers.is_empty() || args.workers.contains(&0) {
        anyhow::bail!("Worker counts must be positive");
    }
    let (config, controller) = args.opts.controller()?;
    let run_config = args.run_config(config.target(&args.opts.target)?)?;
    info!(
        "Query benchmark against '{}' ({}), {} runs per query",
        args.opts.target, run_config.module, run_config.runs
    );

    let series = controller
        .run_query_series(&run_config, &args.workers, args.repetitions)
        .await?;
    println!("{}", format_query_summary(&series));
    Ok(())
}
