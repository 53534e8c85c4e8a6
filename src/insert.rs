//! `dbbench insert`: measure insert throughput over worker counts.

use crate::run_config::build_run_config;
use crate::ControllerOpts;
use bench_controller::{format_insert_summary, format_steps};
use bench_types::RunConfig;
use clap::Args;
use serde_json::{json, Map, Value};
use tracing::info;

#[derive(Args, Clone, Debug)]
pub struct InsertArgs {
    #[command(flatten)]
    pub opts: ControllerOpts,

    /// Worker counts to test, comma separated
    #[arg(short, long, value_delimiter = ',', default_value = "1,4,8,12,16")]
    pub workers: Vec<usize>,

    /// Number of runs per worker count
    #[arg(short, long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub runs: u32,

    /// How primary keys are generated
    #[arg(long, default_value = "db", value_parser = ["db", "sql", "uuid", "client"])]
    pub primary_key: String,

    /// Use one table or four
    #[arg(long, default_value = "single", value_parser = ["single", "multiple"])]
    pub tables: String,

    /// Number of inserts per worker
    #[arg(long, default_value_t = 10000)]
    pub num_inserts: u64,

    /// Events inserted before the measured phase, split across workers
    #[arg(long, default_value_t = 0)]
    pub prefill: u64,

    /// Events per batch; 0 disables batch mode
    #[arg(long, default_value_t = 0)]
    pub batch: usize,

    /// Keep existing data instead of cleaning the database before each run
    #[arg(long)]
    pub no_clean: bool,

    /// Synthetic devices per worker
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub device_spread: u32,

    /// Fill the database in this many consecutive runs, measuring each
    #[arg(long, default_value_t = 0)]
    pub steps: u32,
}

impl InsertArgs {
    /// Reject option combinations that steps mode cannot honour.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers.is_empty() || self.workers.contains(&0) {
            anyhow::bail!("Worker counts must be positive");
        }
        if self.steps > 0 {
            if self.workers.len() > 1 {
                anyhow::bail!("If using --steps only one worker count can be used");
            }
            if self.runs > 1 {
                anyhow::bail!("If using --steps only one run is allowed");
            }
            if self.prefill > 0 {
                anyhow::bail!("--steps and --prefill cannot be used at the same time");
            }
        }
        Ok(())
    }

    fn fields(&self) -> Map<String, Value> {
        let mut fields = json!({
            "task": "insert",
            "num_inserts": self.num_inserts,
            "prefill": self.prefill,
            "primary_key": self.primary_key,
            "use_multiple_tables": self.tables == "multiple",
            "clean_database": !self.no_clean,
            "device_spread": self.device_spread,
        });
        if self.batch > 0 {
            fields["batch_mode"] = json!(true);
            fields["batch_size"] = json!(self.batch);
        }
        match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    pub fn run_config(&self, target: &crate::TargetConfig) -> anyhow::Result<RunConfig> {
        build_run_config(target, self.fields(), &self.opts.extra_options)
    }
}

pub async fn run_insert(args: InsertArgs) -> anyhow::Result<()> {
    args.validate()?;
    let (config, controller) = args.opts.controller()?;
    let run_config = args.run_config(config.target(&args.opts.target)?)?;
    info!(
        "Insert benchmark against '{}' ({}) in namespace {}",
        args.opts.target,
        run_config.module,
        controller.settings().namespace
    );

    if args.steps > 0 {
        let workers = args.workers[0];
        let results = controller.run_steps(&run_config, workers, args.steps).await?;
        println!(
            "{}",
            format_steps(workers as u64 * run_config.num_inserts, &results)
        );
    } else {
        let series = controller
            .run_insert_series(&run_config, &args.workers, args.runs)
            .await?;
        println!("{}", format_insert_summary(&series));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        args: InsertArgs,
    }

    fn parse(args: &[&str]) -> InsertArgs {
        let mut argv = vec!["dbbench", "-t", "pg"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().args
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.workers, vec![1, 4, 8, 12, 16]);
        assert_eq!(args.runs, 3);
        assert_eq!(args.num_inserts, 10000);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_steps_combinations_rejected() {
        assert!(parse(&["--steps", "3", "-w", "4", "-r", "1"]).validate().is_ok());
        assert!(parse(&["--steps", "3", "-w", "4,8", "-r", "1"])
            .validate()
            .is_err());
        assert!(parse(&["--steps", "3", "-w", "4"]).validate().is_err());
        assert!(parse(&["--steps", "3", "-w", "4", "-r", "1", "--prefill", "10"])
            .validate()
            .is_err());
    }

    #[test]
    fn test_zero_runs_rejected_by_parser() {
        assert!(Cli::try_parse_from(["dbbench", "-t", "pg", "-r", "0"]).is_err());
    }

    #[test]
    fn test_run_config_fields() {
        let mut target = crate::TargetConfig::new();
        target.insert("module".to_string(), json!("memory"));
        let args = parse(&[
            "--num-inserts",
            "500",
            "--batch",
            "50",
            "--tables",
            "multiple",
            "--no-clean",
            "--primary-key",
            "client",
        ]);

        let config = args.run_config(&target).unwrap();
        assert_eq!(config.num_inserts, 500);
        assert!(config.batch_mode);
        assert_eq!(config.batch_size, Some(50));
        assert!(config.use_multiple_tables);
        assert!(!config.clean_database);
        assert_eq!(config.primary_key, bench_types::PrimaryKeyMode::Client);
    }
}
