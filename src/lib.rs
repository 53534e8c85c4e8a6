//! dbbench: distributed insert and query benchmarks for databases.
//!
//! The same binary plays every role of a run:
//!
//! - `dbbench insert` / `dbbench query` run on the operator's machine and
//!   drive deployments through `kubectl` (see [`insert`] and [`query`]).
//! - `dbbench collector` runs in the collector pod ([`collector`]).
//! - `dbbench worker` runs in each worker pod ([`worker`]).
//!
//! # CLI Usage
//!
//! ```bash
//! # Insert benchmark with 1, 4 and 8 workers, three runs each
//! dbbench insert -t local-pg -w 1,4,8 -r 3 --num-inserts 10000
//!
//! # Fill the database in five steps with 4 workers
//! dbbench insert -t local-pg -w 4 -r 1 --steps 5
//!
//! # Query benchmark, each query repeated three times
//! dbbench query -t local-pg -w 1 -r 3
//! ```

use bench_cluster::KubectlOrchestrator;
use bench_controller::{ControllerTimings, RunController, RunSettings};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

pub mod collector;
pub mod config;
pub mod insert;
pub mod query;
pub mod run_config;
pub mod worker;

pub use config::{parse_duration, parse_timeout, BenchConfig, TargetConfig};
pub use run_config::{build_run_config, parse_extra_option};

/// Options shared by the controller-side commands.
#[derive(Args, Clone, Debug)]
pub struct ControllerOpts {
    /// Name of the target in the config file
    #[arg(short, long)]
    pub target: String,

    /// Config file to use
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Extra option for the database module, as key=value (repeatable)
    #[arg(long = "extra-option", value_name = "KEY=VALUE")]
    pub extra_options: Vec<String>,

    /// Time to wait for one run to complete ("300", "10m", "1h"); 0 disables
    #[arg(long, default_value = "0")]
    pub timeout: String,

    /// Namespace to deploy into (overrides the config file)
    #[arg(long)]
    pub namespace: Option<String>,

    /// Container image for collector and workers (overrides the config file)
    #[arg(long)]
    pub image: Option<String>,

    /// Release name prefixing every created resource
    #[arg(long, default_value = "dbtest")]
    pub release: String,

    /// kubeconfig context to use
    #[arg(long, env = "KUBE_CONTEXT")]
    pub kube_context: Option<String>,
}

impl ControllerOpts {
    /// Load the config file and build a kubectl-backed controller.
    pub fn controller(
        &self,
    ) -> anyhow::Result<(BenchConfig, RunController<KubectlOrchestrator>)> {
        let config = BenchConfig::from_file(&self.config)?;
        let settings = RunSettings {
            release: self.release.clone(),
            namespace: self
                .namespace
                .clone()
                .unwrap_or_else(|| config.namespace.clone()),
            image: self.image.clone().unwrap_or_else(|| config.image.clone()),
        };
        let timings = ControllerTimings {
            timeout: parse_timeout(&self.timeout)?,
            ..ControllerTimings::default()
        };

        let mut orchestrator = KubectlOrchestrator::new();
        if let Some(context) = &self.kube_context {
            orchestrator = orchestrator.with_context(context);
        }
        let controller = RunController::new(Arc::new(orchestrator), settings).with_timings(timings);
        Ok((config, controller))
    }
}
