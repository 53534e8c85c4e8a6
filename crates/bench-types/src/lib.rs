//! Types shared between the controller, the collector and the workers.
//!
//! The controller encodes one [`RunConfig`] per invocation and hands the
//! resulting string, unmodified, to every worker and to the collector.
//! Workers report a [`WorkerResult`] and the collector derives
//! [`InsertReport`] / [`QueryReport`] from the stored results.

pub mod config;
pub mod report;

pub use config::{ConfigError, PrimaryKeyMode, RunConfig, TaskKind};
pub use report::{
    InsertReport, InsertSum, PrefillSignal, QueryReport, QueryStats, QueryTimings, WorkerResult,
};
