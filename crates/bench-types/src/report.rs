//! Worker result records and the aggregate report shapes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-query duration samples in seconds, keyed by query name.
pub type QueryTimings = BTreeMap<String, Vec<f64>>;

/// Result record a worker posts at the end of its measured phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerResult {
    Insert {
        worker: String,
        operations: u64,
        /// Measured phase duration in seconds.
        duration: f64,
    },
    Query {
        worker: String,
        results: QueryTimings,
    },
}

impl WorkerResult {
    /// Identity of the reporting worker.
    pub fn worker(&self) -> &str {
        match self {
            WorkerResult::Insert { worker, .. } | WorkerResult::Query { worker, .. } => worker,
        }
    }
}

/// Body of `POST /prefill`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefillSignal {
    pub worker: String,
}

/// Totals of an insert run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertSum {
    pub operations: u64,
    pub duration: f64,
    pub ops_per_second: f64,
}

/// Aggregate report of an insert run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertReport {
    pub workers: BTreeMap<String, WorkerResult>,
    pub sum: InsertSum,
}

/// Min/max/avg of one named query in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl QueryStats {
    /// Statistics over the given samples, `None` when there are none.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = samples.iter().sum::<f64>() / samples.len() as f64;
        Some(Self { min, max, avg })
    }
}

/// Aggregate report of a query run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryReport {
    pub queries: BTreeMap<String, QueryStats>,
}
