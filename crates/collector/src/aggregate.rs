//! Report aggregation over stored worker results.
//!
//! Both reductions are commutative, so the arrival order of results does
//! not matter.

use crate::store::ReportError;
use bench_types::{InsertReport, InsertSum, QueryReport, QueryStats, WorkerResult};
use std::collections::BTreeMap;

/// Aggregate insert results.
///
/// `ops_per_second = sum(operations) / (sum(duration) / workers)`, where
/// `workers` is the number of insert results. Query results are ignored.
pub fn aggregate_inserts<'a, I>(results: I) -> Result<InsertReport, ReportError>
where
    I: IntoIterator<Item = &'a WorkerResult>,
{
    let mut workers = BTreeMap::new();
    let mut operations: u64 = 0;
    let mut duration: f64 = 0.0;

    for result in results {
        if let WorkerResult::Insert {
            worker,
            operations: ops,
            duration: secs,
        } = result
        {
            operations += ops;
            duration += secs;
            workers.insert(worker.clone(), result.clone());
        }
    }

    if workers.is_empty() {
        return Err(ReportError::NoResults);
    }

    let mean_duration = duration / workers.len() as f64;
    let ops_per_second = if mean_duration > 0.0 {
        operations as f64 / mean_duration
    } else {
        0.0
    };

    Ok(InsertReport {
        workers,
        sum: InsertSum {
            operations,
            duration,
            ops_per_second,
        },
    })
}

/// Aggregate query results by concatenating every worker's samples per query name.
///
/// A worker reporting an empty map contributes nothing. Insert results are ignored.
pub fn aggregate_queries<'a, I>(results: I) -> Result<QueryReport, ReportError>
where
    I: IntoIterator<Item = &'a WorkerResult>,
{
    let mut samples: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut reporters = 0usize;

    for result in results {
        if let WorkerResult::Query { results, .. } = result {
            reporters += 1;
            for (name, durations) in results {
                samples
                    .entry(name.clone())
                    .or_default()
                    .extend(durations.iter().copied());
            }
        }
    }

    if reporters == 0 {
        return Err(ReportError::NoResults);
    }

    let queries = samples
        .into_iter()
        .filter_map(|(name, durations)| {
            QueryStats::from_samples(&durations).map(|stats| (name, stats))
        })
        .collect();

    Ok(QueryReport { queries })
}
