//! Repetition loops over worker counts, and the stepwise fill mode.

use crate::controller::{RunController, RunReport};
use crate::error::ControllerError;
use bench_cluster::Orchestrator;
use bench_types::{InsertReport, QueryReport, QueryStats, RunConfig, TaskKind};
use std::collections::BTreeMap;
use tracing::info;

/// Throughput samples of all repetitions for one worker count.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertSeries {
    pub worker_count: usize,
    /// `ops_per_second` of each repetition, in run order.
    pub samples: Vec<f64>,
}

impl InsertSeries {
    pub fn min(&self) -> f64 {
        self.samples.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.samples.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn avg(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }
}

/// Query reports of all repetitions for one worker count.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySeries {
    pub worker_count: usize,
    pub reports: Vec<QueryReport>,
}

impl QuerySeries {
    /// Per query: min of mins, max of maxes, mean of averages.
    pub fn combined(&self) -> BTreeMap<String, QueryStats> {
        let mut grouped: BTreeMap<&str, Vec<QueryStats>> = BTreeMap::new();
        for report in &self.reports {
            for (name, stats) in &report.queries {
                grouped.entry(name.as_str()).or_default().push(*stats);
            }
        }
        grouped
            .into_iter()
            .map(|(name, stats)| {
                let combined = QueryStats {
                    min: stats.iter().map(|s| s.min).fold(f64::INFINITY, f64::min),
                    max: stats.iter().map(|s| s.max).fold(f64::NEG_INFINITY, f64::max),
                    avg: stats.iter().map(|s| s.avg).sum::<f64>() / stats.len() as f64,
                };
                (name.to_string(), combined)
            })
            .collect()
    }
}

/// Outcome of one step of a stepwise fill.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Events already in the database when the step started.
    pub fill_level: u64,
    pub ops_per_second: f64,
}

impl<O: Orchestrator + ?Sized + 'static> RunController<O> {
    async fn insert_run(
        &self,
        worker_count: usize,
        config: &RunConfig,
    ) -> Result<InsertReport, ControllerError> {
        match self.one_run(worker_count, config).await? {
            RunReport::Insert(report) => Ok(report),
            other => Err(ControllerError::UnexpectedReport {
                expected: TaskKind::Insert,
                found: other.task(),
            }),
        }
    }

    async fn query_run(
        &self,
        worker_count: usize,
        config: &RunConfig,
    ) -> Result<QueryReport, ControllerError> {
        match self.one_run(worker_count, config).await? {
            RunReport::Query(report) => Ok(report),
            other => Err(ControllerError::UnexpectedReport {
                expected: TaskKind::Query,
                found: other.task(),
            }),
        }
    }

    /// Run `repetitions` insert runs for each worker count.
    ///
    /// The first failing run aborts the whole series.
    pub async fn run_insert_series(
        &self,
        config: &RunConfig,
        worker_counts: &[usize],
        repetitions: u32,
    ) -> Result<Vec<InsertSeries>, ControllerError> {
        let mut config = config.clone();
        config.task = TaskKind::Insert;

        let mut series = Vec::with_capacity(worker_counts.len());
        for &worker_count in worker_counts {
            let mut samples = Vec::with_capacity(repetitions as usize);
            for repetition in 1..=repetitions {
                let report = self.insert_run(worker_count, &config).await?;
                info!(
                    "Run {}/{} with {} workers: {:.1} ops/s",
                    repetition, repetitions, worker_count, report.sum.ops_per_second
                );
                samples.push(report.sum.ops_per_second);
            }
            series.push(InsertSeries {
                worker_count,
                samples,
            });
        }
        Ok(series)
    }

    /// Run `repetitions` query runs for each worker count.
    pub async fn run_query_series(
        &self,
        config: &RunConfig,
        worker_counts: &[usize],
        repetitions: u32,
    ) -> Result<Vec<QuerySeries>, ControllerError> {
        let mut config = config.clone();
        config.task = TaskKind::Query;

        let mut series = Vec::with_capacity(worker_counts.len());
        for &worker_count in worker_counts {
            let mut reports = Vec::with_capacity(repetitions as usize);
            for repetition in 1..=repetitions {
                let report = self.query_run(worker_count, &config).await?;
                info!(
                    "Query run {}/{} with {} workers: {} queries",
                    repetition,
                    repetitions,
                    worker_count,
                    report.queries.len()
                );
                reports.push(report);
            }
            series.push(QuerySeries {
                worker_count,
                reports,
            });
        }
        Ok(series)
    }

    /// Fill the database in `steps` consecutive insert runs and measure each.
    ///
    /// Only the first step honours `clean_database`; later steps keep the data.
    pub async fn run_steps(
        &self,
        config: &RunConfig,
        worker_count: usize,
        steps: u32,
    ) -> Result<Vec<StepResult>, ControllerError> {
        let mut config = config.clone();
        config.task = TaskKind::Insert;
        config.prefill = 0;
        let step_size = worker_count as u64 * config.num_inserts;

        let mut results = Vec::with_capacity(steps as usize);
        for step in 0..steps {
            let fill_level = u64::from(step) * step_size;
            info!("Step {}/{} at fill level {}", step + 1, steps, fill_level);
            let report = self.insert_run(worker_count, &config).await?;
            results.push(StepResult {
                fill_level,
                ops_per_second: report.sum.ops_per_second,
            });
            config.clean_database = false;
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_series_stats() {
        let series = InsertSeries {
            worker_count: 4,
            samples: vec![100.0, 300.0, 200.0],
        };
        assert_eq!(series.min(), 100.0);
        assert_eq!(series.max(), 300.0);
        assert_eq!(series.avg(), 200.0);
    }

    #[test]
    fn test_query_series_combines_repetitions() {
        let report = |min: f64, max: f64, avg: f64| QueryReport {
            queries: BTreeMap::from([("count-events".to_string(), QueryStats { min, max, avg })]),
        };
        let series = QuerySeries {
            worker_count: 1,
            reports: vec![report(0.8, 1.2, 1.0), report(0.5, 1.0, 0.8)],
        };
        let combined = series.combined();
        let stats = combined["count-events"];
        assert_eq!(stats.min, 0.5);
        assert_eq!(stats.max, 1.2);
        assert!((stats.avg - 0.9).abs() < 1e-9);
    }
}
