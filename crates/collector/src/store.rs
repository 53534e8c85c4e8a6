//! In-memory state of one collector process.

use crate::aggregate::{aggregate_inserts, aggregate_queries};
use bench_types::{InsertReport, QueryReport, WorkerResult};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Reasons a report cannot be produced yet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    /// No worker has reported a result of the requested kind.
    #[error("Report not ready: no worker results stored yet")]
    NoResults,
}

/// Results and prefill barrier of one run.
#[derive(Debug)]
pub struct CollectorStore {
    expected_workers: usize,
    ready: bool,
    prefilled: HashSet<String>,
    results: HashMap<String, WorkerResult>,
}

impl CollectorStore {
    pub fn new(expected_workers: usize) -> Self {
        Self {
            expected_workers,
            ready: false,
            prefilled: HashSet::with_capacity(expected_workers),
            results: HashMap::with_capacity(expected_workers),
        }
    }

    pub fn expected_workers(&self) -> usize {
        self.expected_workers
    }

    /// Mark backend initialisation as complete.
    pub fn mark_ready(&mut self) {
        self.ready = true;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Record that `worker` finished prefilling. Returns `false` for a repeat report.
    pub fn report_prefill(&mut self, worker: &str) -> bool {
        self.prefilled.insert(worker.to_string())
    }

    pub fn prefilled_count(&self) -> usize {
        self.prefilled.len()
    }

    /// Whether every expected worker finished prefilling.
    pub fn prefill_satisfied(&self) -> bool {
        self.prefilled.len() >= self.expected_workers
    }

    /// Store a result, replacing any earlier result of the same worker.
    ///
    /// Returns the replaced result, if any.
    pub fn report_result(&mut self, result: WorkerResult) -> Option<WorkerResult> {
        self.results.insert(result.worker().to_string(), result)
    }

    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    pub fn insert_report(&self) -> Result<InsertReport, ReportError> {
        aggregate_inserts(self.results.values())
    }

    pub fn query_report(&self) -> Result<QueryReport, ReportError> {
        aggregate_queries(self.results.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(worker: &str, operations: u64, duration: f64) -> WorkerResult {
        WorkerResult::Insert {
            worker: worker.to_string(),
            operations,
            duration,
        }
    }

    #[test]
    fn test_prefill_barrier() {
        let mut store = CollectorStore::new(3);
        assert!(!store.prefill_satisfied());

        assert!(store.report_prefill("w1"));
        assert!(store.report_prefill("w2"));
        assert!(!store.report_prefill("w2"));
        assert!(!store.prefill_satisfied());
        assert_eq!(store.prefilled_count(), 2);

        assert!(store.report_prefill("w3"));
        assert!(store.prefill_satisfied());

        // The barrier never shrinks.
        store.report_prefill("w1");
        assert!(store.prefill_satisfied());
    }

    #[test]
    fn test_result_last_write_wins() {
        let mut store = CollectorStore::new(2);
        assert!(store.report_result(insert("w1", 100, 1.0)).is_none());
        let replaced = store.report_result(insert("w1", 50, 1.0));
        assert_eq!(replaced, Some(insert("w1", 100, 1.0)));
        assert_eq!(store.result_count(), 1);

        let report = store.insert_report().unwrap();
        assert_eq!(report.sum.operations, 50);
    }

    #[test]
    fn test_reports_not_ready_without_results() {
        let store = CollectorStore::new(1);
        assert_eq!(store.insert_report(), Err(ReportError::NoResults));
        assert_eq!(store.query_report(), Err(ReportError::NoResults));
    }

    #[test]
    fn test_readiness_flag() {
        let mut store = CollectorStore::new(1);
        assert!(!store.is_ready());
        store.mark_ready();
        assert!(store.is_ready());
    }
}
