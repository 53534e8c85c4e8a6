//! Worker state machine: readiness wait, prefill barrier, measured phase.

use crate::backend::StorageBackend;
use crate::client::CollectorClient;
use crate::error::WorkerError;
use bench_types::{RunConfig, TaskKind, WorkerResult};
use event_generator::generate;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Poll intervals of the worker-side waits.
#[derive(Debug, Clone)]
pub struct WorkerTimings {
    /// Interval between collector readiness probes.
    pub readiness_interval: Duration,
    /// Interval between prefill barrier probes.
    pub barrier_interval: Duration,
    /// Timeout of a single probe request.
    pub request_timeout: Duration,
    /// Optional cap on each wait. `None` waits forever; the controller owns the deadline.
    pub max_wait: Option<Duration>,
}

impl Default for WorkerTimings {
    fn default() -> Self {
        Self {
            readiness_interval: Duration::from_secs(2),
            barrier_interval: Duration::from_secs(4),
            request_timeout: Duration::from_secs(2),
            max_wait: None,
        }
    }
}

/// Drives one worker through a run.
pub struct WorkerCoordinator {
    identity: String,
    config: RunConfig,
    worker_count: usize,
    backend: Arc<dyn StorageBackend>,
    collector: CollectorClient,
    timings: WorkerTimings,
}

impl WorkerCoordinator {
    pub fn new(
        identity: impl Into<String>,
        config: RunConfig,
        worker_count: usize,
        backend: Arc<dyn StorageBackend>,
        collector: CollectorClient,
    ) -> Self {
        Self {
            identity: identity.into(),
            config,
            worker_count: worker_count.max(1),
            backend,
            collector,
            timings: WorkerTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: WorkerTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Run the whole protocol and return the result that was reported.
    pub async fn run(&self) -> Result<WorkerResult, WorkerError> {
        info!(
            "Starting worker '{}' ({} task, backend {})",
            self.identity,
            self.config.task,
            self.backend.name()
        );
        self.await_collector_ready().await?;

        let start_sequence = if self.config.prefill > 0 {
            self.run_prefill().await?
        } else {
            1
        };

        self.run_measured_phase(start_sequence).await
    }

    /// Poll the collector until it reports readiness.
    pub async fn await_collector_ready(&self) -> Result<(), WorkerError> {
        info!("Waiting for collector at {}", self.collector.base_url());
        self.poll_until("collector readiness", self.timings.readiness_interval, || {
            self.collector.is_ready()
        })
        .await?;
        info!("Collector available. Starting work");
        Ok(())
    }

    /// Insert this worker's prefill share, signal the barrier and wait for the others.
    ///
    /// Returns the first sequence number of the measured phase.
    pub async fn run_prefill(&self) -> Result<i64, WorkerError> {
        let per_worker = self.config.prefill / self.worker_count as u64;
        info!(
            "Prefilling {} events ({} total across {} workers)",
            per_worker, self.config.prefill, self.worker_count
        );

        let events = generate(&self.identity, 0, per_worker, 1, self.config.device_spread);
        self.backend.prefill_events(events).await?;

        self.collector.report_prefill(&self.identity).await?;
        info!("Prefill done, waiting for other workers");
        self.poll_until("prefill barrier", self.timings.barrier_interval, || {
            self.collector.prefill_satisfied()
        })
        .await?;
        info!("All workers finished prefill");

        Ok(per_worker as i64 + 1)
    }

    /// Run the measured phase and post its result to the collector.
    pub async fn run_measured_phase(&self, start_sequence: i64) -> Result<WorkerResult, WorkerError> {
        let result = match self.config.task {
            TaskKind::Insert => {
                let operations = self.config.num_inserts;
                let events = generate(
                    &self.identity,
                    0,
                    operations,
                    start_sequence,
                    self.config.device_spread,
                );
                let start = Instant::now();
                self.backend.insert_events(events).await?;
                let duration = start.elapsed().as_secs_f64();
                info!(
                    "Inserted {} events in {:.3}s ({:.1} ops/s)",
                    operations,
                    duration,
                    if duration > 0.0 {
                        operations as f64 / duration
                    } else {
                        0.0
                    }
                );
                WorkerResult::Insert {
                    worker: self.identity.clone(),
                    operations,
                    duration,
                }
            }
            TaskKind::Query => {
                let results = self.backend.run_queries().await?;
                info!("Finished {} named queries", results.len());
                WorkerResult::Query {
                    worker: self.identity.clone(),
                    results,
                }
            }
        };

        self.collector.report_result(&result).await?;
        info!("Reported result to collector");
        Ok(result)
    }

    async fn poll_until<F, Fut>(
        &self,
        what: &'static str,
        interval: Duration,
        mut check: F,
    ) -> Result<(), WorkerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = tokio::time::Instant::now();
        loop {
            if check().await {
                return Ok(());
            }
            if let Some(max_wait) = self.timings.max_wait {
                let waited = start.elapsed();
                if waited >= max_wait {
                    return Err(WorkerError::WaitTimeout { what, waited });
                }
            }
            tokio::time::sleep(interval).await;
        }
    }
}
