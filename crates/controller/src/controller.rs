//! One benchmark run: deploy, poll, fetch, teardown.

use crate::error::{ControllerError, Invariant};
use crate::fetch::{HttpGetter, RequestError};
use bench_cluster::{
    ClusterDialer, DeployRequest, DeploymentHandle, Dialer, Orchestrator, PodPhase,
    COLLECTOR_PORT, SENTINEL_SUFFIX,
};
use bench_types::{InsertReport, QueryReport, RunConfig, TaskKind};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Polling cadence, fetch retries and deadline of the controller.
#[derive(Debug, Clone)]
pub struct ControllerTimings {
    /// Interval between pod status checks.
    pub poll_interval: Duration,
    /// Total attempts to fetch the report.
    pub fetch_attempts: u32,
    pub fetch_retry_delay: Duration,
    /// Deadline for one run to complete. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for ControllerTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            fetch_attempts: 10,
            fetch_retry_delay: Duration::from_secs(1),
            timeout: None,
        }
    }
}

/// Where deployments go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub release: String,
    pub namespace: String,
    pub image: String,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            release: "dbtest".to_string(),
            namespace: "default".to_string(),
            image: "dbbench:latest".to_string(),
        }
    }
}

/// A live deployment and the request that created it.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub request: DeployRequest,
    pub handle: DeploymentHandle,
}

/// Report of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunReport {
    Insert(InsertReport),
    Query(QueryReport),
}

impl RunReport {
    pub fn task(&self) -> TaskKind {
        match self {
            RunReport::Insert(_) => TaskKind::Insert,
            RunReport::Query(_) => TaskKind::Query,
        }
    }
}

/// Drives benchmark runs against one orchestrator.
pub struct RunController<O: Orchestrator + ?Sized> {
    orchestrator: Arc<O>,
    http: HttpGetter,
    settings: RunSettings,
    timings: ControllerTimings,
}

impl<O: Orchestrator + ?Sized + 'static> RunController<O> {
    /// Create a controller that reaches the collector through port-forward tunnels.
    pub fn new(orchestrator: Arc<O>, settings: RunSettings) -> Self {
        let dialer: Arc<dyn Dialer> = Arc::new(ClusterDialer::new(Arc::clone(&orchestrator)));
        Self {
            orchestrator,
            http: HttpGetter::new(dialer),
            settings,
            timings: ControllerTimings::default(),
        }
    }

    /// Replace the dialer used to reach the collector.
    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.http = HttpGetter::new(dialer);
        self
    }

    pub fn with_timings(mut self, timings: ControllerTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn timings(&self) -> &ControllerTimings {
        &self.timings
    }

    /// Submit a deployment of one collector and `worker_count` workers.
    pub async fn deploy(
        &self,
        worker_count: usize,
        run_config: &str,
        target_module: &str,
    ) -> Result<Deployment, ControllerError> {
        let request = DeployRequest {
            release: self.settings.release.clone(),
            namespace: self.settings.namespace.clone(),
            image: self.settings.image.clone(),
            worker_count,
            run_config: run_config.to_string(),
            target_module: target_module.to_string(),
        };
        let handle = self
            .orchestrator
            .deploy(&request)
            .await
            .map_err(ControllerError::Deploy)?;
        Ok(Deployment { request, handle })
    }

    /// Wait until every worker pod succeeded.
    ///
    /// Fails at once when a worker fails or the collector reaches a terminal phase.
    pub async fn poll_until_complete(&self, deployment: &Deployment) -> Result<(), ControllerError> {
        let request = &deployment.request;
        let worker_selector = request.worker_selector();
        let collector_selector = request.collector_selector();
        let start = Instant::now();

        loop {
            let collectors = self
                .orchestrator
                .list_pods(&request.namespace, &collector_selector)
                .await
                .map_err(ControllerError::Status)?;
            if let Some(pod) = collectors.iter().find(|p| p.phase.is_terminal()) {
                return Err(ControllerError::InvariantViolation(
                    Invariant::CollectorTerminated {
                        pod: pod.name.clone(),
                        phase: pod.phase,
                    },
                ));
            }

            let workers = self
                .orchestrator
                .list_pods(&request.namespace, &worker_selector)
                .await
                .map_err(ControllerError::Status)?;
            if let Some(pod) = workers.iter().find(|p| p.phase == PodPhase::Failed) {
                return Err(ControllerError::InvariantViolation(Invariant::WorkerFailed {
                    pod: pod.name.clone(),
                }));
            }

            let succeeded = workers
                .iter()
                .filter(|p| p.phase == PodPhase::Succeeded)
                .count();
            if workers.len() >= request.worker_count && succeeded == workers.len() {
                info!("All {} workers finished", succeeded);
                return Ok(());
            }
            debug!(
                "{}/{} workers finished ({} pods listed)",
                succeeded,
                request.worker_count,
                workers.len()
            );

            if let Some(timeout) = self.timings.timeout {
                if start.elapsed() > timeout {
                    return Err(ControllerError::Timeout { timeout });
                }
            }
            tokio::time::sleep(self.timings.poll_interval).await;
        }
    }

    /// Fetch the aggregated report from the deployment's collector.
    pub async fn fetch_report(
        &self,
        deployment: &Deployment,
        task: TaskKind,
    ) -> Result<RunReport, ControllerError> {
        let request = &deployment.request;
        let selector = request.collector_selector();
        let collectors = self
            .orchestrator
            .list_pods(&request.namespace, &selector)
            .await
            .map_err(ControllerError::Status)?;
        let pod = collectors
            .first()
            .ok_or_else(|| ControllerError::NoCollector {
                selector: selector.to_string(),
            })?;

        let host = format!("{}.{}.{}", pod.name, request.namespace, SENTINEL_SUFFIX);
        match task {
            TaskKind::Insert => self
                .get_json(&host, "/report/insert")
                .await
                .map(RunReport::Insert),
            TaskKind::Query => self
                .get_json(&host, "/report/queries")
                .await
                .map(RunReport::Query),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        host: &str,
        path: &str,
    ) -> Result<T, ControllerError> {
        let url = format!("http://{host}:{COLLECTOR_PORT}{path}");
        let attempts = self.timings.fetch_attempts.max(1);
        let mut attempt = 1;
        let body = loop {
            match self.http.get(host, COLLECTOR_PORT, path).await {
                Ok(body) => break body,
                Err(RequestError::Dial(e)) if e.is_configuration_error() => {
                    return Err(ControllerError::Bridge(e))
                }
                Err(e) if attempt >= attempts => {
                    return Err(ControllerError::Fetch {
                        url,
                        attempts,
                        source: e,
                    })
                }
                Err(e) => {
                    warn!("Fetching {} failed (attempt {}/{}): {}", url, attempt, attempts, e);
                    attempt += 1;
                    tokio::time::sleep(self.timings.fetch_retry_delay).await;
                }
            }
        };
        serde_json::from_slice(&body).map_err(|source| ControllerError::Report { url, source })
    }

    /// Remove a deployment.
    pub async fn teardown(&self, deployment: &Deployment) -> Result<(), ControllerError> {
        self.orchestrator
            .teardown(&deployment.handle)
            .await
            .map_err(|source| ControllerError::Teardown {
                release: deployment.handle.release.clone(),
                source,
            })
    }

    /// Deploy, wait, fetch and tear down one run with `worker_count` workers.
    ///
    /// Teardown is attempted after a failed run too; its own failure is then
    /// logged and the run's error returned.
    pub async fn one_run(
        &self,
        worker_count: usize,
        config: &RunConfig,
    ) -> Result<RunReport, ControllerError> {
        let encoded = config.encode()?;
        info!(
            "Starting {} run with {} workers against {}",
            config.task, worker_count, config.module
        );
        let deployment = self.deploy(worker_count, &encoded, &config.module).await?;

        let outcome = async {
            self.poll_until_complete(&deployment).await?;
            self.fetch_report(&deployment, config.task).await
        }
        .await;

        match outcome {
            Ok(report) => {
                self.teardown(&deployment).await?;
                Ok(report)
            }
            Err(e) => {
                error!("Run with {} workers failed: {}", worker_count, e);
                if let Err(teardown) = self.teardown(&deployment).await {
                    error!("{}", teardown);
                }
                Err(e)
            }
        }
    }
}
