//! HTTP client for the collector endpoints used by workers.

use crate::error::WorkerError;
use bench_types::{PrefillSignal, WorkerResult};
use std::time::Duration;
use tracing::debug;

/// Timeout of the final result POST.
const REPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to one collector.
#[derive(Clone)]
pub struct CollectorClient {
    http: reqwest::Client,
    base_url: String,
}

impl CollectorClient {
    /// `request_timeout` bounds each readiness and barrier probe.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, WorkerError> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether `GET /` succeeds. Connection failures count as "not ready".
    pub async fn is_ready(&self) -> bool {
        self.probe("/").await
    }

    /// Whether the prefill barrier is satisfied. Failures count as "not yet".
    pub async fn prefill_satisfied(&self) -> bool {
        self.probe("/prefill").await
    }

    async fn probe(&self, path: &str) -> bool {
        match self.http.get(format!("{}{path}", self.base_url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Collector probe {} failed: {}", path, e);
                false
            }
        }
    }

    /// Signal that `worker` finished its prefill share.
    pub async fn report_prefill(&self, worker: &str) -> Result<(), WorkerError> {
        self.http
            .post(format!("{}/prefill", self.base_url))
            .json(&PrefillSignal {
                worker: worker.to_string(),
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Post the terminal result of a worker.
    pub async fn report_result(&self, result: &WorkerResult) -> Result<(), WorkerError> {
        self.http
            .post(format!("{}/result", self.base_url))
            .timeout(REPORT_TIMEOUT)
            .json(result)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
