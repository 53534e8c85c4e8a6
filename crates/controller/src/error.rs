use crate::fetch::RequestError;
use bench_cluster::{BridgeError, OrchestratorError, PodPhase};
use bench_types::{ConfigError, TaskKind};
use std::time::Duration;
use thiserror::Error;

/// A run-level invariant that was observed broken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invariant {
    /// A worker pod ended in the Failed phase.
    WorkerFailed { pod: String },
    /// The collector terminated while workers were still expected to report.
    CollectorTerminated { pod: String, phase: PodPhase },
}

impl std::fmt::Display for Invariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Invariant::WorkerFailed { pod } => write!(f, "worker pod {pod} failed"),
            Invariant::CollectorTerminated { pod, phase } => {
                write!(f, "collector pod {pod} terminated early ({phase})")
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Invalid run configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to submit deployment: {0}")]
    Deploy(#[source] OrchestratorError),

    #[error("Failed to query pod status: {0}")]
    Status(#[source] OrchestratorError),

    #[error("Invariant violated: {0}")]
    InvariantViolation(Invariant),

    #[error("Run did not complete within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("No collector pod matches '{selector}'")]
    NoCollector { selector: String },

    /// The collector address could not be resolved. Never retried.
    #[error("Cannot reach collector: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Failed to fetch {url} after {attempts} attempts: {source}")]
    Fetch {
        url: String,
        attempts: u32,
        #[source]
        source: RequestError,
    },

    #[error("Malformed report from {url}: {source}")]
    Report {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Expected a {expected} report, got a {found} report")]
    UnexpectedReport { expected: TaskKind, found: TaskKind },

    /// Resources may have been leaked.
    #[error("Failed to remove deployment '{release}': {source}")]
    Teardown {
        release: String,
        #[source]
        source: OrchestratorError,
    },
}

impl ControllerError {
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, ControllerError::InvariantViolation(_))
    }
}
