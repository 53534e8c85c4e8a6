//! The orchestrator capability consumed by the controller and the bridge.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Port the collector listens on inside the cluster.
pub const COLLECTOR_PORT: u16 = 5000;

/// Errors reported by an orchestrator.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// A cluster command exited unsuccessfully.
    #[error("`{command}` failed ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse orchestrator output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Port-forward failed: {0}")]
    PortForward(String),

    /// Pods of a removed deployment were still present after waiting.
    #[error("Pods matching '{selector}' still present after teardown")]
    TeardownIncomplete { selector: String },
}

/// Lifecycle phase of a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl PodPhase {
    /// Succeeded or Failed.
    pub fn is_terminal(self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }
}

impl std::fmt::Display for PodPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// A named or numbered container port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerPort {
    pub name: Option<String>,
    pub port: u16,
}

/// Observed state of one pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodStatus {
    pub name: String,
    pub phase: PodPhase,
    pub container_ports: Vec<ContainerPort>,
}

/// Equality-based label selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector(BTreeMap<String, String>);

impl LabelSelector {
    /// Selector matching a single `key=value` label.
    pub fn single(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(key.into(), value.into());
        Self(labels)
    }

    pub fn from_map(labels: BTreeMap<String, String>) -> Self {
        Self(labels)
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        f.write_str(&parts.join(","))
    }
}

/// Target port of a service port mapping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TargetPort {
    Number(u16),
    Name(String),
}

/// One port mapping of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePort {
    pub port: u16,
    /// `None` means the target port equals `port`.
    pub target_port: Option<TargetPort>,
}

/// The parts of a service the bridge needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub selector: LabelSelector,
    pub ports: Vec<ServicePort>,
}

/// Parameters of one benchmark deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    /// Release name; prefixes every resource and label value.
    pub release: String,
    pub namespace: String,
    pub image: String,
    pub worker_count: usize,
    /// Encoded run configuration handed to every pod unchanged.
    pub run_config: String,
    /// Backend module under test, attached as a label.
    pub target_module: String,
}

impl DeployRequest {
    pub fn worker_selector(&self) -> LabelSelector {
        LabelSelector::single("app", format!("{}-worker", self.release))
    }

    pub fn collector_selector(&self) -> LabelSelector {
        LabelSelector::single("app", format!("{}-collector", self.release))
    }
}

/// A submitted deployment, required for teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentHandle {
    pub release: String,
    pub namespace: String,
    /// Rendered manifest, replayed on teardown.
    pub manifest: String,
    pub selectors: Vec<LabelSelector>,
}

/// A bidirectional byte stream usable in place of a TCP socket.
pub trait TunnelStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> TunnelStream for T {}

pub type BoxedStream = Box<dyn TunnelStream>;

/// What the controller needs from the cluster.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Submit a deployment.
    async fn deploy(&self, request: &DeployRequest) -> Result<DeploymentHandle, OrchestratorError>;

    /// Remove a deployment and everything it created.
    async fn teardown(&self, handle: &DeploymentHandle) -> Result<(), OrchestratorError>;

    /// Pods in `namespace` matching `selector`.
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<PodStatus>, OrchestratorError>;

    /// Selector and port mappings of a service.
    async fn service(&self, name: &str, namespace: &str) -> Result<ServiceSpec, OrchestratorError>;

    /// Open a tunnel to `port` of `pod`.
    async fn port_forward(
        &self,
        pod: &str,
        namespace: &str,
        port: u16,
    ) -> Result<BoxedStream, OrchestratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_phase_parsing() {
        let phase: PodPhase = serde_json::from_str(r#""Succeeded""#).unwrap();
        assert_eq!(phase, PodPhase::Succeeded);
        assert!(phase.is_terminal());

        let phase: PodPhase = serde_json::from_str(r#""Evicted""#).unwrap();
        assert_eq!(phase, PodPhase::Unknown);
        assert!(!PodPhase::Running.is_terminal());
    }

    #[test]
    fn test_label_selector_display() {
        let mut labels = BTreeMap::new();
        labels.insert("tier".to_string(), "db".to_string());
        labels.insert("app".to_string(), "pg".to_string());
        assert_eq!(LabelSelector::from_map(labels).to_string(), "app=pg,tier=db");
        assert_eq!(
            LabelSelector::single("app", "dbtest-worker").to_string(),
            "app=dbtest-worker"
        );
    }

    #[test]
    fn test_target_port_untagged() {
        let port: TargetPort = serde_json::from_str("5000").unwrap();
        assert_eq!(port, TargetPort::Number(5000));
        let port: TargetPort = serde_json::from_str(r#""http""#).unwrap();
        assert_eq!(port, TargetPort::Name("http".to_string()));
    }
}
