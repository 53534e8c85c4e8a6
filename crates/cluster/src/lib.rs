//! Cluster access for the dbbench controller.
//!
//! - [`Orchestrator`]: the capability the controller needs from the cluster
//!   (deploy, teardown, pod listing, service lookup, port-forwarding).
//! - [`KubectlOrchestrator`]: implementation driving `kubectl`.
//! - [`manifests`]: rendering of the collector pod/service and worker job.
//! - [`bridge`]: resolution of sentinel hostnames such as
//!   `dbtest-collector.default.kubernetes` into port-forward tunnels, exposed
//!   to HTTP clients as a [`Dialer`].

pub mod bridge;
pub mod kubectl;
pub mod manifests;
pub mod orchestrator;

pub use bridge::{
    resolve_target, BridgeError, ClusterDialer, Dialer, DirectDialer, SentinelAddress, TunnelTarget,
    SENTINEL_SUFFIX,
};
pub use kubectl::KubectlOrchestrator;
pub use orchestrator::{
    BoxedStream, ContainerPort, DeployRequest, DeploymentHandle, LabelSelector, Orchestrator,
    OrchestratorError, PodPhase, PodStatus, ServicePort, ServiceSpec, TargetPort, TunnelStream,
    COLLECTOR_PORT,
};
