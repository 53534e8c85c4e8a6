//! Sentinel hostname resolution.
//!
//! The controller runs outside the cluster and has no network path to the
//! collector. Hostnames ending in [`SENTINEL_SUFFIX`] name a cluster resource
//! instead of a DNS entry:
//!
//! - `<pod>.<namespace>.kubernetes` or `<pod>.pod.<namespace>.kubernetes`
//! - `<service>.svc.<namespace>.kubernetes` (or `service` as the middle label)
//!
//! [`ClusterDialer`] turns those into port-forward tunnels and dials every
//! other hostname directly, so an HTTP client built on a [`Dialer`] needs no
//! knowledge of the cluster.

use crate::orchestrator::{BoxedStream, Orchestrator, OrchestratorError, PodPhase, TargetPort};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Last label of every sentinel hostname.
pub const SENTINEL_SUFFIX: &str = "kubernetes";

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Malformed cluster hostname '{host}': {reason}")]
    MalformedHostname { host: String, reason: String },

    #[error("Unsupported resource kind '{kind}' in hostname '{host}'")]
    UnsupportedResource { host: String, kind: String },

    #[error("Service {service} does not expose port {port}")]
    ServicePortNotFound { service: String, port: u16 },

    #[error("Service {service} has no backing pods")]
    NoServicePods { service: String },

    #[error("Pod {pod} has no container port named '{name}'")]
    NamedPortNotFound { pod: String, name: String },

    #[error("Failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Failed to open tunnel to {target}: {source}")]
    Tunnel {
        target: String,
        #[source]
        source: OrchestratorError,
    },
}

impl BridgeError {
    /// Errors caused by the address itself; retrying cannot fix them.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            BridgeError::MalformedHostname { .. }
                | BridgeError::UnsupportedResource { .. }
                | BridgeError::ServicePortNotFound { .. }
                | BridgeError::NamedPortNotFound { .. }
        )
    }
}

/// A cluster resource named by a sentinel hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentinelAddress {
    Pod { name: String, namespace: String },
    Service { name: String, namespace: String },
}

impl SentinelAddress {
    /// Parse `host`. Returns `Ok(None)` when it does not carry the sentinel suffix.
    ///
    /// Labels are counted including the suffix. The 3-label form
    /// `<name>.<namespace>.kubernetes` is shorthand for a pod, so `a.b.kubernetes`
    /// names pod `a` in namespace `b`. The 4-label form
    /// `<name>.<pod|svc|service>.<namespace>.kubernetes` names the resource kind
    /// explicitly. Any other label count is malformed.
    pub fn parse(host: &str) -> Result<Option<Self>, BridgeError> {
        let trimmed = host.trim_end_matches('.');
        let labels: Vec<&str> = trimmed.split('.').collect();
        if labels.last().map(|l| l.eq_ignore_ascii_case(SENTINEL_SUFFIX)) != Some(true) {
            return Ok(None);
        }

        let malformed = |reason: &str| BridgeError::MalformedHostname {
            host: host.to_string(),
            reason: reason.to_string(),
        };
        if labels.iter().any(|l| l.is_empty()) {
            return Err(malformed("empty label"));
        }

        match labels.as_slice() {
            [name, namespace, _] => Ok(Some(SentinelAddress::Pod {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })),
            [name, kind, namespace, _] => {
                let name = name.to_string();
                let namespace = namespace.to_string();
                match kind.to_ascii_lowercase().as_str() {
                    "svc" | "service" => Ok(Some(SentinelAddress::Service { name, namespace })),
                    "pod" => Ok(Some(SentinelAddress::Pod { name, namespace })),
                    _ => Err(BridgeError::UnsupportedResource {
                        host: host.to_string(),
                        kind: kind.to_string(),
                    }),
                }
            }
            _ => Err(malformed(&format!(
                "expected 3 or 4 labels, found {}",
                labels.len()
            ))),
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            SentinelAddress::Pod { namespace, .. } | SentinelAddress::Service { namespace, .. } => {
                namespace
            }
        }
    }
}

/// A concrete pod and port a tunnel can be opened to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelTarget {
    pub pod: String,
    pub namespace: String,
    pub port: u16,
}

impl std::fmt::Display for TunnelTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pod/{}.{}:{}", self.pod, self.namespace, self.port)
    }
}

/// Resolve `address:port` to the pod and container port to forward to.
pub async fn resolve_target<O: Orchestrator + ?Sized>(
    orchestrator: &O,
    address: &SentinelAddress,
    port: u16,
) -> Result<TunnelTarget, BridgeError> {
    let (service, namespace) = match address {
        SentinelAddress::Pod { name, namespace } => {
            return Ok(TunnelTarget {
                pod: name.clone(),
                namespace: namespace.clone(),
                port,
            })
        }
        SentinelAddress::Service { name, namespace } => (name, namespace),
    };

    let spec = orchestrator.service(service, namespace).await?;
    let mapping = spec
        .ports
        .iter()
        .find(|p| p.port == port)
        .ok_or_else(|| BridgeError::ServicePortNotFound {
            service: service.clone(),
            port,
        })?;

    let mut pods = orchestrator.list_pods(namespace, &spec.selector).await?;
    if pods.is_empty() {
        return Err(BridgeError::NoServicePods {
            service: service.clone(),
        });
    }
    // Prefer a running pod; fall back to whatever the selector matched.
    let index = pods
        .iter()
        .position(|p| p.phase == PodPhase::Running)
        .unwrap_or(0);
    let pod = pods.swap_remove(index);

    let target_port = match &mapping.target_port {
        None => port,
        Some(TargetPort::Number(number)) => *number,
        Some(TargetPort::Name(port_name)) => pod
            .container_ports
            .iter()
            .find(|p| p.name.as_deref() == Some(port_name.as_str()))
            .map(|p| p.port)
            .ok_or_else(|| BridgeError::NamedPortNotFound {
                pod: pod.name.clone(),
                name: port_name.clone(),
            })?,
    };

    debug!(
        "Service {}.{}:{} resolved to pod {} port {}",
        service, namespace, port, pod.name, target_port
    );
    Ok(TunnelTarget {
        pod: pod.name,
        namespace: namespace.clone(),
        port: target_port,
    })
}

/// Opens byte streams to `host:port`.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, host: &str, port: u16) -> Result<BoxedStream, BridgeError>;
}

/// Plain TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectDialer;

#[async_trait]
impl Dialer for DirectDialer {
    async fn dial(&self, host: &str, port: u16) -> Result<BoxedStream, BridgeError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| BridgeError::Connect {
                host: host.to_string(),
                port,
                source,
            })?;
        Ok(Box::new(stream))
    }
}

/// Tunnels sentinel hostnames through the orchestrator and dials the rest directly.
pub struct ClusterDialer<O: Orchestrator + ?Sized> {
    orchestrator: Arc<O>,
    direct: DirectDialer,
}

impl<O: Orchestrator + ?Sized> ClusterDialer<O> {
    pub fn new(orchestrator: Arc<O>) -> Self {
        Self {
            orchestrator,
            direct: DirectDialer,
        }
    }

    async fn open_tunnel(&self, target: &TunnelTarget) -> Result<BoxedStream, BridgeError> {
        match self
            .orchestrator
            .port_forward(&target.pod, &target.namespace, target.port)
            .await
        {
            Ok(stream) => Ok(stream),
            Err(first) => {
                warn!("Tunnel to {} failed, retrying once: {}", target, first);
                self.orchestrator
                    .port_forward(&target.pod, &target.namespace, target.port)
                    .await
                    .map_err(|source| BridgeError::Tunnel {
                        target: target.to_string(),
                        source,
                    })
            }
        }
    }
}

impl<O: Orchestrator + ?Sized> Clone for ClusterDialer<O> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.orchestrator))
    }
}

#[async_trait]
impl<O: Orchestrator + ?Sized> Dialer for ClusterDialer<O> {
    async fn dial(&self, host: &str, port: u16) -> Result<BoxedStream, BridgeError> {
        match SentinelAddress::parse(host)? {
            None => self.direct.dial(host, port).await,
            Some(address) => {
                let target = resolve_target(self.orchestrator.as_ref(), &address, port).await?;
                debug!("Tunneling {}:{} through {}", host, port, target);
                self.open_tunnel(&target).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{
        ContainerPort, DeployRequest, DeploymentHandle, LabelSelector, PodStatus, ServicePort,
        ServiceSpec,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Serves one service backed by one pod; port-forwards echo a greeting.
    struct FakeCluster {
        forward_failures: AtomicUsize,
        forwards: Mutex<Vec<(String, String, u16)>>,
    }

    impl FakeCluster {
        fn failing(times: usize) -> Self {
            Self {
                forward_failures: AtomicUsize::new(times),
                forwards: Mutex::new(Vec::new()),
            }
        }

        fn forwards(&self) -> Vec<(String, String, u16)> {
            self.forwards.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Orchestrator for FakeCluster {
        async fn deploy(
            &self,
            _request: &DeployRequest,
        ) -> Result<DeploymentHandle, OrchestratorError> {
            unimplemented!()
        }

        async fn teardown(&self, _handle: &DeploymentHandle) -> Result<(), OrchestratorError> {
            unimplemented!()
        }

        async fn list_pods(
            &self,
            _namespace: &str,
            selector: &LabelSelector,
        ) -> Result<Vec<PodStatus>, OrchestratorError> {
            if selector.labels().get("app").map(String::as_str) != Some("myservice") {
                return Ok(Vec::new());
            }
            Ok(vec![
                PodStatus {
                    name: "myservice-pending".to_string(),
                    phase: PodPhase::Pending,
                    container_ports: Vec::new(),
                },
                PodStatus {
                    name: "myservice-0".to_string(),
                    phase: PodPhase::Running,
                    container_ports: vec![ContainerPort {
                        name: Some("http".to_string()),
                        port: 5000,
                    }],
                },
            ])
        }

        async fn service(
            &self,
            name: &str,
            _namespace: &str,
        ) -> Result<ServiceSpec, OrchestratorError> {
            match name {
                "myservice" => Ok(ServiceSpec {
                    selector: LabelSelector::single("app", "myservice"),
                    ports: vec![
                        ServicePort {
                            port: 80,
                            target_port: Some(TargetPort::Name("http".to_string())),
                        },
                        ServicePort {
                            port: 8080,
                            target_port: Some(TargetPort::Number(9000)),
                        },
                        ServicePort {
                            port: 5000,
                            target_port: None,
                        },
                        ServicePort {
                            port: 81,
                            target_port: Some(TargetPort::Name("grpc".to_string())),
                        },
                    ],
                }),
                "empty" => Ok(ServiceSpec {
                    selector: LabelSelector::single("app", "nothing"),
                    ports: vec![ServicePort {
                        port: 80,
                        target_port: None,
                    }],
                }),
                other => Err(OrchestratorError::NotFound(format!("service {other}"))),
            }
        }

        async fn port_forward(
            &self,
            pod: &str,
            namespace: &str,
            port: u16,
        ) -> Result<BoxedStream, OrchestratorError> {
            self.forwards
                .lock()
                .unwrap()
                .push((pod.to_string(), namespace.to_string(), port));
            if self
                .forward_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(OrchestratorError::PortForward("connection reset".to_string()));
            }
            let (client, mut server) = tokio::io::duplex(64);
            tokio::spawn(async move {
                let _ = server.write_all(b"hello").await;
            });
            Ok(Box::new(client))
        }
    }

    #[test]
    fn test_parse_pod_form() {
        assert_eq!(
            SentinelAddress::parse("dbtest-collector.default.kubernetes").unwrap(),
            Some(SentinelAddress::Pod {
                name: "dbtest-collector".to_string(),
                namespace: "default".to_string(),
            })
        );
        assert_eq!(
            SentinelAddress::parse("dbtest-collector.pod.bench.kubernetes").unwrap(),
            Some(SentinelAddress::Pod {
                name: "dbtest-collector".to_string(),
                namespace: "bench".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_service_form() {
        for host in [
            "myservice.svc.default.kubernetes",
            "myservice.service.default.kubernetes",
        ] {
            assert_eq!(
                SentinelAddress::parse(host).unwrap(),
                Some(SentinelAddress::Service {
                    name: "myservice".to_string(),
                    namespace: "default".to_string(),
                })
            );
        }
    }

    #[test]
    fn test_parse_passes_through_other_hosts() {
        assert_eq!(SentinelAddress::parse("foo.bar.baz.other").unwrap(), None);
        assert_eq!(SentinelAddress::parse("localhost").unwrap(), None);
        assert_eq!(SentinelAddress::parse("127.0.0.1").unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_malformed_sentinels() {
        let err = SentinelAddress::parse("a.b.kubernetes.kubernetes.kubernetes").unwrap_err();
        assert!(matches!(err, BridgeError::MalformedHostname { .. }));

        let err = SentinelAddress::parse("b.kubernetes").unwrap_err();
        assert!(matches!(err, BridgeError::MalformedHostname { .. }));
        assert!(err.is_configuration_error());

        let err = SentinelAddress::parse("x.deployment.default.kubernetes").unwrap_err();
        assert!(matches!(err, BridgeError::UnsupportedResource { .. }));
        assert!(err.is_configuration_error());

        let err = SentinelAddress::parse("a..kubernetes").unwrap_err();
        assert!(matches!(err, BridgeError::MalformedHostname { .. }));
    }

    #[test]
    fn test_two_label_sentinel_is_configuration_error() {
        // `a.b.kubernetes` has three labels; the two-label name is `b.kubernetes`.
        assert!(SentinelAddress::parse("a.b.kubernetes").unwrap().is_some());
        assert!(SentinelAddress::parse("b.kubernetes")
            .unwrap_err()
            .is_configuration_error());
    }

    #[tokio::test]
    async fn test_resolve_service_ports() {
        let cluster = FakeCluster::failing(0);
        let address = SentinelAddress::parse("myservice.svc.default.kubernetes")
            .unwrap()
            .unwrap();

        let named = resolve_target(&cluster, &address, 80).await.unwrap();
        assert_eq!(
            named,
            TunnelTarget {
                pod: "myservice-0".to_string(),
                namespace: "default".to_string(),
                port: 5000,
            }
        );
        assert_eq!(resolve_target(&cluster, &address, 8080).await.unwrap().port, 9000);
        assert_eq!(resolve_target(&cluster, &address, 5000).await.unwrap().port, 5000);

        let err = resolve_target(&cluster, &address, 443).await.unwrap_err();
        assert!(matches!(err, BridgeError::ServicePortNotFound { port: 443, .. }));

        let err = resolve_target(&cluster, &address, 81).await.unwrap_err();
        assert!(matches!(err, BridgeError::NamedPortNotFound { .. }));
    }

    #[tokio::test]
    async fn test_resolve_service_without_pods() {
        let cluster = FakeCluster::failing(0);
        let address = SentinelAddress::Service {
            name: "empty".to_string(),
            namespace: "default".to_string(),
        };
        let err = resolve_target(&cluster, &address, 80).await.unwrap_err();
        assert!(matches!(err, BridgeError::NoServicePods { .. }));
        assert!(!err.is_configuration_error());
    }

    #[tokio::test]
    async fn test_dial_pod_form_tunnels() {
        let cluster = Arc::new(FakeCluster::failing(0));
        let dialer = ClusterDialer::new(Arc::clone(&cluster));

        let mut stream = dialer
            .dial("dbtest-collector.default.kubernetes", 5000)
            .await
            .unwrap();
        let mut greeting = Vec::new();
        stream.read_to_end(&mut greeting).await.unwrap();
        assert_eq!(greeting, b"hello");
        assert_eq!(
            cluster.forwards(),
            vec![("dbtest-collector".to_string(), "default".to_string(), 5000)]
        );
    }

    #[tokio::test]
    async fn test_dial_retries_tunnel_once() {
        let cluster = Arc::new(FakeCluster::failing(1));
        let dialer = ClusterDialer::new(Arc::clone(&cluster));
        tokio_test::assert_ok!(dialer.dial("myservice.svc.default.kubernetes", 80).await);
        assert_eq!(cluster.forwards().len(), 2);
        assert_eq!(cluster.forwards()[1].0, "myservice-0");

        let cluster = Arc::new(FakeCluster::failing(2));
        let dialer = ClusterDialer::new(Arc::clone(&cluster));
        let err = dialer
            .dial("dbtest-collector.default.kubernetes", 5000)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::Tunnel { .. }));
        assert_eq!(cluster.forwards().len(), 2);
    }

    #[tokio::test]
    async fn test_dial_malformed_sentinel_does_not_fall_back() {
        let cluster = Arc::new(FakeCluster::failing(0));
        let dialer = ClusterDialer::new(Arc::clone(&cluster));
        let err = dialer.dial("b.kubernetes", 5000).await.err().unwrap();
        assert!(err.is_configuration_error());
        assert!(cluster.forwards().is_empty());
    }

    #[tokio::test]
    async fn test_dial_passes_through_to_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"direct").await.unwrap();
        });

        let cluster = Arc::new(FakeCluster::failing(0));
        let dialer = ClusterDialer::new(Arc::clone(&cluster));
        let mut stream = dialer.dial("127.0.0.1", port).await.unwrap();
        let mut body = Vec::new();
        stream.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"direct");
        assert!(cluster.forwards().is_empty());
    }
}
