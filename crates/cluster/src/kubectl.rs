//! [`Orchestrator`] implementation driving the `kubectl` binary.

use crate::manifests::render_deployment;
use crate::orchestrator::{
    BoxedStream, ContainerPort, DeployRequest, DeploymentHandle, LabelSelector, Orchestrator,
    OrchestratorError, PodPhase, PodStatus, ServicePort, ServiceSpec, TargetPort,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// Checks for pod removal after `kubectl delete`.
const TEARDOWN_CHECKS: u32 = 10;
const TEARDOWN_CHECK_INTERVAL: Duration = Duration::from_secs(5);
/// How long to wait for `kubectl port-forward` to announce its local port.
const PORT_FORWARD_STARTUP: Duration = Duration::from_secs(30);

/// Drives the cluster through `kubectl`, using the ambient kubeconfig.
#[derive(Debug, Clone)]
pub struct KubectlOrchestrator {
    binary: String,
    context: Option<String>,
}

impl Default for KubectlOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl KubectlOrchestrator {
    pub fn new() -> Self {
        Self {
            binary: "kubectl".to_string(),
            context: None,
        }
    }

    /// Use a specific kubeconfig context.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.binary);
        if let Some(context) = &self.context {
            command.arg("--context").arg(context);
        }
        command.args(args);
        command
    }

    /// Run kubectl to completion, feeding `stdin` if given, and return stdout.
    async fn run(&self, args: &[&str], stdin: Option<&str>) -> Result<Vec<u8>, OrchestratorError> {
        let mut command = self.command(args);
        command
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Running {} {}", self.binary, args.join(" "));
        let mut child = command.spawn()?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
            pipe.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(OrchestratorError::Command {
                command: format!("{} {}", self.binary, args.join(" ")),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    async fn wait_for_pods_removed(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<(), OrchestratorError> {
        for _ in 0..TEARDOWN_CHECKS {
            if self.list_pods(namespace, selector).await?.is_empty() {
                return Ok(());
            }
            tokio::time::sleep(TEARDOWN_CHECK_INTERVAL).await;
        }
        Err(OrchestratorError::TeardownIncomplete {
            selector: selector.to_string(),
        })
    }
}

#[async_trait]
impl Orchestrator for KubectlOrchestrator {
    async fn deploy(&self, request: &DeployRequest) -> Result<DeploymentHandle, OrchestratorError> {
        let manifest = render_deployment(request);
        info!(
            "Deploying '{}' to namespace {} with {} workers",
            request.release, request.namespace, request.worker_count
        );
        self.run(&["apply", "-n", &request.namespace, "-f", "-"], Some(&manifest))
            .await?;
        Ok(DeploymentHandle {
            release: request.release.clone(),
            namespace: request.namespace.clone(),
            manifest,
            selectors: vec![request.worker_selector(), request.collector_selector()],
        })
    }

    async fn teardown(&self, handle: &DeploymentHandle) -> Result<(), OrchestratorError> {
        info!("Removing '{}' from namespace {}", handle.release, handle.namespace);
        self.run(
            &[
                "delete",
                "-n",
                &handle.namespace,
                "--ignore-not-found",
                "--wait=true",
                "-f",
                "-",
            ],
            Some(&handle.manifest),
        )
        .await?;
        for selector in &handle.selectors {
            self.wait_for_pods_removed(&handle.namespace, selector)
                .await?;
        }
        Ok(())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<PodStatus>, OrchestratorError> {
        let selector = selector.to_string();
        let mut args = vec!["get", "pods", "-n", namespace, "-o", "json"];
        if !selector.is_empty() {
            args.extend(["-l", selector.as_str()]);
        }
        let stdout = self.run(&args, None).await?;
        parse_pod_list(&stdout)
    }

    async fn service(&self, name: &str, namespace: &str) -> Result<ServiceSpec, OrchestratorError> {
        let stdout = self
            .run(&["get", "service", name, "-n", namespace, "-o", "json"], None)
            .await?;
        parse_service(&stdout)
    }

    async fn port_forward(
        &self,
        pod: &str,
        namespace: &str,
        port: u16,
    ) -> Result<BoxedStream, OrchestratorError> {
        let target = format!("pod/{pod}");
        let ports = format!(":{port}");
        let mut child = self
            .command(&[
                "port-forward",
                "-n",
                namespace,
                "--address",
                "127.0.0.1",
                &target,
                &ports,
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OrchestratorError::PortForward("no stdout from kubectl".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        let local_port = tokio::time::timeout(PORT_FORWARD_STARTUP, async {
            while let Some(line) = lines.next_line().await? {
                if let Some(local_port) = parse_forwarding_line(&line) {
                    return Ok(local_port);
                }
            }
            Err(OrchestratorError::PortForward(format!(
                "kubectl exited before forwarding {target}:{port}"
            )))
        })
        .await
        .map_err(|_| {
            OrchestratorError::PortForward(format!("timed out forwarding {target}:{port}"))
        })??;

        // kubectl keeps logging to stdout; closing the pipe would kill it.
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("port-forward: {}", line);
            }
        });

        let stream = TcpStream::connect(("127.0.0.1", local_port)).await?;
        debug!("Tunnel to {}:{} via local port {}", target, port, local_port);
        Ok(Box::new(PortForwardStream {
            stream,
            _kubectl: Box::new(child),
        }))
    }
}

/// TCP connection to a local `kubectl port-forward`; dropping it stops kubectl.
struct PortForwardStream {
    stream: TcpStream,
    _kubectl: Box<Child>,
}

impl AsyncRead for PortForwardStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for PortForwardStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}

/// Local port from a line like `Forwarding from 127.0.0.1:41235 -> 5000`.
fn parse_forwarding_line(line: &str) -> Option<u16> {
    let rest = line.strip_prefix("Forwarding from ")?;
    let address = rest.split_whitespace().next()?;
    address.rsplit(':').next()?.parse().ok()
}

#[derive(Deserialize)]
struct List<T> {
    items: Vec<T>,
}

#[derive(Deserialize)]
struct Metadata {
    name: String,
}

#[derive(Deserialize)]
struct PodJson {
    metadata: Metadata,
    #[serde(default)]
    spec: Option<PodSpecJson>,
    #[serde(default)]
    status: Option<PodStatusJson>,
}

#[derive(Deserialize)]
struct PodSpecJson {
    #[serde(default)]
    containers: Vec<ContainerJson>,
}

#[derive(Deserialize)]
struct ContainerJson {
    #[serde(default)]
    ports: Vec<ContainerPortJson>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerPortJson {
    #[serde(default)]
    name: Option<String>,
    container_port: u16,
}

#[derive(Deserialize)]
struct PodStatusJson {
    phase: Option<PodPhase>,
}

#[derive(Deserialize)]
struct ServiceJson {
    spec: ServiceSpecJson,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceSpecJson {
    #[serde(default)]
    selector: BTreeMap<String, String>,
    #[serde(default)]
    ports: Vec<ServicePortJson>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServicePortJson {
    port: u16,
    #[serde(default)]
    target_port: Option<TargetPort>,
}

fn parse_pod_list(json: &[u8]) -> Result<Vec<PodStatus>, OrchestratorError> {
    let list: List<PodJson> = serde_json::from_slice(json)?;
    Ok(list
        .items
        .into_iter()
        .map(|pod| PodStatus {
            name: pod.metadata.name,
            phase: pod
                .status
                .and_then(|s| s.phase)
                .unwrap_or(PodPhase::Unknown),
            container_ports: pod
                .spec
                .map(|spec| {
                    spec.containers
                        .into_iter()
                        .flat_map(|c| c.ports)
                        .map(|p| ContainerPort {
                            name: p.name,
                            port: p.container_port,
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect())
}

fn parse_service(json: &[u8]) -> Result<ServiceSpec, OrchestratorError> {
    let service: ServiceJson = serde_json::from_slice(json)?;
    Ok(ServiceSpec {
        selector: LabelSelector::from_map(service.spec.selector),
        ports: service
            .spec
            .ports
            .into_iter()
            .map(|p| ServicePort {
                port: p.port,
                target_port: p.target_port,
            })
            .collect(),
    })
}
