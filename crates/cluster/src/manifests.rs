//! Kubernetes manifests of one benchmark deployment.
//!
//! A deployment consists of a collector pod, a service in front of it and a
//! job running the workers. Every pod receives the same encoded run
//! configuration; workers learn their identity from the downward API.

use crate::orchestrator::{DeployRequest, COLLECTOR_PORT};

/// Render all manifests, joined with YAML document separators.
pub fn render_deployment(request: &DeployRequest) -> String {
    [
        collector_pod(request),
        collector_service(request),
        worker_job(request),
    ]
    .join("\n---\n")
}

/// Name of the collector pod and service.
pub fn collector_name(release: &str) -> String {
    format!("{release}-collector")
}

/// Name of the worker job.
pub fn worker_job_name(release: &str) -> String {
    format!("{release}-worker")
}

/// Collector URL as seen from inside the namespace.
pub fn collector_url(release: &str) -> String {
    format!("http://{}:{COLLECTOR_PORT}", collector_name(release))
}

/// Generate the collector Pod.
///
/// A bare pod with `restartPolicy: Never`: a restarted collector would have
/// lost every result, so its termination must be visible to the controller.
fn collector_pod(request: &DeployRequest) -> String {
    format!(
        r#"apiVersion: v1
kind: Pod
metadata:
  name: {name}
  namespace: {namespace}
  labels:
    app: {name}
    release: {release}
    target: {target}
spec:
  restartPolicy: Never
  containers:
  - name: collector
    image: {image}
    imagePullPolicy: IfNotPresent
    args:
    - collector
    env:
    - name: RUN_CONFIG
      value: "{run_config}"
    - name: WORKER_COUNT
      value: "{workers}"
    - name: RUST_LOG
      value: info
    ports:
    - name: http
      containerPort: {port}
    readinessProbe:
      httpGet:
        path: /
        port: {port}
      initialDelaySeconds: 2
      periodSeconds: 5
"#,
        name = collector_name(&request.release),
        namespace = request.namespace,
        release = request.release,
        target = request.target_module,
        image = request.image,
        run_config = request.run_config,
        workers = request.worker_count,
        port = COLLECTOR_PORT,
    )
}

/// Generate the collector Service.
fn collector_service(request: &DeployRequest) -> String {
    format!(
        r#"apiVersion: v1
kind: Service
metadata:
  name: {name}
  namespace: {namespace}
  labels:
    release: {release}
spec:
  selector:
    app: {name}
  ports:
  - port: {port}
    targetPort: http
"#,
        name = collector_name(&request.release),
        namespace = request.namespace,
        release = request.release,
        port = COLLECTOR_PORT,
    )
}

/// Generate the worker Job: one pod per worker, all started together, never retried.
fn worker_job(request: &DeployRequest) -> String {
    let name = worker_job_name(&request.release);
    format!(
        r#"apiVersion: batch/v1
kind: Job
metadata:
  name: {name}
  namespace: {namespace}
  labels:
    release: {release}
spec:
  completions: {workers}
  parallelism: {workers}
  backoffLimit: 0
  template:
    metadata:
      labels:
        app: {name}
        release: {release}
        target: {target}
    spec:
      restartPolicy: Never
      containers:
      - name: worker
        image: {image}
        imagePullPolicy: IfNotPresent
        args:
        - worker
        env:
        - name: POD_NAME
          valueFrom:
            fieldRef:
              fieldPath: metadata.name
        - name: COLLECTOR_URL
          value: "{collector_url}"
        - name: RUN_CONFIG
          value: "{run_config}"
        - name: WORKER_COUNT
          value: "{workers}"
        - name: RUST_LOG
          value: info
"#,
        name = name,
        namespace = request.namespace,
        release = request.release,
        target = request.target_module,
        image = request.image,
        workers = request.worker_count,
        collector_url = collector_url(&request.release),
        run_config = request.run_config,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> DeployRequest {
        DeployRequest {
            release: "dbtest".to_string(),
            namespace: "bench".to_string(),
            image: "dbbench:latest".to_string(),
            worker_count: 4,
            run_config: "eyJ0YXNrIjoiaW5zZXJ0In0=".to_string(),
            target_module: "postgres".to_string(),
        }
    }

    #[test]
    fn test_render_contains_all_documents() {
        let manifest = render_deployment(&request());
        assert_eq!(manifest.matches("\n---\n").count(), 2);
        assert!(manifest.contains("kind: Pod"));
        assert!(manifest.contains("kind: Service"));
        assert!(manifest.contains("kind: Job"));
    }

    #[test]
    fn test_labels_match_selectors() {
        let request = request();
        let manifest = render_deployment(&request);
        let worker = request.worker_selector().to_string().replace('=', ": ");
        let collector = request.collector_selector().to_string().replace('=', ": ");
        assert!(manifest.contains(&worker));
        assert!(manifest.contains(&collector));
    }

    #[test]
    fn test_every_pod_gets_identical_config() {
        let manifest = render_deployment(&request());
        assert_eq!(
            manifest
                .matches("value: \"eyJ0YXNrIjoiaW5zZXJ0In0=\"")
                .count(),
            2
        );
        assert!(manifest.contains("completions: 4"));
        assert!(manifest.contains("parallelism: 4"));
        assert!(manifest.contains("value: \"http://dbtest-collector:5000\""));
    }
}
