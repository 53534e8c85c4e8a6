//! HTTP surface of the collector.

use crate::store::{CollectorStore, ReportError};
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bench_types::{PrefillSignal, TaskKind, WorkerResult};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Shared handle to the state of one collector.
#[derive(Clone)]
pub struct Collector {
    task: TaskKind,
    store: Arc<Mutex<CollectorStore>>,
}

impl Collector {
    /// Create a collector for `expected_workers` workers.
    ///
    /// Query runs skip backend initialisation, so their collector is ready immediately.
    pub fn new(task: TaskKind, expected_workers: usize) -> Self {
        let mut store = CollectorStore::new(expected_workers);
        if task == TaskKind::Query {
            store.mark_ready();
        }
        Self {
            task,
            store: Arc::new(Mutex::new(store)),
        }
    }

    pub fn task(&self) -> TaskKind {
        self.task
    }

    pub fn mark_ready(&self) {
        self.lock().mark_ready();
        info!("Collector ready");
    }

    /// Lock the store. A panic in another handler does not invalidate the data.
    pub fn lock(&self) -> MutexGuard<'_, CollectorStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build the collector router.
pub fn router(collector: Collector) -> Router {
    Router::new()
        .route("/", get(readiness))
        .route("/prefill", get(prefill_status).post(report_prefill))
        .route("/result", axum::routing::post(report_result))
        .route("/status", get(status))
        .route("/report", get(report))
        .route("/report/insert", get(insert_report))
        .route("/report/queries", get(query_report))
        .with_state(collector)
}

/// Serve the collector on `listen`, running `init` before reporting readiness.
///
/// Returns an error when binding or `init` fails; otherwise serves until the
/// process is killed.
pub async fn run_collector<F>(listen: &str, collector: Collector, init: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind to {listen}"))?;

    info!(
        "Collector listening on {} ({} task, expecting {} workers)",
        listen,
        collector.task(),
        collector.lock().expected_workers()
    );

    let app = router(collector.clone());
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    if let Err(e) = init.await {
        error!("Backend initialisation failed: {:#}", e);
        server.abort();
        return Err(e.context("Backend initialisation failed"));
    }
    collector.mark_ready();

    server
        .await
        .context("Collector server task failed")?
        .context("Collector server error")
}

async fn readiness(State(collector): State<Collector>) -> Response {
    if collector.lock().is_ready() {
        (StatusCode::OK, "Test Collector").into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "backend initialisation in progress"})),
        )
            .into_response()
    }
}

async fn prefill_status(State(collector): State<Collector>) -> Response {
    let store = collector.lock();
    let body = Json(json!({
        "reported": store.prefilled_count(),
        "expected": store.expected_workers(),
    }));
    if store.prefill_satisfied() {
        (StatusCode::OK, body).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
    }
}

async fn report_prefill(
    State(collector): State<Collector>,
    Json(signal): Json<PrefillSignal>,
) -> Response {
    let mut store = collector.lock();
    if store.report_prefill(&signal.worker) {
        info!(
            "Worker '{}' finished prefill ({}/{})",
            signal.worker,
            store.prefilled_count(),
            store.expected_workers()
        );
    }
    (StatusCode::OK, Json(json!({"status": "ok"}))).into_response()
}

async fn report_result(
    State(collector): State<Collector>,
    Json(result): Json<WorkerResult>,
) -> Response {
    let worker = result.worker().to_string();
    let mut store = collector.lock();
    if store.report_result(result).is_some() {
        warn!("Worker '{}' reported twice, keeping the latest result", worker);
    }
    info!(
        "Received result from worker '{}' ({}/{})",
        worker,
        store.result_count(),
        store.expected_workers()
    );
    (StatusCode::OK, Json(json!({"status": "ok"}))).into_response()
}

async fn status(State(collector): State<Collector>) -> Response {
    let store = collector.lock();
    Json(json!({
        "ready": store.is_ready(),
        "prefilled": store.prefilled_count(),
        "received": store.result_count(),
        "expected": store.expected_workers(),
    }))
    .into_response()
}

async fn report(State(collector): State<Collector>) -> Response {
    match collector.task() {
        TaskKind::Insert => report_response(collector.lock().insert_report()),
        TaskKind::Query => report_response(collector.lock().query_report()),
    }
}

async fn insert_report(State(collector): State<Collector>) -> Response {
    report_response(collector.lock().insert_report())
}

async fn query_report(State(collector): State<Collector>) -> Response {
    report_response(collector.lock().query_report())
}

fn report_response<T: Serialize>(report: Result<T, ReportError>) -> Response {
    match report {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}
