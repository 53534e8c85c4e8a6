//! The collector and worker entry points talking to each other in-process.

use bench_types::{InsertReport, RunConfig, TaskKind};
use dbbench::collector::{run_collector_process, CollectorArgs};
use dbbench::worker::{run_worker, WorkerArgs};
use std::time::Duration;

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_collector_and_workers_complete_insert_run() {
    let mut config = RunConfig::new(TaskKind::Insert, "memory");
    config.num_inserts = 250;
    config.prefill = 100;
    let encoded = config.encode().unwrap();

    let port = free_port();
    let collector = tokio::spawn(run_collector_process(CollectorArgs {
        listen: format!("127.0.0.1:{port}"),
        run_config: encoded.clone(),
        worker_count: 2,
    }));

    let workers: Vec<_> = (0..2)
        .map(|i| {
            tokio::spawn(run_worker(WorkerArgs {
                identity: format!("worker-{i}"),
                collector_url: format!("http://127.0.0.1:{port}"),
                run_config: encoded.clone(),
                worker_count: 2,
            }))
        })
        .collect();
    for worker in workers {
        tokio::time::timeout(Duration::from_secs(60), worker)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    let report: InsertReport = reqwest::get(format!("http://127.0.0.1:{port}/report/insert"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report.sum.operations, 500);
    assert_eq!(report.workers.len(), 2);

    collector.abort();
}

#[tokio::test]
async fn test_collector_exits_when_backend_cannot_be_created() {
    let config = RunConfig::new(TaskKind::Insert, "no-such-backend");
    let result = run_collector_process(CollectorArgs {
        listen: format!("127.0.0.1:{}", free_port()),
        run_config: config.encode().unwrap(),
        worker_count: 1,
    })
    .await;
    let err = format!("{:#}", tokio_test::assert_err!(result));
    assert!(err.contains("no-such-backend"));
}

#[tokio::test]
async fn test_worker_rejects_undecodable_config() {
    let err = run_worker(WorkerArgs {
        identity: "w".to_string(),
        collector_url: "http://127.0.0.1:1".to_string(),
        run_config: "not base64!".to_string(),
        worker_count: 1,
    })
    .await
    .unwrap_err();
    assert!(format!("{err:#}").contains("RUN_CONFIG"));
}
