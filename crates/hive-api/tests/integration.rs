use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hive_api::{app_with, StubConfig};
use hive_backend::{ChatClient, ChatOptions, ErrorKind};
use hive_backend_openai::OpenAiClient;
use hive_common::corpus::RequestSpec;
use hive_core::{Invoker, RetryPolicy, Sweep};

async fn spawn_stub(cfg: StubConfig) -> String {
    let app: Router = app_with(cfg).unwrap();
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{}:{}", addr.ip(), addr.port())
}

fn policy() -> RetryPolicy {
    RetryPolicy { timeout: Duration::from_secs(5), max_retries: 1, backoff_base: Duration::from_millis(10) }
}

#[tokio::test]
async fn health_and_metrics() {
    let base = spawn_stub(StubConfig::default()).await;
    let client = reqwest::Client::new();

    let r = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert!(r.status().is_success());

    let r = client.get(format!("{base}/metrics")).send().await.unwrap();
    assert!(r.status().is_success());
    assert!(r.text().await.unwrap().contains("hive_stub_requests_total"));
}

#[tokio::test]
async fn openai_client_round_trips_through_stub() {
    let base = spawn_stub(StubConfig::default()).await;
    let client = OpenAiClient::new(format!("{base}/v1"), Some("sk-test".into()));
    let options = ChatOptions { prefix: "Q: ".into(), ..ChatOptions::default() };
    let text = client.send("what is rust", &options).await.unwrap();
    assert_eq!(text, "echo: Q: what is rust");
}

#[tokio::test]
async fn sweep_against_stub_reports_every_request() {
    let base = spawn_stub(StubConfig { delay: Duration::from_millis(20), fail_rate: 0.0 }).await;
    let client = Arc::new(OpenAiClient::new(format!("{base}/v1"), None));
    let corpus: Vec<RequestSpec> = (0..6).map(|i| RequestSpec::new(format!("topic {i}"))).collect();
    let sweep = Sweep::new(Invoker::new(client, ChatOptions::default(), policy()), corpus, &[2, 10]).unwrap();
    let report = sweep.run().await;

    assert_eq!(report.endpoint, format!("{base}/v1"));
    let capped = &report.levels[&10];
    assert_eq!(capped.effective_concurrency, 6);
    for level in report.levels.values() {
        assert_eq!(level.total_requests, 6);
        assert_eq!(level.success_rate, 1.0);
        assert!(level.p50_latency.unwrap() >= 0.02);
    }
}

#[tokio::test]
async fn injected_failures_surface_as_transport_errors() {
    let base = spawn_stub(StubConfig { delay: Duration::ZERO, fail_rate: 1.0 }).await;
    let client = Arc::new(OpenAiClient::new(format!("{base}/v1"), None));
    let invoker = Invoker::new(client, ChatOptions::default(), policy());
    let outcome = invoker.invoke(0, &RequestSpec::new("t")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 2);
    let err = outcome.error.unwrap();
    assert_eq!(err.kind, ErrorKind::Transport);
    assert_eq!(err.code, Some(503));
}
