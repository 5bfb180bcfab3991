use std::sync::{Arc, Mutex};
use std::time::Duration;

use hive_backend::mock::{MockClient, MockReply};
use hive_backend::{ChatOptions, ClientError};
use hive_common::corpus::RequestSpec;
use hive_common::HiveError;
use hive_core::{Invoker, JsonFileSink, ReportSink, RetryPolicy, StressTestReport, Sweep};

fn corpus(n: usize) -> Vec<RequestSpec> {
    (0..n).map(|i| RequestSpec::new(format!("topic-{i}"))).collect()
}

fn invoker(client: MockClient) -> Invoker<MockClient> {
    let policy = RetryPolicy { timeout: Duration::from_secs(5), max_retries: 1, backoff_base: Duration::from_secs(1) };
    Invoker::new(Arc::new(client), ChatOptions { model: "m".into(), ..ChatOptions::default() }, policy)
}

#[derive(Default)]
struct MemorySink(Mutex<Vec<StressTestReport>>);

impl ReportSink for MemorySink {
    fn write(&self, report: &StressTestReport) -> hive_common::Result<()> {
        self.0.lock().unwrap().push(report.clone());
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn sweep_caps_levels_and_reports_every_request() {
    let sweep = Sweep::new(invoker(MockClient::new(Duration::from_millis(100))), corpus(20), &[5, 25]).unwrap();
    let report = sweep.run().await;

    assert_eq!(report.corpus_size, 20);
    assert_eq!(report.model, "m");
    assert_eq!(report.endpoint, "mock://local");
    assert!(!report.aborted);
    assert_eq!(report.levels.keys().copied().collect::<Vec<_>>(), vec![5, 25]);

    let five = &report.levels[&5];
    assert_eq!(five.effective_concurrency, 5);
    assert_eq!(five.peak_in_flight, 5);
    assert_eq!(five.total_requests, 20);

    let capped = &report.levels[&25];
    assert_eq!(capped.concurrency, 25);
    assert_eq!(capped.effective_concurrency, 20);
    assert_eq!(capped.peak_in_flight, 20);
    assert_eq!(capped.total_requests, 20);
    assert_eq!(capped.success_rate, 1.0);
    assert_eq!(capped.failed_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn failing_level_does_not_stop_the_sweep() {
    let client = MockClient::with_behavior(Duration::from_millis(10), |_, _| {
        MockReply::Fail(ClientError::Transport { code: Some(503), message: "overloaded".into() })
    });
    let sweep = Sweep::new(invoker(client), corpus(6), &[2, 4, 8]).unwrap();
    let report = sweep.run().await;

    assert_eq!(report.levels.len(), 3);
    for level in report.levels.values() {
        assert_eq!(level.total_requests, 6);
        assert_eq!(level.failed_requests, 6);
        assert_eq!(level.errors.transport, 6);
        assert_eq!(level.throughput, 0.0);
        assert!(level.p99_latency.is_none());
    }
}

#[test]
fn empty_corpus_is_fatal() {
    let err = Sweep::new(invoker(MockClient::new(Duration::ZERO)), Vec::new(), &[10]).err().unwrap();
    assert!(matches!(err, HiveError::EmptyCorpus));
}

#[test]
fn zero_or_missing_levels_are_rejected() {
    assert!(Sweep::new(invoker(MockClient::new(Duration::ZERO)), corpus(1), &[]).is_err());
    assert!(Sweep::new(invoker(MockClient::new(Duration::ZERO)), corpus(1), &[4, 0]).is_err());
}

#[test]
fn duplicate_levels_run_once() {
    let sweep = Sweep::new(invoker(MockClient::new(Duration::ZERO)), corpus(3), &[10, 20, 10]).unwrap();
    assert_eq!(sweep.levels(), &[10, 20]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_keeps_finished_levels_and_still_reaches_the_sink() {
    let sweep = Sweep::new(invoker(MockClient::new(Duration::from_secs(1))), corpus(4), &[4, 1]).unwrap();
    let sink = MemorySink::default();
    let report = sweep.run_into(&sink, tokio::time::sleep(Duration::from_secs(2))).await.unwrap();

    assert!(report.aborted);
    assert_eq!(report.levels.keys().copied().collect::<Vec<_>>(), vec![4]);
    assert_eq!(sink.0.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn scorer_feeds_mean_score_with_failures_counted_as_zero() {
    let client = MockClient::with_behavior(Duration::from_millis(10), |topic, _| {
        if topic == "topic-0" {
            MockReply::Fail(ClientError::Unexpected("x".into()))
        } else {
            MockReply::Text("good".into())
        }
    });
    let sweep = Sweep::new(invoker(client), corpus(4), &[4])
        .unwrap()
        .with_scorer(Arc::new(|_: &RequestSpec, text: &str| if text == "good" { 1.0 } else { 0.0 }));
    let report = sweep.run().await;
    assert_eq!(report.levels[&4].mean_score, Some(0.75));
}

#[tokio::test(start_paused = true)]
async fn panicking_scorer_scores_zero_and_report_still_reaches_the_sink() {
    let sweep = Sweep::new(invoker(MockClient::new(Duration::from_millis(10))), corpus(3), &[1, 2])
        .unwrap()
        .with_scorer(Arc::new(|spec: &RequestSpec, _: &str| {
            if spec.topic == "topic-1" {
                panic!("rubric bug");
            }
            1.0
        }));
    let sink = MemorySink::default();
    let report = sweep.run_into(&sink, std::future::pending()).await.unwrap();

    assert!(!report.aborted);
    assert_eq!(report.levels.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    for level in report.levels.values() {
        assert_eq!(level.successful_requests, 3);
        let score = level.mean_score.unwrap();
        assert!((score - 2.0 / 3.0).abs() < 1e-12, "{score}");
    }
    assert_eq!(sink.0.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn json_sink_writes_levels_in_sweep_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    let sweep = Sweep::new(invoker(MockClient::new(Duration::from_millis(5))), corpus(3), &[40, 10]).unwrap();
    sweep.run_into(&JsonFileSink::new(&path), std::future::pending()).await.unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.find("\"40\"").unwrap() < text.find("\"10\"").unwrap());
    let parsed: StressTestReport = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed.levels.keys().copied().collect::<Vec<_>>(), vec![40, 10]);
    assert_eq!(parsed.levels[&10].effective_concurrency, 3);
}
