use std::sync::Arc;
use std::time::Duration;

use hive_backend::mock::{MockClient, MockReply};
use hive_backend::{ChatOptions, ClientError, ErrorKind};
use hive_common::corpus::RequestSpec;
use hive_core::{effective_concurrency, run_level, Invoker, RetryPolicy};

fn corpus(n: usize) -> Arc<[RequestSpec]> {
    (0..n).map(|i| RequestSpec::new(format!("topic-{i}"))).collect::<Vec<_>>().into()
}

fn policy() -> RetryPolicy {
    RetryPolicy { timeout: Duration::from_secs(3), max_retries: 1, backoff_base: Duration::from_millis(500) }
}

#[test]
fn concurrency_is_capped_to_corpus_size() {
    assert_eq!(effective_concurrency(25, 20), 20);
    assert_eq!(effective_concurrency(5, 20), 5);
    assert_eq!(effective_concurrency(1280, 1), 1);
}

#[tokio::test(start_paused = true)]
async fn every_item_yields_one_outcome_in_corpus_order() {
    // mixed failure modes by topic suffix
    let client = Arc::new(MockClient::with_behavior(Duration::from_millis(50), |topic, _| {
        let n: usize = topic.trim_start_matches("topic-").parse().unwrap_or(0);
        match n % 4 {
            0 => MockReply::Text(format!("ok {topic}")),
            1 => MockReply::Fail(ClientError::Transport { code: Some(502), message: "bad gateway".into() }),
            2 => MockReply::Hang,
            _ => MockReply::Panic("scoring bug".into()),
        }
    }));
    let invoker = Invoker::new(client, ChatOptions::default(), policy());
    let run = run_level(&invoker, &corpus(17), 4).await;

    assert_eq!(run.outcomes.len(), 17);
    for (i, outcome) in run.outcomes.iter().enumerate() {
        assert_eq!(outcome.index, i);
        let expected = match i % 4 {
            0 => None,
            1 => Some(ErrorKind::Transport),
            2 => Some(ErrorKind::Timeout),
            _ => Some(ErrorKind::Unexpected),
        };
        assert_eq!(outcome.error_kind(), expected, "item {i}");
        assert_eq!(outcome.success, expected.is_none());
    }
    assert!(run.peak_in_flight <= 4);
}

#[tokio::test(start_paused = true)]
async fn client_never_sees_more_than_the_level() {
    let client = Arc::new(MockClient::new(Duration::from_millis(20)).jitter(Duration::from_millis(30)));
    let invoker = Invoker::new(client.clone(), ChatOptions::default(), policy());
    let run = run_level(&invoker, &corpus(40), 7).await;

    assert_eq!(run.concurrency, 7);
    assert_eq!(run.peak_in_flight, 7);
    assert!(client.peak_in_flight() <= 7);
    assert!(run.outcomes.iter().all(|o| o.success));
    assert_eq!(client.total_calls(), 40);
}

#[tokio::test(start_paused = true)]
async fn level_above_corpus_admits_everything_at_once() {
    let client = Arc::new(MockClient::new(Duration::from_millis(100)));
    let invoker = Invoker::new(client.clone(), ChatOptions::default(), policy());
    let run = run_level(&invoker, &corpus(20), 25).await;

    assert_eq!(run.concurrency, 20);
    assert_eq!(run.peak_in_flight, 20);
    assert_eq!(client.peak_in_flight(), 20);
    assert!(run.wall_clock >= Duration::from_millis(100));
    assert!(run.wall_clock < Duration::from_millis(200));
}
