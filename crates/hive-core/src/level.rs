use std::sync::Arc;
use std::time::Duration;

use hive_backend::{ChatClient, ClientError};
use hive_common::corpus::RequestSpec;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::gate::AdmissionGate;
use crate::invoker::Invoker;
use crate::outcome::RequestOutcome;

/// Result of running the whole corpus once at one concurrency.
#[derive(Debug, Clone)]
pub struct LevelRun {
    /// One per corpus item, ordered by corpus index.
    pub outcomes: Vec<RequestOutcome>,
    pub concurrency: usize,
    pub peak_in_flight: usize,
    /// Level start to last completion.
    pub wall_clock: Duration,
}

/// Requested concurrency capped to the corpus size.
pub fn effective_concurrency(requested: usize, corpus_len: usize) -> usize {
    requested.min(corpus_len).max(1)
}

/// Submits every corpus item through a fresh gate and waits for all of them.
/// Failures are recorded per item and never stop the rest of the level.
pub async fn run_level<C: ChatClient>(
    invoker: &Invoker<C>,
    corpus: &Arc<[RequestSpec]>,
    concurrency: usize,
) -> LevelRun {
    let total = corpus.len();
    let concurrency = effective_concurrency(concurrency, total);
    let gate = AdmissionGate::new(concurrency);
    hive_obs::set_concurrency(concurrency);
    let start = Instant::now();

    let mut tasks = JoinSet::new();
    for index in 0..total {
        let gate = gate.clone();
        let invoker = invoker.clone();
        let corpus = corpus.clone();
        tasks.spawn(async move {
            match gate.acquire().await {
                Ok(admission) => {
                    let outcome = invoker.invoke(index, &corpus[index]).await;
                    drop(admission);
                    outcome
                }
                Err(e) => RequestOutcome::failed(index, 0.0, 0, &ClientError::Unexpected(e.to_string())),
            }
        });
    }

    let mut slots: Vec<Option<RequestOutcome>> = vec![None; total];
    let mut done = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => {
                done += 1;
                tracing::debug!(target: "level", concurrency, "completed {done}/{total} (item {}, ok={})", outcome.index, outcome.success);
                let index = outcome.index;
                slots[index] = Some(outcome);
            }
            Err(e) => tracing::error!(target: "level", concurrency, "request task died: {e}"),
        }
    }

    let outcomes = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| {
                RequestOutcome::failed(index, 0.0, 0, &ClientError::Unexpected("request task did not complete".into()))
            })
        })
        .collect();

    LevelRun { outcomes, concurrency, peak_in_flight: gate.peak(), wall_clock: start.elapsed() }
}
