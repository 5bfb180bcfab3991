use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use hive_backend::ChatClient;
use hive_common::corpus::RequestSpec;
use hive_common::{HiveError, Result};

use crate::invoker::Invoker;
use crate::level::{effective_concurrency, run_level, LevelRun};
use crate::report::{LevelReport, ReportSink, StressTestReport};

/// Scores one response against its request's rubric.
pub type Scorer = Arc<dyn Fn(&RequestSpec, &str) -> f64 + Send + Sync>;

enum SweepState {
    Idle,
    RunningLevel(usize),
    Aggregating(usize, LevelRun),
    Done,
}

/// Runs the corpus once per concurrency level, strictly one level at a time.
pub struct Sweep<C> {
    invoker: Invoker<C>,
    corpus: Arc<[RequestSpec]>,
    levels: Vec<usize>,
    scorer: Option<Scorer>,
}

impl<C: ChatClient> Sweep<C> {
    /// Fails on an empty corpus or an unusable level list; nothing runs then.
    pub fn new(invoker: Invoker<C>, corpus: Vec<RequestSpec>, levels: &[usize]) -> Result<Self> {
        if corpus.is_empty() {
            return Err(HiveError::EmptyCorpus);
        }
        if levels.is_empty() {
            return Err(HiveError::Config("no concurrency levels configured".into()));
        }
        if levels.contains(&0) {
            return Err(HiveError::Config("concurrency level must be at least 1".into()));
        }
        let mut unique = Vec::with_capacity(levels.len());
        for &level in levels {
            if unique.contains(&level) {
                tracing::warn!(target: "sweep", level, "duplicate concurrency level ignored");
            } else {
                unique.push(level);
            }
        }
        Ok(Self { invoker, corpus: corpus.into(), levels: unique, scorer: None })
    }

    pub fn with_scorer(mut self, scorer: Scorer) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn levels(&self) -> &[usize] { &self.levels }

    pub fn corpus(&self) -> &[RequestSpec] { &self.corpus }

    pub async fn run(&self) -> StressTestReport { self.run_until(std::future::pending::<()>()).await }

    /// Like [`Sweep::run`], but stops when `shutdown` resolves. The level in
    /// progress is dropped, finished levels are kept and the report is marked
    /// aborted.
    pub async fn run_until<F: Future<Output = ()>>(&self, shutdown: F) -> StressTestReport {
        tokio::pin!(shutdown);
        let mut report = StressTestReport::new(
            self.invoker.client().endpoint(),
            self.invoker.options().model.clone(),
            self.corpus.len(),
        );

        let mut state = SweepState::Idle;
        loop {
            state = match state {
                SweepState::Idle => SweepState::RunningLevel(0),
                SweepState::RunningLevel(i) => {
                    let requested = self.levels[i];
                    let effective = effective_concurrency(requested, self.corpus.len());
                    if effective < requested {
                        tracing::info!(target: "sweep", requested, effective, "concurrency capped to corpus size");
                    }
                    tracing::info!(target: "sweep", "level {}/{}: concurrency {effective}", i + 1, self.levels.len());
                    tokio::select! {
                        run = run_level(&self.invoker, &self.corpus, requested) => SweepState::Aggregating(i, run),
                        _ = &mut shutdown => {
                            tracing::warn!(target: "sweep", requested, "shutdown requested, abandoning level");
                            report.aborted = true;
                            SweepState::Done
                        }
                    }
                }
                SweepState::Aggregating(i, run) => {
                    let level = self.reduce(self.levels[i], &run);
                    tracing::info!(
                        target: "sweep",
                        concurrency = level.effective_concurrency,
                        "success {}/{} ({:.1}%), mean {:?}s, p99 {:?}s, {:.2} req/s",
                        level.successful_requests,
                        level.total_requests,
                        level.success_rate * 100.0,
                        level.mean_latency,
                        level.p99_latency,
                        level.throughput,
                    );
                    report.levels.insert(self.levels[i], level);
                    if i + 1 < self.levels.len() {
                        SweepState::RunningLevel(i + 1)
                    } else {
                        SweepState::Done
                    }
                }
                SweepState::Done => break,
            };
        }
        report
    }

    /// Runs the sweep and hands the report, complete or aborted, to `sink`.
    pub async fn run_into<F: Future<Output = ()>>(
        &self,
        sink: &dyn ReportSink,
        shutdown: F,
    ) -> Result<StressTestReport> {
        let report = self.run_until(shutdown).await;
        sink.write(&report)?;
        Ok(report)
    }

    fn reduce(&self, requested: usize, run: &LevelRun) -> LevelReport {
        let mut level = LevelReport::from_run(requested, run);
        if let Some(scorer) = &self.scorer {
            let total: f64 = run
                .outcomes
                .iter()
                .filter_map(|o| o.response.as_deref().map(|text| (o.index, text)))
                .map(|(index, text)| {
                    let spec = &self.corpus[index];
                    match panic::catch_unwind(AssertUnwindSafe(|| scorer(spec, text))) {
                        Ok(score) => score,
                        Err(_) => {
                            tracing::warn!(target: "sweep", index, "scorer panicked, item scored 0");
                            0.0
                        }
                    }
                })
                .sum();
            level.mean_score = Some(total / run.outcomes.len().max(1) as f64);
        }
        level
    }
}
