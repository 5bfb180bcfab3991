use std::path::{Path, PathBuf};

use hive_backend::ErrorKind;
use hive_common::{HiveError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::level::LevelRun;
use crate::outcome::RequestOutcome;
use crate::stats;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBreakdown {
    pub timeout: usize,
    pub transport: usize,
    pub unexpected: usize,
}

impl ErrorBreakdown {
    fn record(&mut self, kind: ErrorKind) {
        match kind {
            ErrorKind::Timeout => self.timeout += 1,
            ErrorKind::Transport => self.transport += 1,
            ErrorKind::Unexpected => self.unexpected += 1,
        }
    }
}

/// Aggregate for one concurrency level. Latency fields are seconds and are
/// `None` when the level had no successful request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelReport {
    pub concurrency: usize,
    pub effective_concurrency: usize,
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub success_rate: f64,
    pub mean_latency: Option<f64>,
    pub p50_latency: Option<f64>,
    pub p90_latency: Option<f64>,
    pub p99_latency: Option<f64>,
    /// Successes per second of `total_duration`.
    pub throughput: f64,
    /// Largest outcome latency in the level, used as its duration.
    pub total_duration: f64,
    /// Measured level start to last completion.
    pub wall_clock_secs: f64,
    pub peak_in_flight: usize,
    pub errors: ErrorBreakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_score: Option<f64>,
}

impl LevelReport {
    pub fn from_run(requested: usize, run: &LevelRun) -> Self {
        let mut report = Self::from_outcomes(requested, run.concurrency, &run.outcomes);
        report.wall_clock_secs = run.wall_clock.as_secs_f64();
        report.peak_in_flight = run.peak_in_flight;
        report
    }

    pub fn from_outcomes(requested: usize, effective: usize, outcomes: &[RequestOutcome]) -> Self {
        let total = outcomes.len();
        let successes: Vec<f64> = outcomes.iter().filter(|o| o.success).map(|o| o.latency).collect();
        let successful = successes.len();
        let mut errors = ErrorBreakdown::default();
        outcomes.iter().filter_map(RequestOutcome::error_kind).for_each(|k| errors.record(k));

        let total_duration = outcomes.iter().map(|o| o.latency).fold(0.0, f64::max);
        let summary = stats::summarize(&successes);

        Self {
            concurrency: requested,
            effective_concurrency: effective,
            total_requests: total,
            successful_requests: successful,
            failed_requests: total - successful,
            success_rate: if total == 0 { 0.0 } else { successful as f64 / total as f64 },
            mean_latency: summary.map(|s| s.mean),
            p50_latency: summary.map(|s| s.p50),
            p90_latency: summary.map(|s| s.p90),
            p99_latency: summary.map(|s| s.p99),
            throughput: stats::throughput(successful, total_duration),
            total_duration,
            wall_clock_secs: 0.0,
            peak_in_flight: 0,
            errors,
            mean_score: None,
        }
    }
}

/// Whole sweep, keyed by requested concurrency in sweep order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressTestReport {
    pub endpoint: String,
    pub model: String,
    pub corpus_size: usize,
    pub aborted: bool,
    pub levels: IndexMap<usize, LevelReport>,
}

impl StressTestReport {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, corpus_size: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            corpus_size,
            aborted: false,
            levels: IndexMap::new(),
        }
    }
}

/// Write-once destination for a finished report.
pub trait ReportSink {
    fn write(&self, report: &StressTestReport) -> Result<()>;
}

pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

    pub fn path(&self) -> &Path { &self.path }
}

impl ReportSink for JsonFileSink {
    fn write(&self, report: &StressTestReport) -> Result<()> {
        let text = serde_json::to_string_pretty(report).map_err(|e| HiveError::Message(e.to_string()))?;
        std::fs::write(&self.path, text)
            .map_err(|source| HiveError::Io { path: self.path.display().to_string(), source })?;
        tracing::info!(target: "sweep", "report written to {}", self.path.display());
        Ok(())
    }
}
