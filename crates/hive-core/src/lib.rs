//! Stress-test harness: timed invocation, admission control, level runs and
//! the concurrency sweep.

pub mod gate;
pub mod invoker;
pub mod level;
pub mod outcome;
pub mod report;
pub mod stats;
pub mod sweep;

pub use gate::{Admission, AdmissionGate};
pub use invoker::{Invoker, RetryPolicy};
pub use level::{effective_concurrency, run_level, LevelRun};
pub use outcome::{OutcomeError, RequestOutcome};
pub use report::{ErrorBreakdown, JsonFileSink, LevelReport, ReportSink, StressTestReport};
pub use sweep::{Scorer, Sweep};
