use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use hive_backend::ChatOptions;
use hive_backend_openai::OpenAiClient;
use hive_common::config::BenchConfig;
use hive_core::{run_level, Invoker, JsonFileSink, LevelReport, RetryPolicy, StressTestReport, Sweep};
use opentelemetry_otlp::WithExportConfig;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "hive", version, about = "Chat-completion stress and rubric benchmark")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sweep the corpus over increasing concurrency levels.
    Stress(StressArgs),
    /// Run the corpus once at a fixed concurrency and score every response.
    Bench(BenchArgs),
    /// Lint every *.hive-reward.json file.
    Validate(ValidateArgs),
    /// Serve the stub chat endpoint.
    ServeStub(ServeArgs),
    Version,
}

#[derive(Args, Debug, Default)]
struct CommonArgs {
    #[arg(long)]
    dataset_dir: Option<PathBuf>,
    #[arg(short, long)]
    model: Option<String>,
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// Per-attempt timeout in seconds.
    #[arg(long)]
    timeout: Option<f64>,
    #[arg(long)]
    max_retries: Option<u32>,
    /// First retry delay in seconds; doubles per retry.
    #[arg(long)]
    backoff_base: Option<f64>,
}

#[derive(Args, Debug)]
struct StressArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// Comma separated, e.g. 10,20,40
    #[arg(long, value_delimiter = ',')]
    levels: Option<Vec<usize>>,
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Also write the harness prometheus metrics here after the sweep.
    #[arg(long)]
    metrics_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct BenchArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(short, long, default_value_t = 10)]
    concurrency: usize,
    #[arg(short, long, default_value = "dump.json")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Defaults to the configured dataset directory.
    dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
    #[arg(long)]
    delay_ms: Option<u64>,
    #[arg(long)]
    fail_rate: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Stress(args) => stress(args).await,
        Commands::Bench(args) => bench(args).await,
        Commands::Validate(args) => validate(args),
        Commands::ServeStub(args) => serve_stub(args).await,
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(common: &CommonArgs) -> anyhow::Result<BenchConfig> {
    let mut cfg = BenchConfig::load()?;
    apply_common(&mut cfg, common);
    Ok(cfg)
}

fn apply_common(cfg: &mut BenchConfig, common: &CommonArgs) {
    if let Some(v) = &common.dataset_dir { cfg.dataset_dir = v.clone(); }
    if let Some(v) = &common.model { cfg.model = v.clone(); }
    if let Some(v) = &common.base_url { cfg.base_url = v.clone(); }
    if let Some(v) = &common.api_key { cfg.api_key = Some(v.clone()); }
    if let Some(v) = common.timeout { cfg.timeout_secs = v; }
    if let Some(v) = common.max_retries { cfg.max_retries = v; }
    if let Some(v) = common.backoff_base { cfg.backoff_base_secs = v; }
}

fn build_invoker(cfg: &BenchConfig) -> Invoker<OpenAiClient> {
    let client = Arc::new(OpenAiClient::from_config(cfg));
    Invoker::new(client, ChatOptions::from_config(cfg), RetryPolicy::from_config(cfg))
}

fn load_corpus(cfg: &BenchConfig) -> anyhow::Result<Vec<hive_common::corpus::RequestSpec>> {
    let corpus = hive_dataset::load_dir(&cfg.dataset_dir)
        .with_context(|| format!("loading corpus from {}", cfg.dataset_dir.display()))?;
    if corpus.is_empty() {
        bail!("no *.hive-reward.json files under {}", cfg.dataset_dir.display());
    }
    Ok(corpus)
}

async fn stress(args: StressArgs) -> anyhow::Result<()> {
    let mut cfg = load_config(&args.common)?;
    if let Some(levels) = args.levels { cfg.concurrency_levels = levels; }
    if let Some(output) = args.output { cfg.output = output; }
    cfg.validate()?;

    let corpus = load_corpus(&cfg)?;
    hive_obs::init();
    tracing::info!(
        "stress test: {} requests, model {}, endpoint {}, levels {:?}",
        corpus.len(),
        cfg.model,
        cfg.base_url,
        cfg.concurrency_levels
    );

    let sweep = Sweep::new(build_invoker(&cfg), corpus, &cfg.concurrency_levels)?
        .with_scorer(Arc::new(hive_dataset::score));
    let sink = JsonFileSink::new(&cfg.output);
    let report = sweep.run_into(&sink, shutdown_signal()).await?;
    print_summary(&report);

    if let Some(path) = args.metrics_out {
        std::fs::write(&path, hive_obs::render()).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct BenchEntry<'a> {
    topic: &'a str,
    response: &'a str,
    score: f64,
    latency: f64,
    attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a hive_core::OutcomeError>,
}

async fn bench(args: BenchArgs) -> anyhow::Result<()> {
    let cfg = load_config(&args.common)?;
    cfg.validate()?;
    if args.concurrency == 0 {
        bail!("concurrency must be at least 1");
    }
    let corpus: Arc<[_]> = load_corpus(&cfg)?.into();
    hive_obs::init();

    let invoker = build_invoker(&cfg);
    let run = tokio::select! {
        run = run_level(&invoker, &corpus, args.concurrency) => run,
        _ = shutdown_signal() => bail!("interrupted"),
    };

    let entries: Vec<BenchEntry> = run
        .outcomes
        .iter()
        .map(|o| {
            let spec = &corpus[o.index];
            let response = o.response.as_deref().unwrap_or("");
            BenchEntry {
                topic: &spec.topic,
                response,
                score: if o.success { hive_dataset::score(spec, response) } else { 0.0 },
                latency: o.latency,
                attempts: o.attempts,
                error: o.error.as_ref(),
            }
        })
        .collect();
    let text = serde_json::to_string_pretty(&entries)?;
    std::fs::write(&args.output, text).with_context(|| format!("writing {}", args.output.display()))?;

    let level = LevelReport::from_run(args.concurrency, &run);
    let mean_score = entries.iter().map(|e| e.score).sum::<f64>() / entries.len() as f64;
    tracing::info!(
        "{} / {} succeeded, mean latency {}, dump written to {}",
        level.successful_requests,
        level.total_requests,
        fmt_secs(level.mean_latency),
        args.output.display()
    );
    println!("score: {mean_score:.4}");
    Ok(())
}

fn validate(args: ValidateArgs) -> anyhow::Result<()> {
    let dir = match args.dir {
        Some(dir) => dir,
        None => BenchConfig::load()?.dataset_dir,
    };
    let files = hive_dataset::reward_files(&dir)?;
    let mut failed = 0usize;
    for file in &files {
        match hive_dataset::validate_file(file) {
            Ok(()) => tracing::debug!(target: "dataset", "ok {}", file.display()),
            Err(e) => {
                failed += 1;
                eprintln!("invalid: {e}");
            }
        }
    }
    println!("{} files checked, {} invalid", files.len(), failed);
    if failed > 0 {
        bail!("{failed} invalid dataset files");
    }
    Ok(())
}

async fn serve_stub(args: ServeArgs) -> anyhow::Result<()> {
    let mut cfg = hive_api::StubConfig::from_env();
    if let Some(ms) = args.delay_ms { cfg.delay = std::time::Duration::from_millis(ms); }
    if let Some(rate) = args.fail_rate { cfg.fail_rate = rate.clamp(0.0, 1.0); }
    let app = hive_api::app_with(cfg)?;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
    tracing::info!("stub listening on http://0.0.0.0:{}", args.port);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // no signal handler available; never resolve
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

fn fmt_secs(v: Option<f64>) -> String {
    v.map(|s| format!("{s:.3}s")).unwrap_or_else(|| "-".into())
}

fn summary_lines(report: &StressTestReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{:>6} {:>6} {:>9} {:>8} {:>9} {:>9} {:>9} {:>9} {:>9}",
        "level", "eff", "ok/total", "success", "mean", "p50", "p90", "p99", "req/s"
    )];
    for (level, r) in &report.levels {
        lines.push(format!(
            "{:>6} {:>6} {:>9} {:>7.1}% {:>9} {:>9} {:>9} {:>9} {:>9.2}",
            level,
            r.effective_concurrency,
            format!("{}/{}", r.successful_requests, r.total_requests),
            r.success_rate * 100.0,
            fmt_secs(r.mean_latency),
            fmt_secs(r.p50_latency),
            fmt_secs(r.p90_latency),
            fmt_secs(r.p99_latency),
            r.throughput,
        ));
    }
    if report.aborted {
        lines.push("sweep aborted before all levels finished".into());
    }
    lines
}

fn print_summary(report: &StressTestReport) {
    println!("endpoint: {}  model: {}  corpus: {}", report.endpoint, report.model, report.corpus_size);
    for line in summary_lines(report) {
        println!("{line}");
    }
}

/// Harness targets at info, HTTP plumbing quieted.
const DEFAULT_LOG_FILTER: &str = "info,hyper=warn,hyper_util=warn,reqwest=warn,h2=warn,tower=warn";

fn log_filter(hive_log: Option<String>, rust_log: Option<String>) -> tracing_subscriber::EnvFilter {
    let directives = hive_log.or(rust_log).unwrap_or_else(|| DEFAULT_LOG_FILTER.into());
    tracing_subscriber::EnvFilter::try_new(&directives)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// `HIVE_LOG` wins over `RUST_LOG`. Spans are exported over OTLP only when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set and the pipeline comes up.
fn init_tracing() {
    let filter = log_filter(std::env::var("HIVE_LOG").ok(), std::env::var("RUST_LOG").ok());
    let otel = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok().and_then(|endpoint| {
        opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint))
            .install_simple()
            .map_err(|e| eprintln!("otlp exporter disabled: {e}"))
            .ok()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(otel.map(OpenTelemetryLayer::new))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stress_flags_parse_level_list() {
        let cli = Cli::try_parse_from(["hive", "stress", "--levels", "5,25", "--timeout", "30", "-m", "qwen"]).unwrap();
        let Commands::Stress(args) = cli.command else { panic!("expected stress") };
        assert_eq!(args.levels, Some(vec![5, 25]));
        assert_eq!(args.common.timeout, Some(30.0));
        assert_eq!(args.common.model.as_deref(), Some("qwen"));
    }

    #[test]
    fn flags_override_config() {
        let mut cfg = BenchConfig::default();
        let common = CommonArgs { max_retries: Some(4), backoff_base: Some(0.5), ..CommonArgs::default() };
        apply_common(&mut cfg, &common);
        assert_eq!(cfg.max_retries, 4);
        assert_eq!(cfg.backoff_base_secs, 0.5);
        assert_eq!(cfg.timeout_secs, 120.0);
    }

    #[test]
    fn log_filter_prefers_hive_log_and_survives_bad_directives() {
        assert_eq!(log_filter(Some("sweep=debug".into()), Some("warn".into())).to_string(), "sweep=debug");
        assert_eq!(log_filter(None, Some("warn".into())).to_string(), "warn");
        assert_eq!(log_filter(None, None).to_string(), log_filter(Some("sweep=loud".into()), None).to_string());
    }

    #[test]
    fn summary_marks_missing_percentiles() {
        let mut report = StressTestReport::new("http://x", "m", 2);
        let outcomes = vec![hive_core::RequestOutcome::failed(0, 1.0, 2, &hive_backend::ClientError::Timeout)];
        report.levels.insert(10, LevelReport::from_outcomes(10, 1, &outcomes));
        report.aborted = true;
        let lines = summary_lines(&report);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("0/1"));
        assert!(lines[1].contains(" -"));
        assert!(lines[2].contains("aborted"));
    }
}
