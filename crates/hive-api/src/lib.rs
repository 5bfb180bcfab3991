//! Stub OpenAI-compatible endpoint for dry runs and end-to-end tests.

use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

#[derive(Debug, Clone, Default)]
pub struct StubConfig {
    /// Artificial latency per chat request.
    pub delay: Duration,
    /// Fraction of chat requests answered with 503, in `[0, 1]`.
    pub fail_rate: f64,
}

impl StubConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = std::env::var("HIVE_STUB_DELAY_MS").ok().and_then(|v| v.parse().ok()) {
            cfg.delay = Duration::from_millis(v);
        }
        if let Some(v) = std::env::var("HIVE_STUB_FAIL_RATE").ok().and_then(|v| v.parse::<f64>().ok()) {
            cfg.fail_rate = v.clamp(0.0, 1.0);
        }
        cfg
    }
}

#[derive(Clone)]
struct AppState {
    cfg: StubConfig,
    registry: Registry,
    requests_total: IntCounter,
    failures_total: IntCounter,
}

pub fn app() -> prometheus::Result<Router> { app_with(StubConfig::from_env()) }

pub fn app_with(cfg: StubConfig) -> prometheus::Result<Router> {
    let registry = Registry::new();
    let requests_total = IntCounter::new("hive_stub_requests_total", "Chat requests received by the stub")?;
    let failures_total = IntCounter::new("hive_stub_failures_total", "Chat requests answered with an injected 503")?;
    registry.register(Box::new(requests_total.clone()))?;
    registry.register(Box::new(failures_total.clone()))?;
    tracing::info!(target: "api", delay_ms = cfg.delay.as_millis() as u64, fail_rate = cfg.fail_rate, "stub endpoint configured");

    let state = AppState { cfg, registry, requests_total, failures_total };
    Ok(Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(metrics))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&state.registry.gather(), &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, [("content-type", "text/plain".to_string())], e.to_string().into_bytes());
    }
    (StatusCode::OK, [("content-type", encoder.format_type().to_string())], buffer)
}

#[derive(serde::Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(serde::Deserialize)]
struct ChatRequest {
    model: Option<String>,
    messages: Vec<ChatMessage>,
}

#[derive(serde::Serialize)]
struct ChatChoiceMessage { role: String, content: String }

#[derive(serde::Serialize)]
struct ChatChoice { index: u32, message: ChatChoiceMessage, finish_reason: String }

#[derive(serde::Serialize)]
struct ChatResponse {
    id: String,
    object: String,
    model: String,
    choices: Vec<ChatChoice>,
}

async fn chat_completions(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    state.requests_total.inc();
    if !state.cfg.delay.is_zero() {
        tokio::time::sleep(state.cfg.delay).await;
    }
    if state.cfg.fail_rate > 0.0 && rand::random::<f64>() < state.cfg.fail_rate {
        state.failures_total.inc();
        return Err((StatusCode::SERVICE_UNAVAILABLE, "stub overloaded".into()));
    }
    let prompt = req.messages.iter().rev().find(|m| m.role == "user").map(|m| m.content.as_str()).unwrap_or("");
    tracing::debug!(target: "api", "chat request: {} messages", req.messages.len());
    Ok(Json(ChatResponse {
        id: format!("chatcmpl-{}", state.requests_total.get()),
        object: "chat.completion".into(),
        model: req.model.unwrap_or_else(|| "stub".into()),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatChoiceMessage { role: "assistant".into(), content: format!("echo: {prompt}") },
            finish_reason: "stop".into(),
        }],
    }))
}
