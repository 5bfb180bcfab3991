//! Inference client contract shared by the harness and its backends.

use std::future::Future;

use hive_common::config::BenchConfig;
use serde::{Deserialize, Serialize};

/// Generation parameters sent with every chat request.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub model: String,
    pub system_prompt: String,
    pub prefix: String,
    pub suffix: String,
    pub max_tokens: u32,
    pub top_k: u32,
    pub enable_thinking: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            model: "hive".into(),
            system_prompt: "You are a helpful assistant.".into(),
            prefix: String::new(),
            suffix: String::new(),
            max_tokens: 8192,
            top_k: 20,
            enable_thinking: false,
        }
    }
}

impl ChatOptions {
    pub fn from_config(cfg: &BenchConfig) -> Self {
        Self {
            model: cfg.model.clone(),
            system_prompt: cfg.system_prompt.clone(),
            prefix: cfg.prefix.clone(),
            suffix: cfg.suffix.clone(),
            max_tokens: cfg.max_tokens,
            top_k: cfg.top_k,
            enable_thinking: cfg.enable_thinking,
        }
    }

    pub fn user_prompt(&self, topic: &str) -> String {
        format!("{}{}{}", self.prefix, topic, self.suffix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Transport,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transport => "transport",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error{}: {message}", .code.map(|c| format!(" ({c})")).unwrap_or_default())]
    Transport { code: Option<u16>, message: String },
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Timeout => ErrorKind::Timeout,
            ClientError::Transport { .. } => ErrorKind::Transport,
            ClientError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            ClientError::Transport { code, .. } => *code,
            _ => None,
        }
    }
}

/// An async chat-completion endpoint. Implementations are shared across many
/// concurrent callers and must not keep per-request state.
pub trait ChatClient: Send + Sync + 'static {
    fn send(
        &self,
        topic: &str,
        options: &ChatOptions,
    ) -> impl Future<Output = Result<String, ClientError>> + Send;

    /// Identifier recorded in reports.
    fn endpoint(&self) -> String;
}

#[cfg(feature = "mock")]
pub mod mock {
    use super::*;
    use rand::Rng;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// What the mock does for one attempt.
    #[derive(Debug, Clone)]
    pub enum MockReply {
        Text(String),
        Fail(ClientError),
        /// Sleeps far beyond any sensible timeout.
        Hang,
        Panic(String),
    }

    type Behavior = dyn Fn(&str, usize) -> MockReply + Send + Sync;

    /// Scriptable in-process client. `behavior(topic, attempt)` decides each
    /// reply; `attempt` counts calls for that topic starting at 1.
    pub struct MockClient {
        latency: Duration,
        jitter: Duration,
        behavior: Arc<Behavior>,
        calls: Mutex<HashMap<String, usize>>,
        total_calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl MockClient {
        /// Echoes the topic after `latency`.
        pub fn new(latency: Duration) -> Self {
            Self::with_behavior(latency, |topic, _| MockReply::Text(format!("echo: {topic}")))
        }

        pub fn with_behavior<F>(latency: Duration, behavior: F) -> Self
        where
            F: Fn(&str, usize) -> MockReply + Send + Sync + 'static,
        {
            Self {
                latency,
                jitter: Duration::ZERO,
                behavior: Arc::new(behavior),
                calls: Mutex::new(HashMap::new()),
                total_calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }
        }

        /// Adds a uniformly random extra delay in `[0, jitter)` per call.
        pub fn jitter(mut self, jitter: Duration) -> Self {
            self.jitter = jitter;
            self
        }

        pub fn calls_for(&self, topic: &str) -> usize {
            self.calls.lock().map(|g| g.get(topic).copied().unwrap_or(0)).unwrap_or(0)
        }

        pub fn total_calls(&self) -> usize { self.total_calls.load(Ordering::SeqCst) }

        pub fn peak_in_flight(&self) -> usize { self.peak_in_flight.load(Ordering::SeqCst) }

        pub fn reset_peak(&self) { self.peak_in_flight.store(0, Ordering::SeqCst) }

        fn next_attempt(&self, topic: &str) -> usize {
            self.total_calls.fetch_add(1, Ordering::SeqCst);
            let mut calls = match self.calls.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            let n = calls.entry(topic.to_string()).or_insert(0);
            *n += 1;
            *n
        }

        fn delay(&self) -> Duration {
            if self.jitter.is_zero() {
                return self.latency;
            }
            let extra = rand::thread_rng().gen_range(0..self.jitter.as_micros().max(1) as u64);
            self.latency + Duration::from_micros(extra)
        }
    }

    struct InFlight<'a>(&'a MockClient);

    impl<'a> InFlight<'a> {
        fn enter(client: &'a MockClient) -> Self {
            let now = client.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            client.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            Self(client)
        }
    }

    impl Drop for InFlight<'_> {
        fn drop(&mut self) { self.0.in_flight.fetch_sub(1, Ordering::SeqCst); }
    }

    impl ChatClient for MockClient {
        async fn send(&self, topic: &str, _options: &ChatOptions) -> Result<String, ClientError> {
            let attempt = self.next_attempt(topic);
            let _guard = InFlight::enter(self);
            let reply = (self.behavior)(topic, attempt);
            match reply {
                MockReply::Hang => {
                    tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                    Err(ClientError::Timeout)
                }
                MockReply::Panic(msg) => panic!("{msg}"),
                MockReply::Text(text) => {
                    tokio::time::sleep(self.delay()).await;
                    Ok(text)
                }
                MockReply::Fail(err) => {
                    tokio::time::sleep(self.delay()).await;
                    Err(err)
                }
            }
        }

        fn endpoint(&self) -> String { "mock://local".into() }
    }
}
