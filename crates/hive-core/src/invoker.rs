use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use hive_backend::{ChatClient, ChatOptions, ClientError};
use hive_common::config::BenchConfig;
use hive_common::corpus::RequestSpec;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::outcome::RequestOutcome;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Deadline for a single attempt; each retry gets a fresh one.
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(120), max_retries: 1, backoff_base: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &BenchConfig) -> Self {
        Self { timeout: cfg.timeout(), max_retries: cfg.max_retries, backoff_base: cfg.backoff_base() }
    }

    pub fn max_attempts(&self) -> u32 { self.max_retries.saturating_add(1) }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(31);
        self.backoff_base.saturating_mul(1u32 << exp)
    }
}

enum Attempt {
    Running { attempt: u32 },
    Backoff { attempt: u32 },
    Succeeded { attempt: u32, text: String },
    Exhausted { attempt: u32, err: ClientError },
}

/// Runs single requests against a shared client under a [`RetryPolicy`].
pub struct Invoker<C> {
    client: Arc<C>,
    options: Arc<ChatOptions>,
    policy: RetryPolicy,
}

impl<C> Clone for Invoker<C> {
    fn clone(&self) -> Self {
        Self { client: self.client.clone(), options: self.options.clone(), policy: self.policy }
    }
}

impl<C: ChatClient> Invoker<C> {
    pub fn new(client: Arc<C>, options: ChatOptions, policy: RetryPolicy) -> Self {
        Self { client, options: Arc::new(options), policy }
    }

    pub fn client(&self) -> &Arc<C> { &self.client }

    pub fn options(&self) -> &ChatOptions { &self.options }

    pub fn policy(&self) -> &RetryPolicy { &self.policy }

    /// Always yields exactly one outcome; client failures and panics become
    /// data, never errors.
    pub async fn invoke(&self, index: usize, spec: &RequestSpec) -> RequestOutcome {
        let start = Instant::now();
        let max_attempts = self.policy.max_attempts();
        let mut state = Attempt::Running { attempt: 1 };
        let (result, attempts) = loop {
            state = match state {
                Attempt::Running { attempt } => match self.attempt_once(spec.clone()).await {
                    Ok(text) => Attempt::Succeeded { attempt, text },
                    Err(err) => {
                        hive_obs::record_failure(err.kind().as_str());
                        if attempt < max_attempts {
                            tracing::debug!(target: "invoker", index, attempt, "attempt failed, will retry: {err}");
                            Attempt::Backoff { attempt }
                        } else {
                            Attempt::Exhausted { attempt, err }
                        }
                    }
                },
                Attempt::Backoff { attempt } => {
                    time::sleep(self.policy.backoff(attempt)).await;
                    Attempt::Running { attempt: attempt + 1 }
                }
                Attempt::Succeeded { attempt, text } => break (Ok(text), attempt),
                Attempt::Exhausted { attempt, err } => break (Err(err), attempt),
            };
        };

        let latency = start.elapsed().as_secs_f64();
        hive_obs::observe_latency(latency);
        match result {
            Ok(text) => RequestOutcome::succeeded(index, latency, attempts, text),
            Err(err) => {
                tracing::warn!(target: "invoker", index, attempts, "request failed: {err}");
                RequestOutcome::failed(index, latency, attempts, &err)
            }
        }
    }

    /// One bounded call on an owned copy of the request. The call runs in its
    /// own task so a panicking client surfaces as `Unexpected`.
    async fn attempt_once(&self, payload: RequestSpec) -> Result<String, ClientError> {
        hive_obs::record_attempt();
        let client = self.client.clone();
        let options = self.options.clone();
        let mut call = AbortOnDrop(tokio::spawn(async move { client.send(&payload.topic, &options).await }));
        match time::timeout(self.policy.timeout, &mut call.0).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) if join.is_panic() => Err(ClientError::Unexpected(panic_message(join.into_panic()))),
            Ok(Err(join)) => Err(ClientError::Unexpected(join.to_string())),
            Err(_) => Err(ClientError::Timeout),
        }
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) { self.0.abort() }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return format!("panic: {s}");
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return format!("panic: {s}");
    }
    "panic with non-string payload".into()
}
