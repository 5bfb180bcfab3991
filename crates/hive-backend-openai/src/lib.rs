//! OpenAI-compatible chat-completions client.

use hive_backend::{ChatClient, ChatOptions, ClientError};
use hive_common::config::BenchConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, PartialEq)]
pub struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct TemplateKwargs {
    pub enable_thinking: bool,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub max_tokens: u32,
    pub top_k: u32,
    pub chat_template_kwargs: TemplateKwargs,
}

impl<'a> ChatRequest<'a> {
    pub fn new(prompt: &'a str, options: &'a ChatOptions) -> Self {
        Self {
            model: &options.model,
            messages: vec![
                ChatMessage { role: "system", content: &options.system_prompt },
                ChatMessage { role: "user", content: prompt },
            ],
            max_tokens: options.max_tokens,
            top_k: options.top_k,
            chat_template_kwargs: TemplateKwargs { enable_thinking: options.enable_thinking },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http: reqwest::Client::new(), base_url, api_key }
    }

    pub fn from_config(cfg: &BenchConfig) -> Self { Self::new(cfg.base_url.clone(), cfg.api_key.clone()) }

    pub fn completions_url(&self) -> String { format!("{}/chat/completions", self.base_url) }
}

fn transport(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        return ClientError::Timeout;
    }
    ClientError::Transport { code: err.status().map(|s| s.as_u16()), message: err.to_string() }
}

impl ChatClient for OpenAiClient {
    async fn send(&self, topic: &str, options: &ChatOptions) -> Result<String, ClientError> {
        let prompt = options.user_prompt(topic);
        let body = ChatRequest::new(&prompt, options);
        let mut req = self.http.post(self.completions_url()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            tracing::debug!(target: "client", %status, "chat request rejected");
            return Err(ClientError::Transport { code: Some(status.as_u16()), message });
        }
        let parsed: ChatResponse = resp.json().await.map_err(transport)?;
        let Some(choice) = parsed.choices.into_iter().next() else {
            return Err(ClientError::Unexpected("response contained no choices".into()));
        };
        Ok(choice.message.content.unwrap_or_default().trim().to_string())
    }

    fn endpoint(&self) -> String { self.base_url.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_generation_options() {
        let options = ChatOptions { model: "qwen".into(), enable_thinking: true, ..ChatOptions::default() };
        let body = serde_json::to_value(ChatRequest::new("hello", &options)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "qwen",
                "messages": [
                    {"role": "system", "content": "You are a helpful assistant."},
                    {"role": "user", "content": "hello"}
                ],
                "max_tokens": 8192,
                "top_k": 20,
                "chat_template_kwargs": {"enable_thinking": true}
            })
        );
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let client = OpenAiClient::new("http://localhost:8000/v1/", None);
        assert_eq!(client.completions_url(), "http://localhost:8000/v1/chat/completions");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let client = OpenAiClient::new("http://127.0.0.1:1/v1", None);
        let err = client.send("x", &ChatOptions::default()).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport { code: None, .. }), "{err:?}");
    }
}
