use hive_backend::{ClientError, ErrorKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    pub message: String,
}

impl From<&ClientError> for OutcomeError {
    fn from(err: &ClientError) -> Self {
        Self { kind: err.kind(), code: err.code(), message: err.to_string() }
    }
}

/// Terminal result for one corpus item at one level.
///
/// `latency` is seconds from the start of the first attempt to the terminal
/// state, retries and backoff included. `error` is set iff `success` is false
/// and `response` iff it is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub index: usize,
    pub latency: f64,
    pub success: bool,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl RequestOutcome {
    pub fn succeeded(index: usize, latency: f64, attempts: u32, response: String) -> Self {
        Self { index, latency, success: true, attempts, error: None, response: Some(response) }
    }

    pub fn failed(index: usize, latency: f64, attempts: u32, err: &ClientError) -> Self {
        Self { index, latency, success: false, attempts, error: Some(err.into()), response: None }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> { self.error.as_ref().map(|e| e.kind) }
}
