pub type Result<T> = core::result::Result<T, HiveError>;

#[derive(thiserror::Error, Debug)]
pub enum HiveError {
    #[error("corpus is empty")]
    EmptyCorpus,
    #[error("invalid config: {0}")]
    Config(String),
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Message(String),
}

pub mod config {
    use serde::Deserialize;
    use std::env;
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::{HiveError, Result};

    pub const DEFAULT_LEVELS: [usize; 8] = [10, 20, 40, 80, 160, 320, 640, 1280];

    #[derive(Debug, Clone, Deserialize)]
    #[serde(default)]
    pub struct BenchConfig {
        pub dataset_dir: PathBuf,
        pub model: String,
        pub base_url: String,
        pub api_key: Option<String>,
        pub timeout_secs: f64,
        pub max_retries: u32,
        pub backoff_base_secs: f64,
        pub concurrency_levels: Vec<usize>,
        pub output: PathBuf,
        pub system_prompt: String,
        pub prefix: String,
        pub suffix: String,
        pub max_tokens: u32,
        pub top_k: u32,
        pub enable_thinking: bool,
    }

    impl Default for BenchConfig {
        fn default() -> Self {
            Self {
                dataset_dir: PathBuf::from("rewards"),
                model: "hive".into(),
                base_url: "http://127.0.0.1:8080/v1".into(),
                api_key: None,
                timeout_secs: 120.0,
                max_retries: 1,
                backoff_base_secs: 1.0,
                concurrency_levels: DEFAULT_LEVELS.to_vec(),
                output: PathBuf::from("stress_report.json"),
                system_prompt: "You are a helpful assistant.".into(),
                prefix: String::new(),
                suffix: String::new(),
                max_tokens: 8192,
                top_k: 20,
                enable_thinking: false,
            }
        }
    }

    impl BenchConfig {
        /// Reads `HIVE_CONFIG` (YAML) if set, otherwise defaults, then applies
        /// environment overrides on top.
        pub fn load() -> Result<Self> {
            let mut cfg = match env::var("HIVE_CONFIG") {
                Ok(path) => {
                    let text = std::fs::read_to_string(&path)
                        .map_err(|source| HiveError::Io { path: path.clone(), source })?;
                    Self::from_yaml_str(&text)?
                }
                Err(_) => Self::default(),
            };
            cfg.apply_overrides(|key| env::var(key).ok());
            Ok(cfg)
        }

        pub fn from_yaml_str(text: &str) -> Result<Self> {
            serde_yaml::from_str(text).map_err(|e| HiveError::Config(e.to_string()))
        }

        pub fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, get: F) {
            if let Some(v) = get("HIVE_DATASET_DIR") { self.dataset_dir = PathBuf::from(v); }
            if let Some(v) = get("HIVE_MODEL") { self.model = v; }
            if let Some(v) = get("OPENAI_BASE_URL") { self.base_url = v; }
            if let Some(v) = get("OPENAI_API_KEY") { self.api_key = Some(v); }
            if let Some(v) = get("HIVE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) { self.timeout_secs = v; }
            if let Some(v) = get("HIVE_MAX_RETRIES").and_then(|v| v.parse().ok()) { self.max_retries = v; }
            if let Some(v) = get("HIVE_BACKOFF_BASE_SECS").and_then(|v| v.parse().ok()) { self.backoff_base_secs = v; }
            if let Some(v) = get("HIVE_LEVELS").and_then(|v| parse_levels(&v)) { self.concurrency_levels = v; }
            if let Some(v) = get("HIVE_OUTPUT") { self.output = PathBuf::from(v); }
        }

        pub fn validate(&self) -> Result<()> {
            if self.concurrency_levels.is_empty() {
                return Err(HiveError::Config("no concurrency levels configured".into()));
            }
            if self.concurrency_levels.contains(&0) {
                return Err(HiveError::Config("concurrency level must be at least 1".into()));
            }
            if !(self.timeout_secs.is_finite() && self.timeout_secs > 0.0) {
                return Err(HiveError::Config(format!("timeout must be positive, got {}", self.timeout_secs)));
            }
            if !(self.backoff_base_secs.is_finite() && self.backoff_base_secs >= 0.0) {
                return Err(HiveError::Config(format!(
                    "backoff base must be non-negative, got {}",
                    self.backoff_base_secs
                )));
            }
            Ok(())
        }

        pub fn timeout(&self) -> Duration { Duration::from_secs_f64(self.timeout_secs) }

        pub fn backoff_base(&self) -> Duration { Duration::from_secs_f64(self.backoff_base_secs) }
    }

    /// Parses `"10,20, 40"`. Returns `None` if any entry is not an integer.
    pub fn parse_levels(text: &str) -> Option<Vec<usize>> {
        text.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse().ok())
            .collect()
    }
}

pub mod corpus {
    use serde::{Deserialize, Serialize};
    use std::path::PathBuf;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum MatchingMethod {
        #[default]
        Normal,
        Regex,
    }

    /// One weighted rubric entry: `score` is awarded when `keyword` matches.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct CheckPoint {
        pub matching_method: MatchingMethod,
        pub keyword: String,
        pub score: f64,
    }

    /// One corpus entry. Read-only once loaded; the harness clones the payload
    /// per attempt.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct RequestSpec {
        pub topic: String,
        pub checkpoints: Vec<CheckPoint>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub source: Option<PathBuf>,
    }

    impl RequestSpec {
        pub fn new(topic: impl Into<String>) -> Self {
            Self { topic: topic.into(), checkpoints: Vec::new(), source: None }
        }
    }
}
