//! `*.hive-reward.json` corpus loading, linting and rubric scoring.

pub mod loader;
pub mod rubric;
pub mod validate;

pub use loader::{load_dir, load_file, reward_files};
pub use rubric::score;
pub use validate::validate_file;

use std::path::PathBuf;

pub const REWARD_SUFFIX: &str = ".hive-reward.json";

#[derive(thiserror::Error, Debug)]
pub enum DatasetError {
    #[error("dataset directory not found: {0}")]
    MissingDir(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

impl DatasetError {
    pub(crate) fn invalid(path: &std::path::Path, reason: impl Into<String>) -> Self {
        DatasetError::Invalid { path: path.to_path_buf(), reason: reason.into() }
    }
}

impl From<DatasetError> for hive_common::HiveError {
    fn from(e: DatasetError) -> Self { hive_common::HiveError::Message(e.to_string()) }
}
