use std::path::{Path, PathBuf};

use hive_common::corpus::{CheckPoint, MatchingMethod, RequestSpec};
use serde::Deserialize;
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::{DatasetError, REWARD_SUFFIX};

#[derive(Deserialize)]
struct RawDataset {
    #[serde(default)]
    topic: String,
    #[serde(default)]
    checkpoint: Vec<Value>,
    #[serde(default)]
    matchingmethod: Vec<String>,
}

/// All reward files under `dir`, sorted by path.
pub fn reward_files(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    if !dir.is_dir() {
        return Err(DatasetError::MissingDir(dir.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| DatasetError::Io {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf()),
            source: e.into(),
        })?;
        let is_reward = entry.file_name().to_str().is_some_and(|n| n.ends_with(REWARD_SUFFIX));
        if entry.file_type().is_file() && is_reward {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

pub fn load_dir(dir: &Path) -> Result<Vec<RequestSpec>, DatasetError> {
    let files = reward_files(dir)?;
    let specs = files.iter().map(|f| load_file(f)).collect::<Result<Vec<_>, _>>()?;
    tracing::info!(target: "dataset", "loaded {} request specs from {}", specs.len(), dir.display());
    Ok(specs)
}

pub fn load_file(path: &Path) -> Result<RequestSpec, DatasetError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| DatasetError::Io { path: path.to_path_buf(), source })?;
    let raw: RawDataset = serde_json::from_str(&text)
        .map_err(|source| DatasetError::Json { path: path.to_path_buf(), source })?;

    let mut checkpoints = Vec::with_capacity(raw.checkpoint.len());
    for (idx, item) in raw.checkpoint.iter().enumerate() {
        let (keyword, score) = single_entry(item)
            .ok_or_else(|| DatasetError::invalid(path, format!("invalid checkpoint item {}: {item}", idx + 1)))?;
        let method = match raw.matchingmethod.get(idx) {
            Some(m) => parse_method(m)
                .ok_or_else(|| DatasetError::invalid(path, format!("unknown matching method {m:?}")))?,
            None => MatchingMethod::Normal,
        };
        checkpoints.push(CheckPoint { matching_method: method, keyword, score });
    }

    Ok(RequestSpec { topic: raw.topic, checkpoints, source: Some(path.to_path_buf()) })
}

/// `{"keyword": 0.5}` -> `("keyword", 0.5)`.
pub(crate) fn single_entry(item: &Value) -> Option<(String, f64)> {
    let obj: &Map<String, Value> = item.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    let (k, v) = obj.iter().next()?;
    Some((k.clone(), v.as_f64()?))
}

pub(crate) fn parse_method(text: &str) -> Option<MatchingMethod> {
    match text {
        "normal" => Some(MatchingMethod::Normal),
        "regex" => Some(MatchingMethod::Regex),
        _ => None,
    }
}
