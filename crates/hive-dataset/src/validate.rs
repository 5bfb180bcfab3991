use std::path::Path;

use regex::Regex;
use serde_json::Value;

use crate::loader::parse_method;
use crate::DatasetError;

const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Lints one reward file. Stricter than [`crate::load_file`]: weights must lie
/// in `[-1, 1]` and sum to 1, and every regex checkpoint must compile.
pub fn validate_file(path: &Path) -> Result<(), DatasetError> {
    if !path.exists() {
        return Err(DatasetError::invalid(path, "file does not exist"));
    }
    let text = std::fs::read_to_string(path)
        .map_err(|source| DatasetError::Io { path: path.to_path_buf(), source })?;
    let data: Value = serde_json::from_str(&text)
        .map_err(|source| DatasetError::Json { path: path.to_path_buf(), source })?;
    validate_value(path, &data)
}

pub(crate) fn validate_value(path: &Path, data: &Value) -> Result<(), DatasetError> {
    let Some(root) = data.as_object() else {
        return Err(DatasetError::invalid(path, "root must be an object"));
    };

    let missing: Vec<&str> = ["topic", "checkpoint"].into_iter().filter(|k| !root.contains_key(*k)).collect();
    if !missing.is_empty() {
        return Err(DatasetError::invalid(path, format!("missing required fields: {}", missing.join(", "))));
    }
    if !root["topic"].is_string() {
        return Err(DatasetError::invalid(path, "'topic' must be a string"));
    }
    let Some(checkpoints) = root["checkpoint"].as_array() else {
        return Err(DatasetError::invalid(path, "'checkpoint' must be an array"));
    };
    if checkpoints.is_empty() {
        return Err(DatasetError::invalid(path, "'checkpoint' must not be empty"));
    }
    let methods = root.get("matchingmethod").and_then(Value::as_array);

    let mut total = 0.0;
    for (idx, item) in checkpoints.iter().enumerate() {
        let n = idx + 1;
        let Some(obj) = item.as_object() else {
            return Err(DatasetError::invalid(path, format!("checkpoint {n} must be an object")));
        };
        if obj.len() != 1 {
            return Err(DatasetError::invalid(path, format!("checkpoint {n} must hold exactly one key")));
        }
        let Some((keyword, value)) = obj.iter().next() else { continue };
        let Some(weight) = value.as_f64() else {
            return Err(DatasetError::invalid(path, format!("checkpoint {n} value must be a number")));
        };
        if !(-1.0..=1.0).contains(&weight) {
            return Err(DatasetError::invalid(path, format!("checkpoint {n} weight {weight} is outside [-1, 1]")));
        }
        total += weight;

        let method = match methods.and_then(|m| m.get(idx)) {
            None => "normal",
            Some(Value::String(m)) => m.as_str(),
            Some(other) => {
                return Err(DatasetError::invalid(path, format!("matching method {n} must be a string, got {other}")))
            }
        };
        if parse_method(method).is_none() {
            return Err(DatasetError::invalid(path, format!("unknown matching method {method:?} for checkpoint {n}")));
        }
        if method == "regex" {
            if let Err(e) = Regex::new(keyword) {
                return Err(DatasetError::invalid(path, format!("checkpoint {n} regex does not compile: {e}")));
            }
        }
    }

    if (total - 1.0).abs() > WEIGHT_TOLERANCE * total.abs().max(1.0) {
        return Err(DatasetError::invalid(path, format!("checkpoint weights must sum to 1, got {total}")));
    }
    Ok(())
}
