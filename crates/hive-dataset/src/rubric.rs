use std::collections::HashMap;
use std::sync::Mutex;

use hive_common::corpus::{CheckPoint, MatchingMethod, RequestSpec};
use once_cell::sync::Lazy;
use regex::Regex;

/// Compiled rubric patterns keyed by source text. `None` marks a pattern that
/// failed to compile.
static PATTERNS: Lazy<Mutex<HashMap<String, Option<Regex>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Sum of the weights of every checkpoint that matches `response`.
pub fn score(spec: &RequestSpec, response: &str) -> f64 {
    spec.checkpoints.iter().filter(|c| matches(c, response)).map(|c| c.score).sum()
}

pub fn matches(checkpoint: &CheckPoint, response: &str) -> bool {
    match checkpoint.matching_method {
        MatchingMethod::Normal => response.contains(checkpoint.keyword.as_str()),
        // an uncompilable pattern never matches
        MatchingMethod::Regex => compiled(&checkpoint.keyword).is_some_and(|re| re.is_match(response)),
    }
}

fn compiled(pattern: &str) -> Option<Regex> {
    let mut cache = match PATTERNS.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(entry) = cache.get(pattern) {
        return entry.clone();
    }
    let re = Regex::new(pattern).ok();
    if re.is_none() {
        tracing::debug!(target: "dataset", pattern, "rubric pattern does not compile");
    }
    cache.insert(pattern.to_string(), re.clone());
    re
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached(pattern: &str) -> Option<bool> {
        PATTERNS.lock().unwrap().get(pattern).map(Option::is_some)
    }

    #[test]
    fn patterns_compile_once_and_are_reused() {
        let cp = CheckPoint { matching_method: MatchingMethod::Regex, keyword: r"cache-\d{3}".into(), score: 1.0 };
        assert_eq!(cached(&cp.keyword), None);
        assert!(matches(&cp, "hit cache-123"));
        assert_eq!(cached(&cp.keyword), Some(true));
        assert!(!matches(&cp, "cache-12"));
        assert_eq!(PATTERNS.lock().unwrap().keys().filter(|k| k.as_str() == cp.keyword).count(), 1);
    }

    #[test]
    fn broken_pattern_is_remembered_and_never_matches() {
        let cp = CheckPoint { matching_method: MatchingMethod::Regex, keyword: "unclosed-cache-(".into(), score: 1.0 };
        assert!(!matches(&cp, "unclosed-cache-("));
        assert_eq!(cached(&cp.keyword), Some(false));
        assert!(!matches(&cp, "anything"));
    }
}
