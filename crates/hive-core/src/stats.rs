//! Latency reduction for a level report.
//!
//! Percentiles use the index `floor(n * q)` into the ascending sample, capped
//! at the last element. p99 needs at least [`P99_MIN_SAMPLES`] samples; below
//! that it degrades to the maximum observed latency.

pub const P99_MIN_SAMPLES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub mean: f64,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub max: f64,
}

/// Value at the `q` split of an ascending sample.
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = ((sorted.len() as f64) * q).floor() as usize;
    sorted.get(idx.min(sorted.len() - 1)).copied()
}

/// `None` when there are no samples.
pub fn summarize(latencies: &[f64]) -> Option<LatencySummary> {
    let mut sorted = latencies.to_vec();
    sorted.sort_by(f64::total_cmp);
    let max = *sorted.last()?;
    let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
    let p99 = if sorted.len() >= P99_MIN_SAMPLES { percentile(&sorted, 0.99)? } else { max };
    Some(LatencySummary { mean, p50: percentile(&sorted, 0.5)?, p90: percentile(&sorted, 0.9)?, p99, max })
}

/// `count / duration`, or 0 for an empty or zero-length window.
pub fn throughput(count: usize, duration_secs: f64) -> f64 {
    if count == 0 || duration_secs.is_nan() || duration_secs <= 0.0 {
        return 0.0;
    }
    count as f64 / duration_secs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_caps_to_last_index() {
        assert_eq!(percentile(&[1.0, 2.0], 0.99), Some(2.0));
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn throughput_guards_zero_duration() {
        assert_eq!(throughput(5, 0.0), 0.0);
        assert_eq!(throughput(0, 3.0), 0.0);
        assert_eq!(throughput(6, 3.0), 2.0);
    }
}
