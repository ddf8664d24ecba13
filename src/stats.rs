//! Statistical reduction of latency samples.
//!
//! Raw round-trip samples are noisy: a single retransmit or scheduler stall
//! can dominate a small sample set. The reducer trims the single minimum and
//! single maximum sample before averaging, then reports the mean absolute
//! deviation of the trimmed set as jitter.

/// Reduced latency figures, rounded to whole milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    /// Trimmed mean of the samples in milliseconds
    pub latency_ms: f64,
    /// Mean absolute deviation from the trimmed mean in milliseconds
    pub jitter_ms: f64,
}

/// Mean of the samples after dropping the single minimum and single maximum.
///
/// Returns `None` when fewer than 3 samples are supplied, since the trimmed
/// set would be empty.
pub fn trimmed_mean(samples: &[f64]) -> Option<f64> {
    let trimmed = trim(samples)?;
    Some(trimmed.iter().sum::<f64>() / trimmed.len() as f64)
}

/// Mean absolute deviation of the samples from the given mean.
pub fn mean_absolute_deviation(samples: &[f64], mean: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    samples.iter().map(|sample| (sample - mean).abs()).sum::<f64>()
        / samples.len() as f64
}

/// Reduce an unordered set of round-trip samples (in milliseconds) to
/// latency and jitter figures.
///
/// Sorts ascending, drops the single minimum and single maximum, takes the
/// arithmetic mean of the rest as latency and the mean absolute deviation
/// from that mean as jitter. Both are rounded to the nearest whole
/// millisecond. Returns `None` for fewer than 3 samples.
pub fn reduce_latency(samples: &[f64]) -> Option<LatencyStats> {
    let trimmed = trim(samples)?;

    let mean = trimmed.iter().sum::<f64>() / trimmed.len() as f64;
    let jitter = mean_absolute_deviation(&trimmed, mean);

    Some(LatencyStats { latency_ms: mean.round(), jitter_ms: jitter.round() })
}

/// Sorted copy of the samples with the single min and max removed.
fn trim(samples: &[f64]) -> Option<Vec<f64>> {
    if samples.len() < 3 {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    Some(sorted[1..sorted.len() - 1].to_vec())
}
