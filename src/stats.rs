use std::collections::BTreeMap;

use anyhow::Result;

use crate::errors::PerfCiError;
use crate::types::{BatchResult, PERCENTILE_RANKS};

pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Linear-interpolation percentile over an ascending-sorted slice.
///
/// The rank `p / 100 * (n - 1)` is split into its floor and ceiling order
/// statistics and the result interpolated between them.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Aggregate raw latencies into the record written for one batch size.
///
/// `latencies` keeps the original measurement order.
pub fn summarize(batch_size: usize, latencies: Vec<f64>) -> Result<BatchResult> {
    let avg_latency = mean(&latencies).ok_or(PerfCiError::NoSamples)?;

    let mut sorted = latencies.clone();
    sorted.sort_by(f64::total_cmp);

    let mut percentiles = BTreeMap::new();
    for rank in PERCENTILE_RANKS {
        if let Some(value) = percentile_sorted(&sorted, f64::from(rank)) {
            percentiles.insert(rank.to_string(), value);
        }
    }

    Ok(BatchResult {
        batch_size,
        avg_latency,
        latencies,
        percentiles,
    })
}
