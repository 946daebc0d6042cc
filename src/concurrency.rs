use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::discover;
use crate::errors::PerfCiError;
use crate::store;
use crate::types::{ConcurrencyPoint, iso_timestamp};

pub const DATA_FILENAME: &str = "max_concurrency_benchmark_data.json";

const SECONDS_PER_HOUR: f64 = 3600.0;

#[derive(Debug, Clone)]
pub struct ConcurrencyConfig {
    pub input_dir: PathBuf,
    pub db_dir: PathBuf,
    /// GPU price in USD per hour used for the cost metric.
    pub price_per_hour: f64,
}

#[derive(Debug)]
pub struct ConcurrencyOutput {
    pub points: Vec<ConcurrencyPoint>,
    pub output_path: PathBuf,
}

/// Tokens per second seen by a single user; 0 for a non-positive TPOT.
pub fn tokens_per_sec_user(mean_tpot_ms: f64) -> f64 {
    if mean_tpot_ms > 0.0 {
        1000.0 / mean_tpot_ms
    } else {
        0.0
    }
}

/// USD per million tokens at `total_token_throughput` tokens/s.
pub fn cost_per_million_tokens(price_per_hour: f64, total_token_throughput: f64) -> Option<f64> {
    if total_token_throughput > 0.0 {
        Some(price_per_hour * 1_000_000.0 / (total_token_throughput * SECONDS_PER_HOUR))
    } else {
        None
    }
}

/// Result files named `concurrency_<C>*.json`, sorted by name.
pub fn find_results(dir: &Path) -> Result<Vec<PathBuf>> {
    let files = discover::find_json_files(dir, "concurrency_")?;
    Ok(files
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .and_then(discover::parse_concurrency)
                .is_some()
        })
        .collect())
}

pub fn point_from(
    path: &Path,
    data: &Value,
    price_per_hour: f64,
    timestamp: &str,
) -> Result<Option<ConcurrencyPoint>> {
    if !data.is_object() {
        return Err(PerfCiError::ParseError {
            path: path.to_path_buf(),
            detail: "expected a JSON object".to_string(),
        }
        .into());
    }

    let max_concurrency = data.get("max_concurrency").and_then(Value::as_u64).or_else(|| {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(discover::parse_concurrency)
    });
    let Some(max_concurrency) = max_concurrency else {
        return Ok(None);
    };

    let total_token_throughput = data.get("total_token_throughput").and_then(Value::as_f64);
    let mean_tpot_ms = data
        .get("mean_tpot_ms")
        .and_then(Value::as_f64)
        .unwrap_or(1.0);

    Ok(Some(ConcurrencyPoint {
        timestamp: timestamp.to_string(),
        max_concurrency,
        total_token_throughput,
        tokens_per_sec_user: tokens_per_sec_user(mean_tpot_ms),
        mean_tpot_ms,
        mean_ttft_ms: data.get("mean_ttft_ms").and_then(Value::as_f64),
        cost_per_million_toks: total_token_throughput
            .and_then(|t| cost_per_million_tokens(price_per_hour, t)),
    }))
}

/// Collect every concurrency level and overwrite the output file.
pub fn run(config: &ConcurrencyConfig, now: DateTime<Utc>) -> Result<ConcurrencyOutput> {
    let timestamp = iso_timestamp(now);

    let mut points = Vec::new();
    for path in find_results(&config.input_dir)? {
        let data: Value = store::read_json(&path)?;
        match point_from(&path, &data, config.price_per_hour, &timestamp)? {
            Some(point) => points.push(point),
            None => debug!(path = %path.display(), "skipping file without concurrency level"),
        }
    }
    points.sort_by_key(|p| p.max_concurrency);

    let output_path = config.db_dir.join(DATA_FILENAME);
    store::write_json(&output_path, &points, 2)?;

    println!(
        "Saved {} concurrency sweep results to {}",
        points.len(),
        output_path.display()
    );

    Ok(ConcurrencyOutput {
        points,
        output_path,
    })
}
