use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Percentile ranks reported for every batch size.
pub const PERCENTILE_RANKS: [u32; 6] = [10, 25, 50, 75, 90, 99];

/// Sampling parameters sent with every generation call.
#[derive(Debug, Clone, Serialize)]
pub struct SamplingParams {
    pub n: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: usize,
    pub ignore_eos: bool,
    pub use_beam_search: bool,
    pub detokenize: bool,
}

/// Everything a latency sweep needs, fixed for the whole run.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkConfig {
    pub input_len: usize,
    pub output_len: usize,
    pub bs_start: usize,
    pub bs_end: usize,
    pub bs_step: usize,
    pub num_iters_warmup: usize,
    pub num_iters: usize,
    pub sampling: SamplingParams,
    pub profile: bool,
    pub profiler_dir: Option<PathBuf>,
    pub output_json: String,
    pub settle_delay_secs: u64,
    pub pytorch_format: bool,
}

impl BenchmarkConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

/// Latency results for one batch size, as written to `<base><batch_size>.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchResult {
    pub batch_size: usize,
    pub avg_latency: f64,
    pub latencies: Vec<f64>,
    /// Keyed by rank as a string ("10", "50", ...).
    pub percentiles: BTreeMap<String, f64>,
}

/// One row of the latency summary table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LatencyRow {
    pub batch_size: usize,
    pub avg_latency: Option<f64>,
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p99: Option<f64>,
}

/// Per-invocation audit record written to the history directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySnapshot {
    pub timestamp: String,
    pub results: Vec<LatencyRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeseriesEntry {
    pub timestamp: String,
    #[serde(flatten)]
    pub metrics: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigHistory {
    pub input_len: u64,
    pub output_len: u64,
    pub total_tokens: u64,
    pub history: Vec<TimeseriesEntry>,
}

/// Keyed by `"<input_len>_<output_len>"`.
pub type HistoryStore = BTreeMap<String, ConfigHistory>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConcurrencyPoint {
    pub timestamp: String,
    pub max_concurrency: u64,
    pub total_token_throughput: Option<f64>,
    pub tokens_per_sec_user: f64,
    pub mean_tpot_ms: f64,
    pub mean_ttft_ms: Option<f64>,
    pub cost_per_million_toks: Option<f64>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// ISO-8601 UTC with microseconds and a trailing `Z`.
pub fn iso_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Filename-safe timestamp whose lexical order matches chronological order.
pub fn compact_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%S%.6fZ").to_string()
}
