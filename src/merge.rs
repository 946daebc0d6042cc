use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::Value;
use tracing::warn;

use crate::discover;
use crate::store;

pub const DEFAULT_HISTORY_DIR: &str = "benchmark_history";
pub const DEFAULT_OUTPUT: &str = "data.json";

#[derive(Debug, Clone)]
pub struct MergeConfig {
    pub history_dir: PathBuf,
    pub output: PathBuf,
}

/// Parse every history file in name order. Files that fail to read or
/// parse are logged and left out.
pub fn merge_points(history_dir: &Path) -> Result<Vec<Value>> {
    let mut merged = Vec::new();
    for path in discover::find_json_files(history_dir, "")? {
        match store::read_json::<Value>(&path) {
            Ok(value) => merged.push(value),
            Err(err) => warn!(path = %path.display(), "skipping history file: {:#}", err),
        }
    }
    Ok(merged)
}

pub fn run(config: &MergeConfig) -> Result<Vec<Value>> {
    let merged = merge_points(&config.history_dir)?;
    store::write_json(&config.output, &merged, 2)?;
    println!(
        "Merged {} data points into {}",
        merged.len(),
        config.output.display()
    );
    Ok(merged)
}
