use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use crate::discover;
use crate::display::{self, FloatFormat};
use crate::errors::PerfCiError;
use crate::store;
use crate::types::{LatencyRow, LatencySnapshot, compact_timestamp, iso_timestamp};

pub const TABLE_FILENAME: &str = "table_markdown.md";
pub const HISTORY_SUBDIR: &str = "benchmark_history";

#[derive(Debug, Clone)]
pub struct LatencyTableConfig {
    /// e.g. `results/latency_bs`; matches `results/latency_bs*.json`.
    pub base_filename: String,
    pub output_dir: PathBuf,
}

#[derive(Debug)]
pub struct LatencyTableOutput {
    pub files: Vec<PathBuf>,
    pub rows: Vec<LatencyRow>,
    pub table_path: PathBuf,
    pub snapshot_path: PathBuf,
}

/// Build one row per result file, sorted by batch size.
pub fn collect_rows(files: &[PathBuf], prefix: &str) -> Result<Vec<LatencyRow>> {
    let mut rows = Vec::with_capacity(files.len());
    for path in files {
        let data: Value = store::read_json(path)?;
        rows.push(row_from(path, prefix, &data)?);
    }
    rows.sort_by_key(|r| r.batch_size);
    Ok(rows)
}

fn row_from(path: &Path, prefix: &str, data: &Value) -> Result<LatencyRow> {
    let batch_size = data
        .get("batch_size")
        .and_then(Value::as_u64)
        .or_else(|| discover::batch_size_from_name(path, prefix))
        .ok_or_else(|| PerfCiError::BatchSizeNotFound {
            path: path.to_path_buf(),
        })?;

    let percentile = |rank: &str| {
        data.get("percentiles")
            .and_then(|p| p.get(rank))
            .and_then(Value::as_f64)
    };

    Ok(LatencyRow {
        batch_size: batch_size as usize,
        avg_latency: data.get("avg_latency").and_then(Value::as_f64),
        p50: percentile("50"),
        p90: percentile("90"),
        p99: percentile("99"),
    })
}

pub fn render(rows: &[LatencyRow]) -> Result<String> {
    Ok(display::render_markdown_table(
        &display::to_rows(rows)?,
        FloatFormat::Plain,
    ))
}

/// Find latency results, write the markdown table and a timestamped snapshot.
pub fn run(config: &LatencyTableConfig, now: DateTime<Utc>) -> Result<LatencyTableOutput> {
    std::fs::create_dir_all(&config.output_dir).map_err(|source| PerfCiError::WriteError {
        path: config.output_dir.clone(),
        source,
    })?;

    let files = discover::find_latency_results(&config.base_filename)?;
    print!(
        "{}",
        display::format_found_files("latency benchmark results", &files)
    );

    let (_, prefix) = discover::split_base(&config.base_filename);
    let rows = collect_rows(&files, &prefix)?;

    let table_path = config.output_dir.join(TABLE_FILENAME);
    store::write_bytes(&table_path, render(&rows)?.as_bytes())?;

    let snapshot = LatencySnapshot {
        timestamp: iso_timestamp(now),
        results: rows.clone(),
    };
    let snapshot_path = config
        .output_dir
        .join(HISTORY_SUBDIR)
        .join(format!("{}.json", compact_timestamp(now)));
    store::write_json(&snapshot_path, &snapshot, 2)?;

    info!(rows = rows.len(), snapshot = %snapshot_path.display(), "wrote latency snapshot");
    println!("\nSummary markdown written to {}", table_path.display());

    Ok(LatencyTableOutput {
        files,
        rows,
        table_path,
        snapshot_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-18T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn write_result(dir: &Path, name: &str, body: Value) {
        fs::write(dir.join(name), body.to_string()).unwrap();
    }

    fn latency_body(avg: f64) -> Value {
        json!({
            "avg_latency": avg,
            "latencies": [avg],
            "percentiles": {"10": avg, "25": avg, "50": avg, "75": avg, "90": avg, "99": avg}
        })
    }

    #[test]
    fn rows_sorted_numerically_by_batch_size() {
        let tmp = assert_fs::TempDir::new().unwrap();
        write_result(tmp.path(), "latency_bs16.json", latency_body(1.6));
        write_result(tmp.path(), "latency_bs2.json", latency_body(0.2));
        write_result(tmp.path(), "latency_bs8.json", latency_body(0.8));

        let config = LatencyTableConfig {
            base_filename: format!("{}/latency_bs", tmp.path().display()),
            output_dir: tmp.path().join("out"),
        };
        let output = run(&config, fixed_now()).unwrap();

        let sizes: Vec<usize> = output.rows.iter().map(|r| r.batch_size).collect();
        assert_eq!(sizes, vec![2, 8, 16]);
        assert_eq!(output.rows[0].p90, Some(0.2));

        let table = fs::read_to_string(&output.table_path).unwrap();
        assert!(table.starts_with("| batch_size | avg_latency |"));
        assert_eq!(table.lines().count(), 5);

        let snapshot: LatencySnapshot = store::read_json(&output.snapshot_path).unwrap();
        assert_eq!(snapshot.timestamp, "2026-02-18T00:00:00.000000Z");
        assert_eq!(snapshot.results, output.rows);
        assert!(output.snapshot_path.ends_with("benchmark_history/20260218T000000.000000Z.json"));
    }

    #[test]
    fn embedded_batch_size_wins_over_filename() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let mut body = latency_body(1.0);
        body["batch_size"] = json!(64);
        write_result(tmp.path(), "latency_bs1.json", body);

        let files = discover::find_latency_results(&format!("{}/latency_bs", tmp.path().display()))
            .unwrap();
        let rows = collect_rows(&files, "latency_bs").unwrap();
        assert_eq!(rows[0].batch_size, 64);
    }

    #[test]
    fn missing_fields_become_none() {
        let tmp = assert_fs::TempDir::new().unwrap();
        write_result(tmp.path(), "latency_bs4.json", json!({"avg_latency": 2.0}));

        let files = vec![tmp.path().join("latency_bs4.json")];
        let rows = collect_rows(&files, "latency_bs").unwrap();
        assert_eq!(rows[0].avg_latency, Some(2.0));
        assert_eq!(rows[0].p50, None);
        assert_eq!(rows[0].p99, None);
    }

    #[test]
    fn filename_without_batch_size_fails() {
        let tmp = assert_fs::TempDir::new().unwrap();
        write_result(tmp.path(), "latency_bs.json", latency_body(1.0));

        let files = vec![tmp.path().join("latency_bs.json")];
        let err = collect_rows(&files, "latency_bs").unwrap_err();
        assert!(err.to_string().contains("Batch size not found"));

        // Digits inside the prefix are not a batch size.
        write_result(tmp.path(), "llama3_bs.json", latency_body(1.0));
        let base = format!("{}/llama3_bs", tmp.path().display());
        let files = discover::find_latency_results(&base).unwrap();
        assert_eq!(files.len(), 1);
        let err = collect_rows(&files, "llama3_bs").unwrap_err();
        assert!(err.to_string().contains("Batch size not found"));
    }

    #[test]
    fn no_matches_still_writes_outputs() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let config = LatencyTableConfig {
            base_filename: format!("{}/latency_bs", tmp.path().display()),
            output_dir: tmp.path().join("out"),
        };
        let output = run(&config, fixed_now()).unwrap();
        assert!(output.rows.is_empty());
        assert!(output.table_path.exists());
        assert!(output.snapshot_path.exists());
    }
}
