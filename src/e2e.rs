use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::discover;
use crate::display::{self, FloatFormat, Row};
use crate::errors::PerfCiError;
use crate::store;
use crate::types::{ConfigHistory, HistoryStore, TimeseriesEntry, iso_timestamp};

pub const DATA_FILENAME: &str = "e2e_benchmark_data.json";

/// Fields that clutter the summary table.
pub const HIDDEN_FIELDS: [&str; 8] = [
    "date",
    "endpoint_type",
    "label",
    "completed",
    "tokenizer_id",
    "burstiness",
    "request_goodput",
    "max_concurrency",
];

/// Metrics carried into the timeseries history.
pub const TRACKED_METRICS: [&str; 30] = [
    "total_token_throughput",
    "request_throughput",
    "output_throughput",
    "mean_ttft_ms",
    "median_ttft_ms",
    "std_ttft_ms",
    "p25_ttft_ms",
    "p50_ttft_ms",
    "p75_ttft_ms",
    "p90_ttft_ms",
    "p99_ttft_ms",
    "p99.9_ttft_ms",
    "mean_tpot_ms",
    "median_tpot_ms",
    "std_tpot_ms",
    "p25_tpot_ms",
    "p50_tpot_ms",
    "p75_tpot_ms",
    "p90_tpot_ms",
    "p99_tpot_ms",
    "p99.9_tpot_ms",
    "mean_itl_ms",
    "median_itl_ms",
    "std_itl_ms",
    "p25_itl_ms",
    "p50_itl_ms",
    "p75_itl_ms",
    "p90_itl_ms",
    "p99_itl_ms",
    "p99.9_itl_ms",
];

const LENGTH_FIELDS: [&str; 3] = ["input_len", "output_len", "total_tokens"];

#[derive(Debug, Clone)]
pub struct E2eConfig {
    pub input_dir: PathBuf,
    pub db_dir: PathBuf,
    pub summary_path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct E2eOutput {
    pub rows: Vec<Row>,
    pub history: HistoryStore,
    pub history_path: PathBuf,
    pub table: String,
}

/// Result files named `in_<I>_out_<O>*.json`, sorted by name.
pub fn find_results(dir: &Path) -> Result<Vec<PathBuf>> {
    let files = discover::find_json_files(dir, "in_")?;
    Ok(files
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .and_then(discover::parse_in_out)
                .is_some()
        })
        .collect())
}

/// Embedded `input_len`/`output_len` when both are present, else the file name.
fn lengths(path: &Path, data: &Map<String, Value>) -> Option<(u64, u64)> {
    let embedded = data
        .get("input_len")
        .and_then(Value::as_u64)
        .zip(data.get("output_len").and_then(Value::as_u64));
    embedded.or_else(|| {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(discover::parse_in_out)
    })
}

pub fn display_row(input_len: u64, output_len: u64, data: &Map<String, Value>) -> Row {
    let mut row = Row::new();
    row.insert("input_len".to_string(), Value::from(input_len));
    row.insert("output_len".to_string(), Value::from(output_len));
    row.insert("total_tokens".to_string(), Value::from(input_len + output_len));

    for (key, value) in data {
        if HIDDEN_FIELDS.contains(&key.as_str()) || LENGTH_FIELDS.contains(&key.as_str()) {
            continue;
        }
        row.insert(key.clone(), value.clone());
    }
    row
}

pub fn tracked_metrics(data: &Map<String, Value>) -> Map<String, Value> {
    TRACKED_METRICS
        .iter()
        .filter_map(|key| data.get(*key).map(|v| (key.to_string(), v.clone())))
        .collect()
}

pub fn append_history(
    store: &mut HistoryStore,
    input_len: u64,
    output_len: u64,
    entry: TimeseriesEntry,
) {
    store
        .entry(format!("{}_{}", input_len, output_len))
        .or_insert_with(|| ConfigHistory {
            input_len,
            output_len,
            total_tokens: input_len + output_len,
            history: Vec::new(),
        })
        .history
        .push(entry);
}

/// Build display rows for `files` and append their metrics to `store`.
pub fn process(files: &[PathBuf], store: &mut HistoryStore, timestamp: &str) -> Result<Vec<Row>> {
    let mut rows = Vec::with_capacity(files.len());

    for path in files {
        let data = match store::read_json::<Value>(path)? {
            Value::Object(map) => map,
            _ => {
                return Err(PerfCiError::ParseError {
                    path: path.clone(),
                    detail: "expected a JSON object".to_string(),
                }
                .into());
            }
        };

        let Some((input_len, output_len)) = lengths(path, &data) else {
            debug!(path = %path.display(), "skipping file without input/output lengths");
            continue;
        };

        rows.push(display_row(input_len, output_len, &data));
        append_history(
            store,
            input_len,
            output_len,
            TimeseriesEntry {
                timestamp: timestamp.to_string(),
                metrics: tracked_metrics(&data),
            },
        );
    }

    Ok(rows)
}

pub fn summary_markdown(table: &str, timestamp: &str) -> String {
    format!(
        "# Benchmark Results\n\n{}\n\n**Data added to timeseries at {}**\n",
        table.trim_end(),
        timestamp
    )
}

fn append_summary(path: &Path, text: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| PerfCiError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
    file.write_all(text.as_bytes())
        .map_err(|source| PerfCiError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(())
}

pub fn run(config: &E2eConfig, now: DateTime<Utc>) -> Result<E2eOutput> {
    let timestamp = iso_timestamp(now);
    let history_path = config.db_dir.join(DATA_FILENAME);

    let mut history = store::load_history(&history_path)?;
    debug!(configs = history.len(), path = %history_path.display(), "loaded history");

    let files = find_results(&config.input_dir)?;
    let rows = process(&files, &mut history, &timestamp)?;

    store::write_json(&history_path, &history, 2)?;

    let table = display::render_markdown_table(&rows, FloatFormat::Fixed(2));
    if let Some(summary_path) = &config.summary_path {
        append_summary(summary_path, &summary_markdown(&table, &timestamp))?;
        info!(path = %summary_path.display(), "appended step summary");
    }

    println!(
        "\nTimeseries data updated in {} with {} new entries",
        history_path.display(),
        rows.len()
    );

    Ok(E2eOutput {
        rows,
        history,
        history_path,
        table,
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

    fn serve_result() -> Value {
        json!({
            "date": "20260218-000000",
            "backend": "vllm",
            "label": null,
            "completed": 100,
            "max_concurrency": 8,
            "request_throughput": 4.25,
            "output_throughput": 512.0,
            "total_token_throughput": 640.5,
            "mean_ttft_ms": 31.7,
            "p99.9_itl_ms": 12.0,
            "duration": 23.5
        })
    }

    fn setup(names: &[&str]) -> (assert_fs::TempDir, E2eConfig) {
        let tmp = assert_fs::TempDir::new().unwrap();
        let input_dir = tmp.path().join("results");
        fs::create_dir_all(&input_dir).unwrap();
        for name in names {
            fs::write(input_dir.join(name), serve_result().to_string()).unwrap();
        }
        let config = E2eConfig {
            input_dir,
            db_dir: tmp.path().join("fake_db"),
            summary_path: None,
        };
        (tmp, config)
    }

    #[test]
    fn rows_carry_lengths_and_total_tokens() {
        let (_tmp, config) = setup(&["in_32_out_128.json", "in_64_out_128.json"]);
        let output = run(&config, fixed_now()).unwrap();

        assert_eq!(output.rows.len(), 2);
        assert_eq!(output.rows[0]["input_len"], 32);
        assert_eq!(output.rows[1]["input_len"], 64);
        for row in &output.rows {
            let total = row["input_len"].as_u64().unwrap() + row["output_len"].as_u64().unwrap();
            assert_eq!(row["total_tokens"], total);
        }
    }

    #[test]
    fn display_row_drops_hidden_fields_and_keeps_order() {
        let data = serve_result();
        let row = display_row(32, 128, data.as_object().unwrap());
        let keys: Vec<&str> = row.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "input_len",
                "output_len",
                "total_tokens",
                "backend",
                "request_throughput",
                "output_throughput",
                "total_token_throughput",
                "mean_ttft_ms",
                "p99.9_itl_ms",
                "duration",
            ]
        );
    }

    #[test]
    fn fresh_history_gets_one_key_with_one_entry() {
        let (_tmp, config) = setup(&["in_32_out_128.json"]);
        let output = run(&config, fixed_now()).unwrap();

        assert_eq!(output.history.len(), 1);
        let entry = &output.history["32_128"];
        assert_eq!(entry.total_tokens, 160);
        assert_eq!(entry.history.len(), 1);

        let point = &entry.history[0];
        assert_eq!(point.timestamp, "2026-02-18T00:00:00.000000Z");
        assert_eq!(point.metrics["total_token_throughput"], 640.5);
        assert_eq!(point.metrics["p99.9_itl_ms"], 12.0);
        assert!(!point.metrics.contains_key("duration"));
        assert!(!point.metrics.contains_key("backend"));
    }

    #[test]
    fn second_run_appends_to_existing_history() {
        let (_tmp, config) = setup(&["in_32_out_128.json"]);
        run(&config, fixed_now()).unwrap();
        let output = run(&config, fixed_now()).unwrap();

        assert_eq!(output.history["32_128"].history.len(), 2);
        let reloaded = store::load_history(&output.history_path).unwrap();
        assert_eq!(reloaded, output.history);
    }

    #[test]
    fn embedded_lengths_override_filename() {
        let (tmp, config) = setup(&[]);
        let mut body = serve_result();
        body["input_len"] = json!(256);
        body["output_len"] = json!(16);
        fs::write(config.input_dir.join("in_1_out_1.json"), body.to_string()).unwrap();

        let output = run(&config, fixed_now()).unwrap();
        assert!(output.history.contains_key("256_16"));
        assert_eq!(output.rows[0]["total_tokens"], 272);
        drop(tmp);
    }

    #[test]
    fn non_matching_files_are_ignored() {
        let (_tmp, config) = setup(&["in_32_out_128.json", "in_notes.json"]);
        fs::write(config.input_dir.join("summary.json"), "{}").unwrap();
        let output = run(&config, fixed_now()).unwrap();
        assert_eq!(output.rows.len(), 1);
    }

    #[test]
    fn summary_is_appended() {
        let (tmp, mut config) = setup(&["in_32_out_128.json"]);
        let summary = tmp.path().join("summary.md");
        fs::write(&summary, "existing\n").unwrap();
        config.summary_path = Some(summary.clone());

        run(&config, fixed_now()).unwrap();

        let text = fs::read_to_string(&summary).unwrap();
        assert!(text.starts_with("existing\n# Benchmark Results\n\n| input_len |"));
        assert!(text.contains("640.50"));
        assert!(text.ends_with("**Data added to timeseries at 2026-02-18T00:00:00.000000Z**\n"));
    }
}
