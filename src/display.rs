use std::path::PathBuf;

use anyhow::{Result, anyhow};
use owo_colors::{OwoColorize, Stream, Style};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::BatchResult;

pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FloatFormat {
    /// Shortest round-trip representation.
    Plain,
    /// Fixed number of decimal places.
    Fixed(usize),
}

/// Convert typed records into ordered rows for rendering.
pub fn to_rows<T: Serialize>(items: &[T]) -> Result<Vec<Row>> {
    items
        .iter()
        .map(|item| match serde_json::to_value(item)? {
            Value::Object(map) => Ok(map),
            other => Err(anyhow!("expected a JSON object row, got {}", other)),
        })
        .collect()
}

pub fn format_cell(value: &Value, floats: FloatFormat) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if n.is_f64() {
                let f = n.as_f64().unwrap_or_default();
                match floats {
                    FloatFormat::Plain => f.to_string(),
                    FloatFormat::Fixed(places) => format!("{:.*}", places, f),
                }
            } else {
                n.to_string()
            }
        }
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Render rows as a GitHub-flavored markdown table.
///
/// Columns are the union of row keys in order of first appearance; cells a
/// row lacks are blank. Columns holding only numbers are right-aligned.
pub fn render_markdown_table(rows: &[Row], floats: FloatFormat) -> String {
    let mut headers: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !headers.contains(&key.as_str()) {
                headers.push(key.as_str());
            }
        }
    }
    if headers.is_empty() {
        return String::new();
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            headers
                .iter()
                .map(|h| row.get(*h).map(|v| format_cell(v, floats)).unwrap_or_default())
                .collect()
        })
        .collect();

    let numeric: Vec<bool> = headers
        .iter()
        .map(|h| {
            rows.iter()
                .filter_map(|row| row.get(*h))
                .filter(|v| !v.is_null())
                .all(Value::is_number)
        })
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
                .max(3)
        })
        .collect();

    let pad = |text: &str, i: usize| -> String {
        if numeric[i] {
            format!("{:>width$}", text, width = widths[i])
        } else {
            format!("{:<width$}", text, width = widths[i])
        }
    };

    let mut out = String::new();

    let header_cells: Vec<String> = headers.iter().enumerate().map(|(i, h)| pad(*h, i)).collect();
    out.push_str(&format!("| {} |\n", header_cells.join(" | ")));

    let separators: Vec<String> = widths
        .iter()
        .zip(&numeric)
        .map(|(w, is_num)| {
            if *is_num {
                format!("{}:", "-".repeat(w + 1))
            } else {
                format!(":{}", "-".repeat(w + 1))
            }
        })
        .collect();
    out.push_str(&format!("|{}|\n", separators.join("|")));

    for row in &cells {
        let padded: Vec<String> = row.iter().enumerate().map(|(i, c)| pad(c.as_str(), i)).collect();
        out.push_str(&format!("| {} |\n", padded.join(" | ")));
    }

    out
}

fn style_label() -> Style {
    Style::new().cyan().bold()
}

/// Listing of the result files a post-processor picked up.
pub fn format_found_files(kind: &str, files: &[PathBuf]) -> String {
    let mut out = format!("Found {} {}:\n", files.len(), kind);
    for file in files {
        let shown = file.display().to_string();
        out.push_str(&format!(
            "  {}\n",
            shown.if_supports_color(Stream::Stdout, |s| s.dimmed())
        ));
    }
    out
}

/// Human-readable per-batch summary printed after each batch size.
pub fn format_batch_summary(result: &BatchResult) -> String {
    let label = style_label();
    let mut out = String::new();
    out.push_str(&format!(
        "{} {}\n",
        "Batch size:".if_supports_color(Stream::Stdout, |s| s.style(label)),
        result.batch_size
    ));
    out.push_str(&format!(
        "Avg latency: {} seconds\n",
        result
            .avg_latency
            .if_supports_color(Stream::Stdout, |s| s.yellow())
    ));
    for (rank, value) in &result.percentiles {
        out.push_str(&format!("{}% percentile latency: {} seconds\n", rank, value));
    }
    out
}
