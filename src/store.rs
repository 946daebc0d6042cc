use std::io::ErrorKind;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::PerfCiError;
use crate::types::HistoryStore;

/// Read and deserialize a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|source| PerfCiError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let value = serde_json::from_str(&text).map_err(|e| PerfCiError::ParseError {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    Ok(value)
}

/// Serialize `value` as pretty JSON with `indent` spaces, replacing any
/// existing file. Missing parent directories are created.
pub fn write_json<T: Serialize>(path: &Path, value: &T, indent: usize) -> Result<()> {
    let indent_str = " ".repeat(indent);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent_str.as_bytes());
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;

    write_bytes(path, &buf)
}

pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| PerfCiError::WriteError {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, bytes).map_err(|source| PerfCiError::WriteError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Load the timeseries history, treating a missing file as empty history.
pub fn load_history(path: &Path) -> Result<HistoryStore> {
    match std::fs::metadata(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(HistoryStore::new()),
        _ => read_json(path),
    }
}
