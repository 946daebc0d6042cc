use std::path::{Path, PathBuf};

use anyhow::Result;

/// List `*.json` files in `dir` whose names start with `prefix`, sorted by name.
///
/// A missing or unreadable directory yields `Ok(vec![])`, like an empty glob.
pub fn find_json_files(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(vec![]),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };

        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(prefix) && name.ends_with(".json") {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Split a base filename like `results/latency_bs` into its directory and
/// file-name prefix. A trailing separator means "every file in that directory".
pub fn split_base(base: &str) -> (PathBuf, String) {
    if base.ends_with('/') || base.ends_with(std::path::MAIN_SEPARATOR) {
        return (PathBuf::from(base), String::new());
    }
    let path = Path::new(base);
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (dir, prefix)
}

/// Per-batch-size latency result files for a base filename.
/// `.pytorch.json` companions are skipped.
pub fn find_latency_results(base: &str) -> Result<Vec<PathBuf>> {
    let (dir, prefix) = split_base(base);
    let files = find_json_files(&dir, &prefix)?;
    Ok(files
        .into_iter()
        .filter(|p| !file_name(p).ends_with(".pytorch.json"))
        .collect())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn leading_digits(s: &str) -> &str {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    &s[..end]
}

/// Parse the run of ASCII digits at the start of `s`.
pub fn leading_number(s: &str) -> Option<u64> {
    let digits = leading_digits(s);
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Parse the first run of ASCII digits anywhere in `s`.
pub fn first_number(s: &str) -> Option<u64> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    leading_number(&s[start..])
}

/// Batch size encoded in a latency result file name, taken from the first
/// digits after `prefix`. Digits inside the prefix never count.
pub fn batch_size_from_name(path: &Path, prefix: &str) -> Option<u64> {
    file_name(path).strip_prefix(prefix).and_then(first_number)
}

/// `(input_len, output_len)` from a name containing `in_<I>_out_<O>`.
pub fn parse_in_out(name: &str) -> Option<(u64, u64)> {
    let mut search = name;
    while let Some(pos) = search.find("in_") {
        let rest = &search[pos + 3..];
        let digits = leading_digits(rest);
        if let Some(input_len) = leading_number(digits)
            && let Some(out) = rest[digits.len()..].strip_prefix("_out_")
            && let Some(output_len) = leading_number(out)
        {
            return Some((input_len, output_len));
        }
        search = &search[pos + 3..];
    }
    None
}

/// Concurrency level from a name containing `concurrency_<C>`.
pub fn parse_concurrency(name: &str) -> Option<u64> {
    let pos = name.find("concurrency_")?;
    leading_number(&name[pos + "concurrency_".len()..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn finds_matching_json_sorted_by_name() {
        let tmp = assert_fs::TempDir::new().unwrap();
        fs::write(tmp.path().join("in_64_out_128.json"), "{}").unwrap();
        fs::write(tmp.path().join("in_32_out_128.json"), "{}").unwrap();
        fs::write(tmp.path().join("in_32_out_128.txt"), "{}").unwrap();
        fs::write(tmp.path().join("other.json"), "{}").unwrap();
        fs::create_dir(tmp.path().join("in_dir.json")).unwrap();

        let files = find_json_files(tmp.path(), "in_").unwrap();
        let names: Vec<String> = files.iter().map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["in_32_out_128.json", "in_64_out_128.json"]);
    }

    #[test]
    fn missing_directory_is_empty() {
        let files = find_json_files(Path::new("/nonexistent/perfci/dir"), "").unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn latency_results_skip_pytorch_companions() {
        let tmp = assert_fs::TempDir::new().unwrap();
        fs::write(tmp.path().join("latency_bs1.json"), "{}").unwrap();
        fs::write(tmp.path().join("latency_bs1.pytorch.json"), "[]").unwrap();
        fs::write(tmp.path().join("latency_bs2.json"), "{}").unwrap();

        let base = format!("{}/latency_bs", tmp.path().display());
        let files = find_latency_results(&base).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| !file_name(p).contains("pytorch")));
    }

    #[test]
    fn split_base_variants() {
        assert_eq!(
            split_base("latency_bs"),
            (PathBuf::from("."), "latency_bs".to_string())
        );
        assert_eq!(
            split_base("out/latency_bs"),
            (PathBuf::from("out"), "latency_bs".to_string())
        );
        assert_eq!(split_base("out/"), (PathBuf::from("out/"), String::new()));
    }

    #[test]
    fn numbers() {
        assert_eq!(leading_number("128.json"), Some(128));
        assert_eq!(leading_number("x1"), None);
        assert_eq!(first_number("latency_bs16.json"), Some(16));
        assert_eq!(first_number("latency.json"), None);
    }

    #[test]
    fn batch_size_comes_only_from_digits_after_prefix() {
        let path = Path::new("runs/llama3_bs32.json");
        assert_eq!(batch_size_from_name(path, "llama3_bs"), Some(32));
        assert_eq!(batch_size_from_name(path, "unrelated"), None);
        assert_eq!(batch_size_from_name(Path::new("runs/llama3_bs.json"), "llama3_bs"), None);
        assert_eq!(batch_size_from_name(Path::new("latency.json"), "latency"), None);
    }

    #[test]
    fn in_out_pattern() {
        assert_eq!(parse_in_out("in_32_out_128.json"), Some((32, 128)));
        assert_eq!(parse_in_out("in_1024_out_1_run2.json"), Some((1024, 1)));
        assert_eq!(parse_in_out("in_x_out_1.json"), None);
        assert_eq!(parse_in_out("in_32_128.json"), None);
    }

    #[test]
    fn concurrency_pattern() {
        assert_eq!(parse_concurrency("concurrency_64.json"), Some(64));
        assert_eq!(parse_concurrency("concurrency_.json"), None);
        assert_eq!(parse_concurrency("c_8.json"), None);
    }
}
