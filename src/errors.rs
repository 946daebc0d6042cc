use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum PerfCiError {
    #[error("Profiling requested but no profiler output directory is configured. Set VLLM_TORCH_PROFILER_DIR or pass --profiler-dir")]
    ProfilerDirNotSet,

    #[error("bs-end ({end}) must be >= bs-start ({start})")]
    InvalidBatchRange { start: usize, end: usize },

    #[error("bs-step must be > 0")]
    InvalidBatchStep,

    #[error("Model context length {max_model_len} is smaller than input_len + output_len ({required})")]
    ContextTooShort { max_model_len: usize, required: usize },

    #[error("No latency samples to aggregate")]
    NoSamples,

    #[error("Batch size not found in filename '{path}'")]
    BatchSizeNotFound { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse JSON in {path}: {detail}")]
    ParseError { path: PathBuf, detail: String },

    #[error("Failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No database directory configured. Set GITHUB_WORKSPACE, `db_dir` in the config file, or pass --db-dir")]
    DbDirNotConfigured,

    #[error("Invalid config file {path}: {detail}")]
    ConfigError { path: PathBuf, detail: String },

    #[error("Request to {url} failed: {detail}")]
    ServerError { url: String, detail: String },
}
