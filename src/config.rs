use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

use crate::errors::PerfCiError;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";
/// On-demand H100 PCIe price in USD per GPU hour.
pub const DEFAULT_PRICE_PER_HOUR: f64 = 2.0;
pub const DEFAULT_SETTLE_DELAY_SECS: u64 = 5;
/// Directory under the workspace holding the timeseries files.
pub const DB_SUBDIR: &str = "fake_db";

/// Process environment, captured once at startup.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub workspace: Option<PathBuf>,
    pub profiler_dir: Option<PathBuf>,
    pub step_summary: Option<PathBuf>,
    pub server_url: Option<String>,
}

impl Environment {
    pub fn from_process() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            workspace: get("GITHUB_WORKSPACE").map(PathBuf::from),
            profiler_dir: get("VLLM_TORCH_PROFILER_DIR").map(PathBuf::from),
            step_summary: get("GITHUB_STEP_SUMMARY").map(PathBuf::from),
            server_url: get("PERFCI_SERVER_URL").map(|v| v.to_string_lossy().into_owned()),
        }
    }
}

/// Settings file contents. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub workspace: Option<PathBuf>,
    pub db_dir: Option<PathBuf>,
    pub profiler_dir: Option<PathBuf>,
    pub step_summary: Option<PathBuf>,
    pub server_url: Option<String>,
    pub price_per_hour: Option<f64>,
    pub settle_delay_secs: Option<u64>,
}

impl Settings {
    /// Load settings from `explicit`, or from the user config directory when
    /// a file exists there. An explicit path must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) if p.is_file() => p,
                _ => return Ok(Self::default()),
            },
        };

        let text = std::fs::read_to_string(&path).map_err(|source| PerfCiError::ReadError {
            path: path.clone(),
            source,
        })?;
        Self::parse(&text, &path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let settings = toml::from_str(text).map_err(|e| PerfCiError::ConfigError {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Ok(settings)
    }

    /// Fill fields the file leaves unset from the process environment.
    pub fn with_environment(mut self, env: &Environment) -> Self {
        if self.workspace.is_none() {
            self.workspace = env.workspace.clone();
        }
        if self.profiler_dir.is_none() {
            self.profiler_dir = env.profiler_dir.clone();
        }
        if self.step_summary.is_none() {
            self.step_summary = env.step_summary.clone();
        }
        if self.server_url.is_none() {
            self.server_url = env.server_url.clone();
        }
        self
    }

    /// `db_dir` if set, else `<workspace>/fake_db`.
    pub fn db_dir(&self) -> Option<PathBuf> {
        self.db_dir
            .clone()
            .or_else(|| self.workspace.as_ref().map(|w| w.join(DB_SUBDIR)))
    }

    pub fn server_url(&self) -> String {
        self.server_url
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
    }

    pub fn price_per_hour(&self) -> f64 {
        self.price_per_hour.unwrap_or(DEFAULT_PRICE_PER_HOUR)
    }

    pub fn settle_delay_secs(&self) -> u64 {
        self.settle_delay_secs.unwrap_or(DEFAULT_SETTLE_DELAY_SECS)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("perfci").join("config.toml"))
}

/// Pick the CLI value when given, else the resolved setting, failing when
/// neither names a database directory.
pub fn require_db_dir(cli: Option<PathBuf>, settings: &Settings) -> Result<PathBuf> {
    cli.or_else(|| settings.db_dir())
        .ok_or_else(|| PerfCiError::DbDirNotConfigured.into())
}
