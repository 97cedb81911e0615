//! Derivative configuration module.
//!
//! Handles loading, validating, and merging `media-derivatives.toml`. Stock
//! defaults are overridden by the user file, key by key, so the file only
//! needs the values it changes.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [paths]
//! input = "media"               # Media root (source files)
//! output = "public/media"       # Derivative output root
//! index = "media.json"          # Media index JSON
//!
//! [sizes]
//! ladder = [350, 650, 900, 1200, 1920]   # Widths for the `auto` size spec
//!
//! [quality]
//! on_demand = 70                # Default quality for request-path generation
//! batch = 50                    # Default quality for batch generation
//!
//! [processing]
//! max_workers = 4               # Omit for auto = CPU cores (hard cap 16)
//! strategy = "in-process"       # or "subprocess"
//! timeout_secs = 60             # Subprocess only: kill jobs running longer
//! program = "/usr/bin/media-derivatives"  # Subprocess only: worker binary
//!
//! [batch]
//! fail_on_error = false         # Abort the batch on the first failure
//! ```
//!
//! Unknown keys are rejected to catch typos early. Validation happens once,
//! at load time.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in the working directory when `--config` is absent.
pub const CONFIG_FILE_NAME: &str = "media-derivatives.toml";

/// Upper bound on concurrent generation jobs.
pub const MAX_WORKERS: usize = 16;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Derivative configuration loaded from `media-derivatives.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DerivativesConfig {
    pub paths: PathsConfig,
    pub sizes: SizesConfig,
    pub quality: QualityConfig,
    pub processing: ProcessingConfig,
    pub batch: BatchConfig,
}

impl DerivativesConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sizes.ladder.is_empty() {
            return Err(ConfigError::Validation(
                "sizes.ladder must not be empty".into(),
            ));
        }
        if self.sizes.ladder.contains(&0) {
            return Err(ConfigError::Validation(
                "sizes.ladder widths must be non-zero".into(),
            ));
        }
        if self.quality.on_demand > 100 || self.quality.batch > 100 {
            return Err(ConfigError::Validation(
                "quality values must be 0-100".into(),
            ));
        }
        if self.processing.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_workers must be at least 1".into(),
            ));
        }
        if self.processing.timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "processing.timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub index: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("media"),
            output: PathBuf::from("public/media"),
            index: PathBuf::from("media.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SizesConfig {
    /// Widths materialized by the `auto` size specification.
    pub ladder: Vec<u32>,
}

impl Default for SizesConfig {
    fn default() -> Self {
        Self {
            ladder: crate::sizes::DEFAULT_LADDER.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QualityConfig {
    pub on_demand: u32,
    pub batch: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            on_demand: crate::options::DEFAULT_QUALITY,
            batch: crate::options::DEFAULT_BATCH_QUALITY,
        }
    }
}

/// Where generation jobs run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    InProcess,
    Subprocess,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of concurrent generation jobs.
    /// When absent, defaults to the number of CPU cores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    pub strategy: StrategyKind,
    /// Hard wall-clock limit per subprocess job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Worker executable for subprocess jobs; defaults to the running binary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,
}

/// Resolve the effective worker count from config.
///
/// - `None` → all available cores
/// - `Some(n)` → `n`
///
/// Either way the result is clamped to `1..=MAX_WORKERS`.
pub fn effective_workers(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_workers.unwrap_or(cores).clamp(1, MAX_WORKERS)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    pub fail_on_error: bool,
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(DerivativesConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. A missing file is `None`.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto `base`, deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<DerivativesConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: DerivativesConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the config at `path`, falling back to stock defaults when the file
/// does not exist.
pub fn load_config(path: &Path) -> Result<DerivativesConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `media-derivatives.toml`.
pub fn stock_config_toml() -> &'static str {
    r##"# media-derivatives configuration
# ===============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Paths
# ---------------------------------------------------------------------------
[paths]
# Media root. Media index paths are relative to this directory.
input = "media"

# Derivative output root. Files land at <output>/<token>/<path>_<index>.<ext>.
output = "public/media"

# Media index JSON (an array of media records). Build one with `scan`.
index = "media.json"

# ---------------------------------------------------------------------------
# Sizes
# ---------------------------------------------------------------------------
[sizes]
# Widths generated for the `auto` size specification (token `_sa` or `auto`).
# The index in this list is the `_<index>` suffix of derivative file names.
ladder = [350, 650, 900, 1200, 1920]

# ---------------------------------------------------------------------------
# Quality
# ---------------------------------------------------------------------------
[quality]
# JPEG quality when the option token does not set one (0-100).
# PNG and WebP output is lossless.
on_demand = 70

# Same, for `batch` and `generate`.
batch = 50

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum concurrent generation jobs.
# Omit or comment out to auto-detect (= number of CPU cores, at most 16).
# max_workers = 4

# "in-process" runs jobs on a thread pool; "subprocess" runs each job in a
# child process that can be killed on timeout.
strategy = "in-process"

# Subprocess only: kill a job after this many seconds.
# timeout_secs = 60

# Subprocess only: worker executable (defaults to this binary).
# program = "/usr/local/bin/media-derivatives"

# ---------------------------------------------------------------------------
# Batch
# ---------------------------------------------------------------------------
[batch]
# Abort on the first failed derivative instead of logging and continuing.
fail_on_error = false
"##
}
