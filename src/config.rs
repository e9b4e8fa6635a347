//! Configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! the base layer; a user file only needs the keys it wants to override.
//!
//! ## Config File Location
//!
//! The CLI reads `config.toml` from the working directory when present, or
//! the file named by `--config`. Without either, stock defaults apply.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [output]
//! format = "jpeg"           # "jpeg" or "png"
//! quality = 90              # JPEG quality (0-100, clamped to at least 1)
//! autorotate = true         # Apply EXIF orientation before transforming
//!
//! [cache]
//! enabled = true
//! dir = ".simple-thumbs-cache"
//! memory_entries = 256      # In-process entries in front of disk (0 = off)
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! max_output_pixels = 50000000  # Larger resize targets or canvases are rejected
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{OutputFormat, Quality, TransformLimits, TransformRequest};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `config.toml`.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbsConfig {
    /// Defaults for requests that don't set format, quality or autorotate.
    pub output: OutputConfig,
    /// Result cache location and sizing.
    pub cache: CacheConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl ThumbsConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output.quality > 100 {
            return Err(ConfigError::Validation(
                "output.quality must be 0-100".into(),
            ));
        }
        if self.cache.enabled && self.cache.dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "cache.dir must not be empty when the cache is enabled".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        if self.processing.max_output_pixels == 0 {
            return Err(ConfigError::Validation(
                "processing.max_output_pixels must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Size limits every planned transform is checked against.
    pub fn limits(&self) -> TransformLimits {
        TransformLimits {
            max_output_pixels: self.processing.max_output_pixels,
        }
    }

    /// A request carrying the configured output defaults and no size.
    pub fn default_request(&self) -> TransformRequest {
        TransformRequest {
            format: self.output.format,
            quality: Quality::new(self.output.quality),
            autorotate: self.output.autorotate,
            ..TransformRequest::default()
        }
    }
}

/// Output defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// JPEG quality (0 = worst, 100 = best). Ignored for PNG.
    pub quality: u32,
    pub autorotate: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            quality: 90,
            autorotate: true,
        }
    }
}

/// Result cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Directory holding one file per cached result.
    pub dir: PathBuf,
    /// Entries kept in memory in front of the disk store. `0` disables the
    /// memory layer.
    pub memory_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".simple-thumbs-cache"),
            memory_entries: 256,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    /// Largest resize target or padded canvas, in pixels.
    pub max_output_pixels: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_processes: None,
            max_output_pixels: TransformLimits::DEFAULT_MAX_OUTPUT_PIXELS,
        }
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ThumbsConfig::default()).expect("default config must serialize")
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

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<ThumbsConfig, ConfigError> {
    let base = stock_defaults_value();
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ThumbsConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration.
///
/// `None` yields the stock defaults. A given path must exist: its values are
/// merged over the defaults, unknown keys are rejected, and the result is
/// validated.
pub fn load_config(path: Option<&Path>) -> Result<ThumbsConfig, ConfigError> {
    let overlay = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            Some(toml::from_str::<toml::Value>(&content)?)
        }
        None => None,
    };
    resolve_config(overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Simple Thumbs Configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Output defaults (used when a request doesn't say otherwise)
# ---------------------------------------------------------------------------
[output]
# "jpeg" (lossy, no alpha) or "png" (lossless, keeps transparency).
format = "jpeg"

# JPEG quality (0 = worst, 100 = best). Ignored for PNG.
quality = 90

# Rotate/flip according to the EXIF orientation tag before transforming.
autorotate = true

# ---------------------------------------------------------------------------
# Result cache
# ---------------------------------------------------------------------------
[cache]
enabled = true

# One file per transformed result. Safe to delete at any time.
dir = ".simple-thumbs-cache"

# Results kept in memory in front of the disk cache (0 = disk only).
memory_entries = 256

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image-processing workers for `batch`.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# Requests whose resize target or padded canvas exceeds this many pixels fail
# with a geometry error instead of allocating the buffer.
max_output_pixels = 50000000
"##
}
