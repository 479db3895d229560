//! Layered configuration.
//!
//! Values are resolved in this order, later sources winning:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. A TOML file passed with `--config`
//! 3. `DUPESIFT_*` environment variables (e.g. `DUPESIFT_HAMMING_THRESHOLD=6`)
//! 4. Command-line flags (applied by the CLI on top of the extracted value)
//!
//! # Example
//!
//! ```toml
//! block_size = 131072
//! name_threshold = 0.75
//! name_metric = "lcs"
//! grid_size = 8
//! hamming_threshold = 6
//! image_matching = "bk-tree"
//! workers = 4
//! task_timeout_secs = 5
//! pass_timeout_secs = 60
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::duplicates::hamming::{ImageMatchStrategy, DEFAULT_HAMMING_THRESHOLD};
use crate::duplicates::names::{NameMetric, DEFAULT_NAME_THRESHOLD};
use crate::duplicates::DetectorConfig;
use crate::scanner::perceptual::GRID_SIZE_RANGE;
use crate::scanner::{DEFAULT_BLOCK_SIZE, DEFAULT_GRID_SIZE};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "DUPESIFT_";

/// Upper bound on the default worker count.
pub const MAX_DEFAULT_WORKERS: usize = 8;

/// Default per-file task timeout in seconds.
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 10;

/// Default per-pass deadline in seconds.
pub const DEFAULT_PASS_TIMEOUT_SECS: u64 = 120;

/// Errors raised while loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The named configuration file does not exist.
    #[error("Config file not found: {0}")]
    MissingFile(PathBuf),

    /// Merging or extracting the layered configuration failed.
    #[error("Invalid configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A value is outside its accepted range.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the offending key
        field: &'static str,
        /// What range was expected
        reason: String,
    },

    /// Rendering the configuration as TOML failed.
    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Serializable engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Leading bytes hashed per file for exact matching.
    pub block_size: usize,
    /// Filename similarity a pair must exceed.
    pub name_threshold: f64,
    /// Filename similarity measure.
    pub name_metric: NameMetric,
    /// Perceptual hash grid edge (bits = grid²).
    pub grid_size: u32,
    /// Exclusive Hamming bound for image matches.
    pub hamming_threshold: u32,
    /// Candidate search for image matches.
    pub image_matching: ImageMatchStrategy,
    /// Worker pool size.
    pub workers: usize,
    /// Per-file hashing timeout.
    pub task_timeout_secs: u64,
    /// Per-pass deadline.
    pub pass_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            name_threshold: DEFAULT_NAME_THRESHOLD,
            name_metric: NameMetric::default(),
            grid_size: DEFAULT_GRID_SIZE,
            hamming_threshold: DEFAULT_HAMMING_THRESHOLD,
            image_matching: ImageMatchStrategy::default(),
            workers: default_workers(),
            task_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
            pass_timeout_secs: DEFAULT_PASS_TIMEOUT_SECS,
        }
    }
}

/// Available cores, capped at [`MAX_DEFAULT_WORKERS`].
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}

impl Config {
    /// The layered provider stack: defaults, optional TOML file, environment.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is missing, a value fails to parse,
    /// or a value is out of range.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = file {
            if !path.is_file() {
                return Err(ConfigError::MissingFile(path.to_path_buf()));
            }
        }
        let config: Self = Self::figment(file).extract().map_err(Box::new)?;
        config.validate()?;
        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Check every value against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task_timeout_secs == 0 {
            return Err(invalid("task_timeout_secs", "must be at least 1"));
        }
        if self.pass_timeout_secs == 0 {
            return Err(invalid("pass_timeout_secs", "must be at least 1"));
        }
        self.to_detector_config().validate()
    }

    /// Runtime configuration for [`DuplicateDetector`](crate::duplicates::DuplicateDetector).
    #[must_use]
    pub fn to_detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            block_size: self.block_size,
            name_threshold: self.name_threshold,
            name_metric: self.name_metric,
            grid_size: self.grid_size,
            hamming_threshold: self.hamming_threshold,
            image_matching: self.image_matching,
            workers: self.workers,
            task_timeout: Duration::from_secs(self.task_timeout_secs),
            pass_timeout: Duration::from_secs(self.pass_timeout_secs),
            ..DetectorConfig::default()
        }
    }

    /// Render as TOML, e.g. to seed a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Render`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

/// Range checks shared by file and runtime configuration.
pub(crate) fn validate_ranges(config: &DetectorConfig) -> Result<(), ConfigError> {
    if config.block_size == 0 {
        return Err(invalid("block_size", "must be at least 1 byte"));
    }
    if !(0.0..=1.0).contains(&config.name_threshold) {
        return Err(invalid("name_threshold", "must be within 0.0..=1.0"));
    }
    if !GRID_SIZE_RANGE.contains(&config.grid_size) {
        return Err(invalid(
            "grid_size",
            format!(
                "must be within {}..={}",
                GRID_SIZE_RANGE.start(),
                GRID_SIZE_RANGE.end()
            ),
        ));
    }
    let bits = config.grid_size * config.grid_size;
    if config.hamming_threshold > bits {
        return Err(invalid(
            "hamming_threshold",
            format!("must not exceed the hash width ({bits} bits)"),
        ));
    }
    if config.workers == 0 {
        return Err(invalid("workers", "must be at least 1"));
    }
    Ok(())
}
