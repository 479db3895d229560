//! Command-line interface definitions for dupesift.
//!
//! # Example
//!
//! ```bash
//! # Report duplicates among a set of files
//! dupesift ~/Pictures/*.jpg ~/Downloads/*
//!
//! # JSON output, tighter image matching, global image search
//! dupesift --output json --hamming-threshold 5 --image-matching bk-tree photos/*
//!
//! # Layered configuration with a debug log
//! DUPESIFT_WORKERS=2 dupesift -v --config dupesift.toml files/*
//! ```

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::Config;
use crate::duplicates::{ImageMatchStrategy, NameMetric};

/// Find exact, visual and name-based duplicates among files.
///
/// Files are compared by content (a hash of their leading block), by
/// perceptual image hash, and by filename similarity. Each file ends up in at
/// most one group, preferring exact over visual over name matches.
#[derive(Debug, Parser)]
#[command(name = "dupesift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Files to compare
    #[arg(value_name = "FILES", required_unless_present = "print_config")]
    pub files: Vec<PathBuf>,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output errors as JSON to stderr
    #[arg(long)]
    pub json_errors: bool,

    /// Output format for the report
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// TOML configuration file (overridden by DUPESIFT_* variables and flags)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,

    /// Leading bytes hashed per file (e.g. 64KiB, 1MB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub block_size: Option<u64>,

    /// Filename similarity a pair must exceed (0.0 to 1.0)
    #[arg(long, value_name = "RATIO")]
    pub name_threshold: Option<f64>,

    /// Filename similarity measure
    #[arg(long, value_enum, value_name = "METRIC")]
    pub name_metric: Option<NameMetric>,

    /// Perceptual hash grid edge (2 to 16)
    #[arg(long, value_name = "N")]
    pub grid_size: Option<u32>,

    /// Image pairs match below this Hamming distance
    #[arg(long, value_name = "BITS")]
    pub hamming_threshold: Option<u32>,

    /// Candidate search for image matches
    #[arg(long, value_enum, value_name = "STRATEGY")]
    pub image_matching: Option<ImageMatchStrategy>,

    /// Worker threads for hashing
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Per-file hashing timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub task_timeout: Option<u64>,

    /// Per-pass deadline in seconds
    #[arg(long, value_name = "SECS")]
    pub pass_timeout: Option<u64>,
}

impl Cli {
    /// Apply flag overrides on top of the layered configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(block_size) = self.block_size {
            config.block_size = usize::try_from(block_size).unwrap_or(usize::MAX);
        }
        if let Some(threshold) = self.name_threshold {
            config.name_threshold = threshold;
        }
        if let Some(metric) = self.name_metric {
            config.name_metric = metric;
        }
        if let Some(grid) = self.grid_size {
            config.grid_size = grid;
        }
        if let Some(threshold) = self.hamming_threshold {
            config.hamming_threshold = threshold;
        }
        if let Some(strategy) = self.image_matching {
            config.image_matching = strategy;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(secs) = self.task_timeout {
            config.task_timeout_secs = secs;
        }
        if let Some(secs) = self.pass_timeout {
            config.pass_timeout_secs = secs;
        }
    }
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable listing
    Text,
    /// JSON document for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB. Case-insensitive.
/// Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use dupesift::cli::parse_size;
///
/// assert_eq!(parse_size("4096").unwrap(), 4096);
/// assert_eq!(parse_size("64KiB").unwrap(), 65_536);
/// assert_eq!(parse_size("1MB").unwrap(), 1_000_000);
/// ```
///
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number,
/// or an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
