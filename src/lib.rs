//! dupesift - duplicate file detection engine
//!
//! Given a batch of files, dupesift reports groups of likely duplicates found
//! by three strategies: exact content hashing over a leading block, perceptual
//! hashing of raster images, and filename similarity. Each file lands in at
//! most one group; exact matches take precedence over visual matches, which
//! take precedence over name matches.
//!
//! # Example
//!
//! ```no_run
//! use dupesift::duplicates::DuplicateDetector;
//! use dupesift::scanner::FileRecord;
//!
//! let records = vec![
//!     FileRecord::from_path("holiday.jpg").unwrap(),
//!     FileRecord::from_path("holiday_copy.jpg").unwrap(),
//! ];
//! let report = DuplicateDetector::with_defaults().unwrap().detect(&records).unwrap();
//! println!("{} groups, {} bytes reclaimable", report.groups.len(), report.reclaimable_bytes());
//! ```

pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use crate::cli::{Cli, OutputFormat};
use crate::config::Config;
use crate::duplicates::{DetectionReport, DuplicateDetector};
use crate::error::ExitCode;
use crate::output::{JsonOutput, TextOutput};
use crate::progress::Progress;
use crate::scanner::FileRecord;

/// Run the CLI application logic.
///
/// # Errors
///
/// Returns an error for invalid configuration, a failed worker pool, an
/// interrupted run, or a failure writing the report.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if cli.print_config {
        out.write_all(config.to_toml()?.as_bytes())?;
        return Ok(ExitCode::Success);
    }

    let handler = signal::install_handler()?;

    let (records, unreadable) = collect_records(&cli.files);
    log::info!(
        "Comparing {} files ({} unreadable)",
        records.len(),
        unreadable
    );

    let detector_config = config
        .to_detector_config()
        .with_shutdown_flag(handler.get_flag())
        .with_progress_callback(Arc::new(Progress::new(cli.quiet)));
    let detector = DuplicateDetector::new(detector_config)?;
    let report = detector.detect(&records)?;

    let exit_code = exit_code_for(&report, unreadable);

    match cli.output {
        OutputFormat::Text => TextOutput::new(&report)
            .write_to(&mut out)
            .context("Failed to write report")?,
        OutputFormat::Json => JsonOutput::new(&report, exit_code)
            .write_to(&mut out, true)
            .context("Failed to write JSON report")?,
    }

    Ok(exit_code)
}

/// Stat every input path once; unreadable paths and directories are skipped.
///
/// Returns the records and the number of skipped paths.
pub fn collect_records(paths: &[PathBuf]) -> (Vec<FileRecord>, usize) {
    let mut seen = HashSet::with_capacity(paths.len());
    let mut records = Vec::with_capacity(paths.len());
    let mut skipped = 0;

    for path in paths {
        if !seen.insert(path) {
            log::debug!("Ignoring repeated path {}", path.display());
            continue;
        }
        if path.is_dir() {
            log::warn!("Skipping directory {}", path.display());
            skipped += 1;
            continue;
        }
        match FileRecord::from_path(path) {
            Ok(record) => records.push(record),
            Err(e) => {
                log::warn!("Skipping {}: {e}", path.display());
                skipped += 1;
            }
        }
    }

    (records, skipped)
}

/// Exit code for a finished run.
///
/// Partial results win over the duplicate/no-duplicate distinction.
#[must_use]
pub fn exit_code_for(report: &DetectionReport, unreadable: usize) -> ExitCode {
    if report.is_partial() || unreadable > 0 {
        ExitCode::PartialSuccess
    } else if report.groups.is_empty() {
        ExitCode::NoDuplicates
    } else {
        ExitCode::Success
    }
}
