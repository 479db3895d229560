//! Structured error handling and exit codes.

use std::time::Duration;

use serde::Serialize;

/// Exit codes for the dupesift binary.
///
/// - 0: Success (completed normally, duplicates found)
/// - 1: General error (unexpected failure)
/// - 2: No duplicates found (completed normally, no duplicates)
/// - 3: Partial success (a pass failed or some files were skipped)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: Detection completed and duplicates were found.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// No duplicates: Detection completed but no duplicates were found.
    NoDuplicates = 2,
    /// Partial success: Completed, but recall was degraded.
    PartialSuccess = 3,
    /// Interrupted: Detection was interrupted by user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DS000",
            Self::GeneralError => "DS001",
            Self::NoDuplicates => "DS002",
            Self::PartialSuccess => "DS003",
            Self::Interrupted => "DS130",
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DS001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: err.to_string(),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}

/// Fatal errors that abort a detection run.
///
/// Everything recoverable (unreadable files, undecodable images, failed
/// passes) is reported inside the
/// [`DetectionReport`](crate::duplicates::DetectionReport) instead.
#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    /// The run was interrupted by user (Ctrl+C or shutdown flag).
    #[error("Detection interrupted by user")]
    Interrupted,

    /// The worker pool could not be created.
    #[error("Failed to build worker pool: {0}")]
    PoolBuild(#[from] rayon::ThreadPoolBuildError),

    /// The configuration is out of range.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

/// Why a whole detection pass contributed no groups.
#[derive(thiserror::Error, Debug)]
pub enum PassFailure {
    /// Hashing tasks were still outstanding at the pass deadline.
    #[error("deadline of {limit:?} exceeded with {pending} file(s) outstanding")]
    TimedOut {
        /// Tasks without a result at the deadline
        pending: usize,
        /// The configured pass deadline
        limit: Duration,
    },

    /// The pass finished, but only after its deadline.
    #[error("pass took {elapsed:?}, over the {limit:?} deadline")]
    Overran {
        /// Measured pass duration
        elapsed: Duration,
        /// The configured pass deadline
        limit: Duration,
    },

    /// The pass panicked.
    #[error("pass panicked: {0}")]
    Panicked(String),
}

impl PassFailure {
    /// Build a failure from a panic payload returned by `join`.
    #[must_use]
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::Panicked(message)
    }
}
