//! JSON output formatter for detection reports.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "groups": [
//!     {
//!       "method": "perceptual_image",
//!       "confidence": 0.953125,
//!       "suggested_action": "keep highest resolution/quality copy",
//!       "files": ["/photos/IMG_001.jpg", "/photos/IMG_001 (1).jpg"],
//!       "total_size": 1048576,
//!       "wasted_bytes": 512000,
//!       "suggestion": { "keep_newest": "...", "options": ["..."] }
//!     }
//!   ],
//!   "warnings": ["similar_name pass skipped: ..."],
//!   "summary": {
//!     "input_files": 100,
//!     "duplicate_groups": 5,
//!     "reclaimable_space": 51200,
//!     "duration_ms": 1234,
//!     "partial": false,
//!     "exit_code": 0,
//!     "exit_code_name": "DS000"
//!   }
//! }
//! ```

use std::io::Write;

use serde::Serialize;

use crate::duplicates::{DetectionMethod, DetectionReport, DuplicateGroup, GroupSuggestion};
use crate::error::ExitCode;

/// A single duplicate group in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonGroup {
    pub method: DetectionMethod,
    pub confidence: f64,
    pub suggested_action: String,
    /// Absolute paths where they can be resolved
    pub files: Vec<String>,
    pub total_size: u64,
    pub wasted_bytes: u64,
    pub suggestion: GroupSuggestion,
}

impl JsonGroup {
    #[must_use]
    pub fn from_group(group: &DuplicateGroup) -> Self {
        Self {
            method: group.method,
            confidence: group.confidence,
            suggested_action: group.suggested_action.clone(),
            files: group
                .members
                .iter()
                .map(|m| normalize_path(m.path()))
                .collect(),
            total_size: group.total_size(),
            wasted_bytes: group.wasted_bytes(),
            suggestion: group.suggestion.clone(),
        }
    }
}

/// Summary statistics in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    pub input_files: usize,
    pub content_hashed: usize,
    pub content_skipped: usize,
    pub images_considered: usize,
    pub images_hashed: usize,
    pub images_skipped: usize,
    pub tasks_timed_out: usize,
    pub tentative_groups: usize,
    pub duplicate_groups: usize,
    /// Files that could go while keeping one copy per group
    pub duplicate_files: usize,
    pub reclaimable_space: u64,
    pub duration_ms: u64,
    /// Whether any pass failed or any file was skipped
    pub partial: bool,
    pub exit_code: i32,
    /// Machine-readable exit code name (e.g., "DS000")
    pub exit_code_name: String,
}

impl JsonSummary {
    #[must_use]
    pub fn from_report(report: &DetectionReport, exit_code: ExitCode) -> Self {
        let stats = &report.stats;
        Self {
            input_files: stats.input_files,
            content_hashed: stats.content_hashed,
            content_skipped: stats.content_skipped,
            images_considered: stats.images_considered,
            images_hashed: stats.images_hashed,
            images_skipped: stats.images_skipped,
            tasks_timed_out: stats.tasks_timed_out,
            tentative_groups: stats.tentative_groups,
            duplicate_groups: report.groups.len(),
            duplicate_files: report.groups.iter().map(|g| g.len().saturating_sub(1)).sum(),
            reclaimable_space: report.reclaimable_bytes(),
            duration_ms: u64::try_from(stats.duration.as_millis()).unwrap_or(u64::MAX),
            partial: report.is_partial(),
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    pub groups: Vec<JsonGroup>,
    pub warnings: Vec<String>,
    pub summary: JsonSummary,
}

impl JsonOutput {
    /// Build the JSON view of `report`.
    ///
    /// # Example
    ///
    /// ```
    /// use dupesift::duplicates::DetectionReport;
    /// use dupesift::error::ExitCode;
    /// use dupesift::output::JsonOutput;
    ///
    /// let output = JsonOutput::new(&DetectionReport::default(), ExitCode::NoDuplicates);
    /// assert!(output.groups.is_empty());
    /// assert_eq!(output.summary.exit_code, 2);
    /// ```
    #[must_use]
    pub fn new(report: &DetectionReport, exit_code: ExitCode) -> Self {
        Self {
            groups: report.groups.iter().map(JsonGroup::from_group).collect(),
            warnings: report.warnings.iter().map(ToString::to_string).collect(),
            summary: JsonSummary::from_report(report, exit_code),
        }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON to a writer, followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Canonical path if it resolves, otherwise the path as given.
fn normalize_path(path: &std::path::Path) -> String {
    match path.canonicalize() {
        Ok(canonical) => canonical.to_string_lossy().into_owned(),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
