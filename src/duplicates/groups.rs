//! Duplicate groups, suggestion payloads and the detection report.
//!
//! # Overview
//!
//! Detectors produce [`Candidate`]s: tentative groups that refer to records
//! by their index in the input batch. After the priority merge the
//! coordinator turns the survivors into [`DuplicateGroup`]s, which own copies
//! of their records and carry a [`GroupSuggestion`] for the caller's review UI
//! or retention policy. Nothing in this module acts on the suggestions.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::scanner::FileRecord;

/// Strategy that produced a group.
///
/// Variants are declared in merge priority order: a file claimed by more
/// than one strategy is kept in the group of the earliest variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Identical leading content block.
    Exact,
    /// Perceptual image hashes within the Hamming threshold.
    PerceptualImage,
    /// Similar filenames of the same type and size class.
    SimilarName,
}

impl DetectionMethod {
    /// Merge priority, lower runs first.
    #[must_use]
    pub fn priority(self) -> u8 {
        match self {
            Self::Exact => 0,
            Self::PerceptualImage => 1,
            Self::SimilarName => 2,
        }
    }

    /// Remediation hint attached to groups of this method.
    #[must_use]
    pub fn suggested_action(self) -> &'static str {
        match self {
            Self::Exact => "keep newest/smallest",
            Self::PerceptualImage => "keep highest resolution/quality copy",
            Self::SimilarName => "review as possible different versions",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Exact => "exact",
            Self::PerceptualImage => "perceptual_image",
            Self::SimilarName => "similar_name",
        };
        f.write_str(label)
    }
}

/// Tentative group produced by a single detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Indices into the input batch, in detector order, without repeats.
    pub members: Vec<usize>,
    pub method: DetectionMethod,
    pub confidence: f64,
}

impl Candidate {
    #[must_use]
    pub fn new(members: Vec<usize>, method: DetectionMethod, confidence: f64) -> Self {
        debug_assert!(members.len() >= 2, "candidate groups need two members");
        Self {
            members,
            method,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Retention options derived from a group's metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSuggestion {
    pub keep_newest: PathBuf,
    pub keep_largest: PathBuf,
    pub keep_smallest: PathBuf,
    /// Human-readable smallest to largest size, e.g. `"488.3 KiB - 500.0 KiB"`.
    pub size_range: String,
    /// Oldest to newest modification date, e.g. `"2023-01-04 - 2024-06-30"`.
    pub modified_range: String,
    pub options: Vec<String>,
}

impl GroupSuggestion {
    /// Build the suggestion for a non-empty member list.
    ///
    /// Ties are resolved in favour of the earlier member.
    #[must_use]
    pub fn from_members(members: &[FileRecord]) -> Option<Self> {
        let first = members.first()?;
        let (mut newest, mut oldest, mut largest, mut smallest) = (first, first, first, first);
        for record in &members[1..] {
            if record.modified() > newest.modified() {
                newest = record;
            }
            if record.modified() < oldest.modified() {
                oldest = record;
            }
            if record.size_bytes() > largest.size_bytes() {
                largest = record;
            }
            if record.size_bytes() < smallest.size_bytes() {
                smallest = record;
            }
        }

        let date = |r: &FileRecord| DateTime::<Utc>::from(r.modified()).format("%Y-%m-%d").to_string();

        Some(Self {
            keep_newest: newest.path().to_path_buf(),
            keep_largest: largest.path().to_path_buf(),
            keep_smallest: smallest.path().to_path_buf(),
            size_range: format!(
                "{} - {}",
                ByteSize::b(smallest.size_bytes()),
                ByteSize::b(largest.size_bytes())
            ),
            modified_range: format!("{} - {}", date(oldest), date(newest)),
            options: vec![
                format!("keep newest: {}", newest.name()),
                format!("keep largest: {}", largest.name()),
                format!("keep smallest: {}", smallest.name()),
                "keep all".to_string(),
                "choose manually".to_string(),
            ],
        })
    }
}

/// Final duplicate group returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub members: Vec<FileRecord>,
    pub method: DetectionMethod,
    pub confidence: f64,
    pub suggested_action: String,
    pub suggestion: GroupSuggestion,
}

impl DuplicateGroup {
    /// Materialize a merged candidate against the batch it indexes.
    ///
    /// Returns `None` for candidates with fewer than two members.
    #[must_use]
    pub fn from_candidate(candidate: &Candidate, records: &[FileRecord]) -> Option<Self> {
        if candidate.members.len() < 2 {
            return None;
        }
        let members: Vec<FileRecord> = candidate
            .members
            .iter()
            .map(|&idx| records[idx].clone())
            .collect();
        let suggestion = GroupSuggestion::from_members(&members)?;
        Some(Self {
            members,
            method: candidate.method,
            confidence: candidate.confidence,
            suggested_action: candidate.method.suggested_action().to_string(),
            suggestion,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Paths of all members, in group order.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.members.iter().map(|m| m.path().to_path_buf()).collect()
    }

    /// Total size of all members in bytes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.members.iter().map(FileRecord::size_bytes).sum()
    }

    /// Bytes freed by keeping only the largest member.
    #[must_use]
    pub fn wasted_bytes(&self) -> u64 {
        let largest = self.members.iter().map(FileRecord::size_bytes).max().unwrap_or(0);
        self.total_size().saturating_sub(largest)
    }
}

/// A detection pass that failed or ran out of time.
///
/// The pass contributed no groups; the rest of the report is still valid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassWarning {
    pub method: DetectionMethod,
    pub message: String,
}

impl fmt::Display for PassWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pass skipped: {}", self.method, self.message)
    }
}

/// Counters collected during one detection run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionStats {
    /// Records in the input batch
    pub input_files: usize,
    /// Records with a content digest after the exact pass
    pub content_hashed: usize,
    /// Records excluded from the exact pass (I/O failure, timeout)
    pub content_skipped: usize,
    /// Records with a raster-image extension
    pub images_considered: usize,
    /// Images with a perceptual hash after the image pass
    pub images_hashed: usize,
    /// Images excluded from the image pass (undecodable, I/O failure, timeout)
    pub images_skipped: usize,
    /// Per-file tasks that exceeded their timeout
    pub tasks_timed_out: usize,
    /// Tentative groups across all passes before the merge
    pub tentative_groups: usize,
    /// Groups surviving the merge
    pub final_groups: usize,
    /// Wall-clock duration of the run
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Everything a caller receives from one detection run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectionReport {
    /// Non-overlapping groups, largest first.
    pub groups: Vec<DuplicateGroup>,
    pub warnings: Vec<PassWarning>,
    pub stats: DetectionStats,
}

impl DetectionReport {
    /// Whether any file was skipped or any pass failed.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
            || self.stats.content_skipped > 0
            || self.stats.tasks_timed_out > 0
    }

    /// Total bytes reclaimable across all groups.
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        self.groups.iter().map(DuplicateGroup::wasted_bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn record(path: &str, size: u64, age_days: u64) -> FileRecord {
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 - age_days * 86_400);
        FileRecord::new(PathBuf::from(path), size, modified)
    }

    #[test]
    fn test_method_priority_order() {
        let mut methods = vec![
            DetectionMethod::SimilarName,
            DetectionMethod::Exact,
            DetectionMethod::PerceptualImage,
        ];
        methods.sort_by_key(|m| m.priority());
        assert_eq!(
            methods,
            vec![
                DetectionMethod::Exact,
                DetectionMethod::PerceptualImage,
                DetectionMethod::SimilarName
            ]
        );
    }

    #[test]
    fn test_method_display_and_serde() {
        assert_eq!(DetectionMethod::PerceptualImage.to_string(), "perceptual_image");
        let json = serde_json::to_string(&DetectionMethod::SimilarName).unwrap();
        assert_eq!(json, "\"similar_name\"");
    }

    #[test]
    fn test_candidate_confidence_clamped() {
        let c = Candidate::new(vec![0, 1], DetectionMethod::Exact, 1.5);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn test_suggestion_picks_extremes() {
        let members = vec![
            record("/a/old_big.jpg", 5000, 30),
            record("/a/new_small.jpg", 1000, 1),
            record("/a/mid.jpg", 3000, 10),
        ];
        let s = GroupSuggestion::from_members(&members).unwrap();

        assert_eq!(s.keep_newest, PathBuf::from("/a/new_small.jpg"));
        assert_eq!(s.keep_largest, PathBuf::from("/a/old_big.jpg"));
        assert_eq!(s.keep_smallest, PathBuf::from("/a/new_small.jpg"));
        assert_eq!(s.options.len(), 5);
        assert!(s.size_range.contains(" - "));
        assert!(s.modified_range.starts_with("2023-"));
    }

    #[test]
    fn test_suggestion_empty() {
        assert!(GroupSuggestion::from_members(&[]).is_none());
    }

    #[test]
    fn test_group_from_candidate() {
        let records = vec![
            record("/a/1.txt", 100, 0),
            record("/a/2.txt", 100, 0),
            record("/a/3.txt", 300, 0),
        ];
        let c = Candidate::new(vec![2, 0], DetectionMethod::Exact, 1.0);
        let group = DuplicateGroup::from_candidate(&c, &records).unwrap();

        assert_eq!(group.paths(), vec![PathBuf::from("/a/3.txt"), PathBuf::from("/a/1.txt")]);
        assert_eq!(group.suggested_action, "keep newest/smallest");
        assert_eq!(group.total_size(), 400);
        assert_eq!(group.wasted_bytes(), 100);
    }

    #[test]
    fn test_report_partial_flag() {
        let mut report = DetectionReport::default();
        assert!(!report.is_partial());

        report.warnings.push(PassWarning {
            method: DetectionMethod::PerceptualImage,
            message: "deadline exceeded".into(),
        });
        assert!(report.is_partial());
        assert_eq!(
            report.warnings[0].to_string(),
            "perceptual_image pass skipped: deadline exceeded"
        );
    }
}
