//! Duplicate detection module.
//!
//! This module provides:
//! - Filename similarity grouping ([`names`])
//! - Hamming-distance matching of perceptual hashes ([`hamming`])
//! - Priority merge of tentative groups ([`merge`])
//! - The coordinating [`DuplicateDetector`] ([`finder`])
//! - Group and report types ([`groups`])

pub mod finder;
pub mod groups;
pub mod hamming;
pub mod merge;
pub mod names;

pub use finder::{DetectorConfig, DuplicateDetector};
pub use groups::{
    Candidate, DetectionMethod, DetectionReport, DetectionStats, DuplicateGroup, GroupSuggestion,
    PassWarning,
};
pub use hamming::{HammingBucketMatcher, ImageMatchStrategy};
pub use merge::{check_partition, priority_merge};
pub use names::{NameMetric, NameSimilarityGrouper};
