//! Filename-similarity grouping.
//!
//! # Overview
//!
//! Files are first partitioned by `(extension, size bucket)` so the quadratic
//! string comparison only ever runs inside small, type- and size-compatible
//! buckets. Inside a bucket the names are sorted and scanned once: every
//! unprocessed file seeds a group that absorbs, transitively, every later
//! unprocessed file whose lower-cased name is similar enough.
//!
//! # Example
//!
//! ```
//! use dupesift::duplicates::NameSimilarityGrouper;
//! use dupesift::scanner::FileRecord;
//! use std::time::SystemTime;
//!
//! let files = vec![
//!     FileRecord::new("/p/vacation_photo.jpg".into(), 500_000, SystemTime::now()),
//!     FileRecord::new("/p/vacation_photo_copy.jpg".into(), 510_000, SystemTime::now()),
//!     FileRecord::new("/p/invoice_2023.jpg".into(), 505_000, SystemTime::now()),
//! ];
//!
//! let groups = NameSimilarityGrouper::default().group(&files);
//! assert_eq!(groups.len(), 1);
//! assert_eq!(groups[0].members.len(), 2);
//! ```

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::groups::{Candidate, DetectionMethod};
use crate::scanner::{FileRecord, SizeBucket};

/// Default similarity a pair must exceed to match.
pub const DEFAULT_NAME_THRESHOLD: f64 = 0.70;

/// Largest relative length difference still worth comparing.
pub const MAX_LENGTH_DELTA: f64 = 0.30;

/// String similarity measure used for filename comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum NameMetric {
    /// `2·LCS / (|a| + |b|)` over characters.
    #[default]
    Lcs,
    /// `1 − levenshtein / max(|a|, |b|)`.
    Levenshtein,
    /// Jaro-Winkler similarity.
    JaroWinkler,
}

impl NameMetric {
    /// Similarity of two (already lower-cased) names in `[0, 1]`.
    #[must_use]
    pub fn similarity(self, a: &str, b: &str) -> f64 {
        match self {
            Self::Lcs => lcs_ratio(a, b),
            Self::Levenshtein => strsim::normalized_levenshtein(a, b),
            Self::JaroWinkler => strsim::jaro_winkler(a, b),
        }
    }
}

/// Longest-common-subsequence ratio of two strings.
///
/// Two empty strings are identical (ratio 1.0).
#[must_use]
pub fn lcs_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut row = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            row[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                row[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }

    2.0 * prev[b.len()] as f64 / total as f64
}

/// Clusters files whose names look like versions of one another.
#[derive(Debug, Clone, Copy)]
pub struct NameSimilarityGrouper {
    threshold: f64,
    metric: NameMetric,
}

impl NameSimilarityGrouper {
    #[must_use]
    pub fn new(threshold: f64, metric: NameMetric) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
            metric,
        }
    }

    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Group `records` by filename similarity.
    ///
    /// Buckets are processed in parallel on the current rayon pool; the
    /// output order depends only on the input order.
    #[must_use]
    pub fn group(&self, records: &[FileRecord]) -> Vec<Candidate> {
        let buckets = partition(records);
        log::debug!(
            "Name pass: {} files in {} (extension, size) buckets",
            records.len(),
            buckets.len()
        );

        buckets
            .par_iter()
            .filter(|bucket| bucket.len() >= 2)
            .flat_map_iter(|bucket| self.group_bucket(records, bucket))
            .collect()
    }

    /// Mean similarity over all pairs of `names`; 1.0 for fewer than two names.
    #[must_use]
    pub fn mean_pairwise_similarity(&self, names: &[String]) -> f64 {
        let mut sum = 0.0;
        let mut pairs = 0usize;
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                sum += self.metric.similarity(a, b);
                pairs += 1;
            }
        }
        if pairs == 0 {
            1.0
        } else {
            sum / pairs as f64
        }
    }

    fn group_bucket(&self, records: &[FileRecord], bucket: &[usize]) -> Vec<Candidate> {
        let mut entries: Vec<(usize, String)> = bucket
            .iter()
            .map(|&idx| (idx, records[idx].name().to_lowercase()))
            .collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        let lengths: Vec<usize> = entries.iter().map(|(_, n)| n.chars().count()).collect();

        let mut processed = vec![false; entries.len()];
        let mut candidates = Vec::new();

        for seed in 0..entries.len() {
            if processed[seed] {
                continue;
            }
            processed[seed] = true;

            let mut members = vec![seed];
            let mut cursor = 0;
            while cursor < members.len() {
                let current = members[cursor];
                cursor += 1;
                for other in seed + 1..entries.len() {
                    if processed[other] || !lengths_comparable(lengths[current], lengths[other]) {
                        continue;
                    }
                    let ratio = self.metric.similarity(&entries[current].1, &entries[other].1);
                    if ratio > self.threshold {
                        processed[other] = true;
                        members.push(other);
                    }
                }
            }

            if members.len() < 2 {
                continue;
            }
            let names: Vec<String> = members.iter().map(|&m| entries[m].1.clone()).collect();
            let confidence = self.mean_pairwise_similarity(&names);
            log::trace!("Name group of {} (confidence {:.3})", members.len(), confidence);
            candidates.push(Candidate::new(
                members.iter().map(|&m| entries[m].0).collect(),
                DetectionMethod::SimilarName,
                confidence,
            ));
        }

        candidates
    }
}

impl Default for NameSimilarityGrouper {
    fn default() -> Self {
        Self::new(DEFAULT_NAME_THRESHOLD, NameMetric::default())
    }
}

/// Bucket record indices by `(extension, size bucket)` in first-seen order.
fn partition(records: &[FileRecord]) -> Vec<Vec<usize>> {
    let mut slots: HashMap<(&str, SizeBucket), usize> = HashMap::new();
    let mut buckets: Vec<Vec<usize>> = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        let key = (record.extension(), record.size_bucket());
        let slot = *slots.entry(key).or_insert_with(|| {
            buckets.push(Vec::new());
            buckets.len() - 1
        });
        buckets[slot].push(idx);
    }
    buckets
}

fn lengths_comparable(a: usize, b: usize) -> bool {
    let longest = a.max(b);
    if longest == 0 {
        return true;
    }
    (longest - a.min(b)) as f64 <= MAX_LENGTH_DELTA * longest as f64
}
