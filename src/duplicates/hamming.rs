//! Near-duplicate matching over perceptual hashes.
//!
//! # Overview
//!
//! Comparing every pair of N hashes is quadratic. The default
//! [`ImageMatchStrategy::PrefixBucket`] strategy first buckets hashes by their
//! leading 8 bits and only compares hashes inside the same bucket. Near
//! duplicates differ in a handful of bits, so they almost always share the
//! prefix; pairs that straddle a bucket boundary are missed.
//!
//! [`ImageMatchStrategy::BkTree`] trades some speed for full recall: every
//! hash goes into a BK-tree and neighbours are looked up globally.
//!
//! Both strategies use an exclusive bound: a pair matches when its Hamming
//! distance is strictly below the threshold.

use std::collections::HashMap;

use bk_tree::{BKTree, Metric};
use serde::{Deserialize, Serialize};

use super::groups::{Candidate, DetectionMethod};
use crate::scanner::PerceptualHash;

/// Default exclusive Hamming bound (out of 64 bits).
pub const DEFAULT_HAMMING_THRESHOLD: u32 = 8;

/// Number of leading bits used as the bucket key.
pub const PREFIX_BITS: u32 = 8;

/// How candidate pairs are found.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ImageMatchStrategy {
    /// Compare only hashes sharing their leading 8 bits.
    #[default]
    PrefixBucket,
    /// Global neighbour search through a BK-tree.
    BkTree,
}

/// A distinct hash tagged with its slot among the distinct hashes.
#[derive(Debug, Clone)]
struct IndexedHash {
    id: usize,
    hash: PerceptualHash,
}

/// Metric for comparing hashes using Hamming distance.
#[derive(Default, Clone, Copy, Debug)]
struct HammingMetric;

impl Metric<IndexedHash> for HammingMetric {
    fn distance(&self, a: &IndexedHash, b: &IndexedHash) -> u32 {
        a.hash.distance(&b.hash)
    }

    fn threshold_distance(&self, a: &IndexedHash, b: &IndexedHash, threshold: u32) -> Option<u32> {
        let d = self.distance(a, b);
        if d <= threshold {
            Some(d)
        } else {
            None
        }
    }
}

/// `1 − mean pairwise distance / bit length`; 1.0 for fewer than two hashes.
#[must_use]
pub fn hamming_confidence(hashes: &[&PerceptualHash]) -> f64 {
    let Some(first) = hashes.first() else {
        return 1.0;
    };
    let bits = f64::from(first.bit_len().max(1));
    let mut total = 0u64;
    let mut pairs = 0u64;
    for (i, a) in hashes.iter().enumerate() {
        for b in &hashes[i + 1..] {
            total += u64::from(a.distance(b));
            pairs += 1;
        }
    }
    if pairs == 0 {
        return 1.0;
    }
    (1.0 - (total as f64 / pairs as f64) / bits).clamp(0.0, 1.0)
}

/// Groups perceptual hashes lying within the Hamming threshold of each other.
#[derive(Debug, Clone, Copy)]
pub struct HammingBucketMatcher {
    threshold: u32,
    strategy: ImageMatchStrategy,
}

impl HammingBucketMatcher {
    #[must_use]
    pub fn new(threshold: u32, strategy: ImageMatchStrategy) -> Self {
        Self {
            threshold,
            strategy,
        }
    }

    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    #[must_use]
    pub fn strategy(&self) -> ImageMatchStrategy {
        self.strategy
    }

    /// Whether two hashes count as visual near-duplicates.
    #[must_use]
    pub fn is_match(&self, a: &PerceptualHash, b: &PerceptualHash) -> bool {
        a.distance(b) < self.threshold
    }

    /// Group `(record index, hash)` pairs.
    ///
    /// Candidate members are record indices taken from the input pairs.
    #[must_use]
    pub fn group(&self, hashes: &[(usize, PerceptualHash)]) -> Vec<Candidate> {
        let clusters = match self.strategy {
            ImageMatchStrategy::PrefixBucket => self.cluster_by_prefix(hashes),
            ImageMatchStrategy::BkTree => self.cluster_by_tree(hashes),
        };

        clusters
            .into_iter()
            .filter(|cluster| cluster.len() >= 2)
            .map(|cluster| {
                let members: Vec<&PerceptualHash> = cluster.iter().map(|&p| &hashes[p].1).collect();
                let confidence = hamming_confidence(&members);
                Candidate::new(
                    cluster.iter().map(|&p| hashes[p].0).collect(),
                    DetectionMethod::PerceptualImage,
                    confidence,
                )
            })
            .collect()
    }

    fn cluster_by_prefix(&self, hashes: &[(usize, PerceptualHash)]) -> Vec<Vec<usize>> {
        let mut slots: HashMap<u64, usize> = HashMap::new();
        let mut buckets: Vec<Vec<usize>> = Vec::new();
        for (pos, (_, hash)) in hashes.iter().enumerate() {
            let slot = *slots.entry(hash.prefix(PREFIX_BITS)).or_insert_with(|| {
                buckets.push(Vec::new());
                buckets.len() - 1
            });
            buckets[slot].push(pos);
        }
        log::debug!(
            "Image pass: {} hashes in {} prefix buckets",
            hashes.len(),
            buckets.len()
        );

        let mut clusters = Vec::new();
        for bucket in &buckets {
            let mut processed = vec![false; bucket.len()];
            for seed in 0..bucket.len() {
                if processed[seed] {
                    continue;
                }
                processed[seed] = true;
                let mut members = vec![seed];
                let mut cursor = 0;
                while cursor < members.len() {
                    let current = &hashes[bucket[members[cursor]]].1;
                    cursor += 1;
                    for other in seed + 1..bucket.len() {
                        if !processed[other] && self.is_match(current, &hashes[bucket[other]].1) {
                            processed[other] = true;
                            members.push(other);
                        }
                    }
                }
                clusters.push(members.into_iter().map(|m| bucket[m]).collect());
            }
        }
        clusters
    }

    fn cluster_by_tree(&self, hashes: &[(usize, PerceptualHash)]) -> Vec<Vec<usize>> {
        if self.threshold == 0 {
            return Vec::new();
        }

        // The tree keeps one node per distinct key, so equal hashes share a
        // node and expand back to all of their positions.
        let mut slots: HashMap<&PerceptualHash, usize> = HashMap::new();
        let mut distinct: Vec<Vec<usize>> = Vec::new();
        for (pos, (_, hash)) in hashes.iter().enumerate() {
            let slot = *slots.entry(hash).or_insert_with(|| {
                distinct.push(Vec::new());
                distinct.len() - 1
            });
            distinct[slot].push(pos);
        }

        let mut tree = BKTree::new(HammingMetric);
        for (id, positions) in distinct.iter().enumerate() {
            tree.add(IndexedHash {
                id,
                hash: hashes[positions[0]].1.clone(),
            });
        }
        log::debug!(
            "Image pass: {} hashes, {} distinct in BK-tree",
            hashes.len(),
            distinct.len()
        );

        let mut processed = vec![false; distinct.len()];
        let mut clusters = Vec::new();
        for seed in 0..distinct.len() {
            if processed[seed] {
                continue;
            }
            processed[seed] = true;
            let mut members = vec![seed];
            let mut cursor = 0;
            while cursor < members.len() {
                let query = IndexedHash {
                    id: members[cursor],
                    hash: hashes[distinct[members[cursor]][0]].1.clone(),
                };
                cursor += 1;
                let mut found: Vec<usize> = tree
                    .find(&query, self.threshold - 1)
                    .map(|(_, hit)| hit.id)
                    .filter(|&id| !processed[id])
                    .collect();
                found.sort_unstable();
                for id in found {
                    processed[id] = true;
                    members.push(id);
                }
            }
            clusters.push(
                members
                    .into_iter()
                    .flat_map(|id| distinct[id].iter().copied())
                    .collect(),
            );
        }
        clusters
    }
}

impl Default for HammingBucketMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_HAMMING_THRESHOLD, ImageMatchStrategy::default())
    }
}
