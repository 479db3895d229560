//! Perceptual image hashing for near-duplicate detection.
//!
//! This module provides the [`PerceptualHasher`], which downsamples an image
//! to a small luminance grid and thresholds each sample against the grid
//! mean. The resulting bit string is stable under re-encoding, resizing and
//! mild compression. It is not designed to resist deliberate manipulation.
//!
//! Bits are emitted in row-major order with the first sample in the most
//! significant position, so the leading bits of a hash describe the top rows
//! of the image.

use std::path::Path;

use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use super::{FileRecord, HashError};

/// Default grid edge length (8×8 = 64 bits).
pub const DEFAULT_GRID_SIZE: u32 = 8;

/// Smallest and largest supported grid edge.
pub const GRID_SIZE_RANGE: std::ops::RangeInclusive<u32> = 2..=16;

/// Fixed-width bit string packed MSB-first into 64-bit words.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerceptualHash {
    words: Vec<u64>,
    bits: u32,
}

impl PerceptualHash {
    /// Pack a sequence of bits, first bit most significant.
    pub fn from_bits<I: IntoIterator<Item = bool>>(bits: I) -> Self {
        let mut words = Vec::new();
        let mut len = 0u32;
        for bit in bits {
            let slot = (len % 64) as usize;
            if slot == 0 {
                words.push(0);
            }
            if bit {
                if let Some(word) = words.last_mut() {
                    *word |= 1u64 << (63 - slot);
                }
            }
            len += 1;
        }
        Self { words, bits: len }
    }

    /// A 64-bit hash, e.g. the output of an 8×8 grid.
    #[must_use]
    pub fn from_u64(value: u64) -> Self {
        Self {
            words: vec![value],
            bits: 64,
        }
    }

    /// Number of bits in the hash.
    #[must_use]
    pub fn bit_len(&self) -> u32 {
        self.bits
    }

    /// Hamming distance to `other`.
    ///
    /// Hashes of different widths are maximally distant.
    #[must_use]
    pub fn distance(&self, other: &Self) -> u32 {
        if self.bits != other.bits {
            return self.bits.max(other.bits);
        }
        self.words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    /// The leading `n` bits (at most 64) as an integer.
    #[must_use]
    pub fn prefix(&self, n: u32) -> u64 {
        let n = n.clamp(1, 64);
        self.words.first().map_or(0, |w| w >> (64 - n))
    }

    /// Lower-case hex rendering, one digit per four bits.
    #[must_use]
    pub fn to_hex(&self) -> String {
        let mut hex: String = self.words.iter().map(|w| format!("{w:016x}")).collect();
        hex.truncate(self.bits.div_ceil(4) as usize);
        hex
    }
}

impl std::fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Computes mean-threshold hashes for decodable raster images.
#[derive(Debug, Clone, Copy)]
pub struct PerceptualHasher {
    grid: u32,
}

impl PerceptualHasher {
    /// Create a hasher sampling a `grid × grid` luminance grid.
    ///
    /// The grid is clamped to [`GRID_SIZE_RANGE`].
    #[must_use]
    pub fn new(grid: u32) -> Self {
        Self {
            grid: grid.clamp(*GRID_SIZE_RANGE.start(), *GRID_SIZE_RANGE.end()),
        }
    }

    #[must_use]
    pub fn grid_size(&self) -> u32 {
        self.grid
    }

    /// Bit length of every hash this hasher produces.
    #[must_use]
    pub fn bit_len(&self) -> u32 {
        self.grid * self.grid
    }

    /// Hash a record, populating its `perceptual_hash` slot.
    ///
    /// Returns `Ok(None)` for non-image extensions and undecodable content.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be read.
    pub fn hash(&self, record: &FileRecord) -> Result<Option<PerceptualHash>, HashError> {
        if let Some(existing) = record.perceptual_hash() {
            return Ok(Some(existing.clone()));
        }
        if !record.is_image() {
            return Ok(None);
        }
        Ok(self
            .hash_path(record.path())?
            .map(|h| record.fill_perceptual_hash(h).clone()))
    }

    /// Decode and hash the image at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be read. Decode failures are
    /// reported as `Ok(None)`.
    pub fn hash_path(&self, path: &Path) -> Result<Option<PerceptualHash>, HashError> {
        let bytes = std::fs::read(path).map_err(|e| HashError::from_io(path, e))?;
        match image::load_from_memory(&bytes) {
            Ok(img) => Ok(Some(self.hash_image(&img))),
            Err(e) => {
                log::debug!("Not hashing {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Hash an already decoded image.
    #[must_use]
    pub fn hash_image(&self, img: &DynamicImage) -> PerceptualHash {
        let samples = img
            .resize_exact(self.grid, self.grid, FilterType::Lanczos3)
            .to_luma8()
            .into_raw();
        let mean = samples.iter().map(|&s| f64::from(s)).sum::<f64>() / samples.len() as f64;
        PerceptualHash::from_bits(samples.iter().map(|&s| f64::from(s) > mean))
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new(DEFAULT_GRID_SIZE)
    }
}
