//! File records and per-file hashing.
//!
//! This module provides functionality for:
//! - The typed [`FileRecord`] consumed by the detection engine
//! - Truncated content hashing with XXH64 ([`hasher`])
//! - Mean-threshold perceptual image hashing ([`perceptual`])
//!
//! # Example
//!
//! ```
//! use dupesift::scanner::{FileRecord, SizeBucket};
//! use std::path::PathBuf;
//! use std::time::SystemTime;
//!
//! let record = FileRecord::new(PathBuf::from("/photos/IMG_0001.JPG"), 512 * 1024, SystemTime::now());
//!
//! assert_eq!(record.name(), "IMG_0001.JPG");
//! assert_eq!(record.extension(), ".jpg");
//! assert_eq!(record.size_bucket(), SizeBucket::Small);
//! assert!(record.content_hash().is_none());
//! ```

pub mod hasher;
pub mod perceptual;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

pub use hasher::{ContentHasher, DEFAULT_BLOCK_SIZE};
pub use perceptual::{PerceptualHash, PerceptualHasher, DEFAULT_GRID_SIZE};

/// Extensions (normalized, with leading dot) that the perceptual pass will try to decode.
pub const RASTER_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".webp", ".bmp", ".gif", ".tif", ".tiff",
];

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;

/// Coarse size classification used to bound name comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeBucket {
    /// Under 1 KiB.
    Tiny,
    /// Under 1 MiB.
    Small,
    /// Under 10 MiB.
    Medium,
    /// Under 100 MiB.
    Large,
    /// 100 MiB and above.
    Huge,
}

impl SizeBucket {
    /// Classify a byte size.
    #[must_use]
    pub fn from_size(size_bytes: u64) -> Self {
        if size_bytes < KIB {
            Self::Tiny
        } else if size_bytes < MIB {
            Self::Small
        } else if size_bytes < 10 * MIB {
            Self::Medium
        } else if size_bytes < 100 * MIB {
            Self::Large
        } else {
            Self::Huge
        }
    }
}

impl fmt::Display for SizeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Tiny => "tiny",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Huge => "huge",
        };
        f.write_str(label)
    }
}

/// A file participating in one detection batch.
///
/// Identity fields are fixed at construction. The two hash slots are
/// write-once: the first value stored wins and is never recomputed within
/// a batch.
#[derive(Debug, Clone)]
pub struct FileRecord {
    path: PathBuf,
    name: String,
    extension: String,
    size_bytes: u64,
    modified: SystemTime,
    size_bucket: SizeBucket,
    content_hash: OnceLock<u64>,
    perceptual_hash: OnceLock<PerceptualHash>,
}

impl FileRecord {
    /// Create a record, deriving the display name and extension from `path`.
    #[must_use]
    pub fn new(path: PathBuf, size_bytes: u64, modified: SystemTime) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let extension = normalize_extension(&path);
        Self {
            path,
            name,
            extension,
            size_bytes,
            modified,
            size_bucket: SizeBucket::from_size(size_bytes),
            content_hash: OnceLock::new(),
            perceptual_hash: OnceLock::new(),
        }
    }

    /// Build a record from filesystem metadata.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the metadata cannot be read.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, HashError> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| HashError::from_io(path, e))?;
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Ok(Self::new(path.to_path_buf(), metadata.len(), modified))
    }

    /// Override the display name used for similarity comparison.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Seed the content digest (e.g. from a caller-side cache).
    #[must_use]
    pub fn with_content_hash(self, digest: u64) -> Self {
        let _ = self.content_hash.set(digest);
        self
    }

    /// Seed the perceptual hash.
    #[must_use]
    pub fn with_perceptual_hash(self, hash: PerceptualHash) -> Self {
        let _ = self.perceptual_hash.set(hash);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lower-cased extension with a leading dot, or an empty string.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn size_bucket(&self) -> SizeBucket {
        self.size_bucket
    }

    pub fn content_hash(&self) -> Option<u64> {
        self.content_hash.get().copied()
    }

    pub fn perceptual_hash(&self) -> Option<&PerceptualHash> {
        self.perceptual_hash.get()
    }

    /// Whether the extension belongs to the decodable raster set.
    #[must_use]
    pub fn is_image(&self) -> bool {
        RASTER_EXTENSIONS.contains(&self.extension.as_str())
    }

    /// Store the content digest unless one is already present.
    ///
    /// Returns the value held by the slot afterwards.
    pub(crate) fn fill_content_hash(&self, digest: u64) -> u64 {
        *self.content_hash.get_or_init(|| digest)
    }

    pub(crate) fn fill_perceptual_hash(&self, hash: PerceptualHash) -> &PerceptualHash {
        self.perceptual_hash.get_or_init(|| hash)
    }
}

impl Serialize for FileRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FileRecord", 8)?;
        state.serialize_field("path", &self.path)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("extension", &self.extension)?;
        state.serialize_field("size_bytes", &self.size_bytes)?;
        state.serialize_field("modified", &DateTime::<Utc>::from(self.modified))?;
        state.serialize_field("size_bucket", &self.size_bucket)?;
        state.serialize_field(
            "content_hash",
            &self.content_hash().map(|h| format!("{h:016x}")),
        )?;
        state.serialize_field(
            "perceptual_hash",
            &self.perceptual_hash().map(PerceptualHash::to_hex),
        )?;
        state.end()
    }
}

fn normalize_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Per-file failure while reading content for hashing.
#[derive(thiserror::Error, Debug, Clone)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: Arc<io::Error>,
    },
}

impl HashError {
    /// Classify an I/O error for `path`.
    #[must_use]
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: Arc::new(err),
            },
        }
    }
}

/// Why a file did not produce a hash for one strategy.
#[derive(Debug, Clone)]
pub enum SkipReason {
    /// The file could not be read.
    Io(HashError),
    /// The file is not a decodable image.
    Undecodable,
    /// The task ran past its individual timeout or the pass deadline.
    TimedOut,
    /// A shutdown was requested before the task started.
    Cancelled,
    /// The worker panicked while processing the file.
    Aborted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::Undecodable => f.write_str("not a decodable image"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Aborted => f.write_str("worker aborted"),
        }
    }
}

/// Result of a single per-file task: either a value or a recoverable skip.
///
/// Fatal conditions are reported separately through
/// [`DetectError`](crate::error::DetectError).
#[derive(Debug, Clone)]
pub enum TaskOutcome<T> {
    Ready(T),
    Skipped(SkipReason),
}

impl<T> TaskOutcome<T> {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(v) => Some(v),
            Self::Skipped(_) => None,
        }
    }
}
