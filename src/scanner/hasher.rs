//! Truncated content hashing with XXH64.
//!
//! # Overview
//!
//! [`ContentHasher`] digests at most the first `block_size` bytes of a file.
//! Files that agree on that prefix are reported as exact duplicates; this
//! trades a known false-positive case (same prefix, different tail) for
//! constant per-file I/O on large files.
//!
//! Digests are memoized per path in a concurrent map owned by the hasher.
//! Clones share the memo, so a hasher can be handed to pool workers cheaply.

use std::fs::File;
use std::hash::Hasher as _;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use twox_hash::XxHash64;

use super::{FileRecord, HashError};

/// Default number of leading bytes hashed per file (64 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Memoizing prefix hasher.
#[derive(Debug, Clone)]
pub struct ContentHasher {
    block_size: usize,
    memo: Arc<DashMap<PathBuf, u64>>,
}

impl ContentHasher {
    /// Create a hasher reading at most `block_size` bytes per file.
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
            memo: Arc::new(DashMap::new()),
        }
    }

    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Hash a record, populating its `content_hash` slot.
    ///
    /// A slot that is already populated is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    pub fn hash(&self, record: &FileRecord) -> Result<u64, HashError> {
        if let Some(digest) = record.content_hash() {
            return Ok(digest);
        }
        let digest = self.hash_path(record.path())?;
        Ok(record.fill_content_hash(digest))
    }

    /// Hash the leading block of the file at `path`, consulting the memo first.
    ///
    /// Two threads racing on the same uncached path may both read the file;
    /// both compute the same digest, so the memo stays consistent.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    pub fn hash_path(&self, path: &Path) -> Result<u64, HashError> {
        if let Some(digest) = self.cached(path) {
            log::trace!("Content hash memo hit: {}", path.display());
            return Ok(digest);
        }

        let digest = self.digest_prefix(path)?;
        self.memo.entry(path.to_path_buf()).or_insert(digest);
        Ok(digest)
    }

    /// Look up a memoized digest without touching the filesystem.
    #[must_use]
    pub fn cached(&self, path: &Path) -> Option<u64> {
        self.memo.get(path).map(|entry| *entry.value())
    }

    /// Number of memoized digests.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.memo.len()
    }

    /// Forget all memoized digests before reusing the hasher on a new batch.
    pub fn clear(&self) {
        self.memo.clear();
    }

    /// Record a digest computed outside [`hash_path`](Self::hash_path).
    pub(crate) fn remember(&self, path: &Path, digest: u64) {
        self.memo.entry(path.to_path_buf()).or_insert(digest);
    }

    /// Hash the leading block without consulting or updating the memo.
    pub(crate) fn digest_prefix(&self, path: &Path) -> Result<u64, HashError> {
        let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let mut buffer = Vec::with_capacity(self.block_size.min(DEFAULT_BLOCK_SIZE));
        file.take(self.block_size as u64)
            .read_to_end(&mut buffer)
            .map_err(|e| HashError::from_io(path, e))?;

        let mut hasher = XxHash64::with_seed(0);
        hasher.write(&buffer);
        Ok(hasher.finish())
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_identical_content_same_digest() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.txt", b"identical content");
        let b = write_file(&dir, "b.txt", b"identical content");

        let hasher = ContentHasher::default();
        assert_eq!(hasher.hash_path(&a).unwrap(), hasher.hash_path(&b).unwrap());
    }

    #[test]
    fn test_different_content_different_digest() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.txt", b"content one");
        let b = write_file(&dir, "b.txt", b"content two");

        let hasher = ContentHasher::default();
        assert_ne!(hasher.hash_path(&a).unwrap(), hasher.hash_path(&b).unwrap());
    }

    #[test]
    fn test_only_prefix_is_hashed() {
        let dir = TempDir::new().unwrap();
        let mut one = vec![7u8; 32];
        let mut two = vec![7u8; 32];
        one.extend_from_slice(b"tail-one");
        two.extend_from_slice(b"tail-two");
        let a = write_file(&dir, "a.bin", &one);
        let b = write_file(&dir, "b.bin", &two);

        let hasher = ContentHasher::new(32);
        assert_eq!(hasher.hash_path(&a).unwrap(), hasher.hash_path(&b).unwrap());
    }

    #[test]
    fn test_memoization() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", b"before");

        let hasher = ContentHasher::default();
        let first = hasher.hash_path(&path).unwrap();
        assert_eq!(hasher.cached_len(), 1);

        // Content changes are not observed within a run.
        std::fs::write(&path, b"after").unwrap();
        assert_eq!(hasher.hash_path(&path).unwrap(), first);

        hasher.clear();
        assert_eq!(hasher.cached_len(), 0);
        assert_ne!(hasher.hash_path(&path).unwrap(), first);
    }

    #[test]
    fn test_clones_share_memo() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", b"shared");

        let hasher = ContentHasher::default();
        let clone = hasher.clone();
        clone.hash_path(&path).unwrap();
        assert!(hasher.cached(&path).is_some());
    }

    #[test]
    fn test_hash_populates_record_slot() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", b"slot");
        let record = FileRecord::new(path, 4, SystemTime::now());

        let hasher = ContentHasher::default();
        let digest = hasher.hash(&record).unwrap();
        assert_eq!(record.content_hash(), Some(digest));
    }

    #[test]
    fn test_missing_file() {
        let hasher = ContentHasher::default();
        let err = hasher.hash_path(Path::new("/no/such/file.bin")).unwrap_err();
        assert!(matches!(err, HashError::NotFound(_)));
        assert_eq!(hasher.cached_len(), 0);
    }

    #[test]
    fn test_empty_file() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.txt", b"");
        let b = write_file(&dir, "b.txt", b"");

        let hasher = ContentHasher::default();
        assert_eq!(hasher.hash_path(&a).unwrap(), hasher.hash_path(&b).unwrap());
    }
}
