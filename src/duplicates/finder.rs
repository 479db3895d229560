//! Duplicate detector: runs the three passes and merges their groups.
//!
//! # Overview
//!
//! [`DuplicateDetector::detect`] runs three independent passes concurrently:
//! 1. **Exact**: prefix content digests, grouped by equal digest
//! 2. **Perceptual image**: average hashes of raster images, grouped by Hamming distance
//! 3. **Similar name**: filename similarity within (extension, size) buckets
//!
//! The exact and image passes feed one task per file to a bounded rayon pool
//! and collect the results over a channel against the pass deadline. The
//! tentative groups are then merged by priority into a non-overlapping
//! partition (see [`merge`](super::merge)).
//!
//! # Example
//!
//! ```no_run
//! use dupesift::duplicates::{DetectorConfig, DuplicateDetector};
//! use dupesift::scanner::FileRecord;
//!
//! let records: Vec<FileRecord> = ["a.jpg", "b.jpg"]
//!     .iter()
//!     .filter_map(|p| FileRecord::from_path(p).ok())
//!     .collect();
//!
//! let detector = DuplicateDetector::new(DetectorConfig::default().with_workers(4)).unwrap();
//! let report = detector.detect(&records).unwrap();
//! for group in &report.groups {
//!     println!("{}: {:?}", group.method, group.paths());
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, OnceLock};
use std::thread::ScopedJoinHandle;
use std::time::{Duration, Instant};

use super::groups::{
    Candidate, DetectionMethod, DetectionReport, DetectionStats, DuplicateGroup, PassWarning,
};
use super::hamming::{
    hamming_confidence, HammingBucketMatcher, ImageMatchStrategy, DEFAULT_HAMMING_THRESHOLD,
};
use super::merge::priority_merge;
use super::names::{NameMetric, NameSimilarityGrouper, DEFAULT_NAME_THRESHOLD};
use crate::config::{
    default_workers, validate_ranges, ConfigError, DEFAULT_PASS_TIMEOUT_SECS,
    DEFAULT_TASK_TIMEOUT_SECS,
};
use crate::error::{DetectError, PassFailure};
use crate::progress::{ProgressCallback, PHASE_EXACT, PHASE_NAMES, PHASE_PERCEPTUAL};
use crate::scanner::{
    ContentHasher, FileRecord, PerceptualHash, PerceptualHasher, SkipReason, TaskOutcome,
    DEFAULT_BLOCK_SIZE, DEFAULT_GRID_SIZE,
};

/// Runtime configuration for [`DuplicateDetector`].
#[derive(Clone)]
pub struct DetectorConfig {
    /// Leading bytes hashed per file for exact matching.
    pub block_size: usize,
    /// Filename similarity a pair must exceed.
    pub name_threshold: f64,
    /// Filename similarity measure.
    pub name_metric: NameMetric,
    /// Perceptual hash grid edge.
    pub grid_size: u32,
    /// Exclusive Hamming bound for image matches.
    pub hamming_threshold: u32,
    /// Candidate search for image matches.
    pub image_matching: ImageMatchStrategy,
    /// Worker pool size.
    pub workers: usize,
    /// A task running longer than this yields no hash.
    pub task_timeout: Duration,
    /// A pass still running after this contributes no groups.
    pub pass_timeout: Duration,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for DetectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorConfig")
            .field("block_size", &self.block_size)
            .field("name_threshold", &self.name_threshold)
            .field("name_metric", &self.name_metric)
            .field("grid_size", &self.grid_size)
            .field("hamming_threshold", &self.hamming_threshold)
            .field("image_matching", &self.image_matching)
            .field("workers", &self.workers)
            .field("task_timeout", &self.task_timeout)
            .field("pass_timeout", &self.pass_timeout)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            name_threshold: DEFAULT_NAME_THRESHOLD,
            name_metric: NameMetric::default(),
            grid_size: DEFAULT_GRID_SIZE,
            hamming_threshold: DEFAULT_HAMMING_THRESHOLD,
            image_matching: ImageMatchStrategy::default(),
            workers: default_workers(),
            task_timeout: Duration::from_secs(DEFAULT_TASK_TIMEOUT_SECS),
            pass_timeout: Duration::from_secs(DEFAULT_PASS_TIMEOUT_SECS),
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl DetectorConfig {
    /// Set the worker pool size.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the number of leading bytes hashed per file.
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the filename similarity threshold.
    #[must_use]
    pub fn with_name_threshold(mut self, threshold: f64) -> Self {
        self.name_threshold = threshold;
        self
    }

    /// Set the filename similarity measure.
    #[must_use]
    pub fn with_name_metric(mut self, metric: NameMetric) -> Self {
        self.name_metric = metric;
        self
    }

    /// Set the perceptual hash grid edge.
    #[must_use]
    pub fn with_grid_size(mut self, grid_size: u32) -> Self {
        self.grid_size = grid_size;
        self
    }

    /// Set the exclusive Hamming bound.
    #[must_use]
    pub fn with_hamming_threshold(mut self, threshold: u32) -> Self {
        self.hamming_threshold = threshold;
        self
    }

    /// Set the image candidate search strategy.
    #[must_use]
    pub fn with_image_matching(mut self, strategy: ImageMatchStrategy) -> Self {
        self.image_matching = strategy;
        self
    }

    /// Set the per-file task timeout.
    #[must_use]
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Set the per-pass deadline.
    #[must_use]
    pub fn with_pass_timeout(mut self, timeout: Duration) -> Self {
        self.pass_timeout = timeout;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Check if shutdown has been requested.
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Reject out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_ranges(self)
    }
}

/// What one pass hands back to the coordinator.
#[derive(Debug, Default)]
struct PassOutput {
    candidates: Vec<Candidate>,
    skipped: usize,
    timed_out: usize,
}

/// Finds exact, visual and name-based duplicates in a batch of records.
///
/// The detector owns its hashers, their memo and its worker pool. It can be
/// reused across batches; call [`clear`](Self::clear) to drop memoized
/// digests between unrelated runs.
pub struct DuplicateDetector {
    config: DetectorConfig,
    content: ContentHasher,
    perceptual: PerceptualHasher,
    names: NameSimilarityGrouper,
    matcher: HammingBucketMatcher,
    pool: rayon::ThreadPool,
}

impl DuplicateDetector {
    /// Build a detector and its worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Config`] for out-of-range settings and
    /// [`DetectError::PoolBuild`] if the pool cannot be created.
    pub fn new(config: DetectorConfig) -> Result<Self, DetectError> {
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("dupesift-worker-{i}"))
            .panic_handler(|payload| {
                log::error!("Worker task {}", PassFailure::from_panic(payload));
            })
            .build()?;

        log::debug!("Created detector with {} workers", config.workers);

        Ok(Self {
            content: ContentHasher::new(config.block_size),
            perceptual: PerceptualHasher::new(config.grid_size),
            names: NameSimilarityGrouper::new(config.name_threshold, config.name_metric),
            matcher: HammingBucketMatcher::new(config.hamming_threshold, config.image_matching),
            pool,
            config,
        })
    }

    /// Build a detector with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::PoolBuild`] if the pool cannot be created.
    pub fn with_defaults() -> Result<Self, DetectError> {
        Self::new(DetectorConfig::default())
    }

    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Number of memoized content digests.
    #[must_use]
    pub fn cached_digests(&self) -> usize {
        self.content.cached_len()
    }

    /// Forget memoized content digests.
    pub fn clear(&self) {
        self.content.clear();
    }

    /// Detect duplicates in `records`.
    ///
    /// Per-file failures and failed passes are reported inside the returned
    /// [`DetectionReport`]. Hash slots on `records` are filled as a side effect.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Interrupted`] if the shutdown flag is set before
    /// the run starts or when the passes finish.
    pub fn detect(&self, records: &[FileRecord]) -> Result<DetectionReport, DetectError> {
        let started = Instant::now();
        if self.config.is_shutdown_requested() {
            return Err(DetectError::Interrupted);
        }

        log::info!("Detecting duplicates among {} files", records.len());

        let (exact, image, names) = std::thread::scope(|s| {
            let exact = s.spawn(|| self.exact_pass(records, started));
            let image = s.spawn(|| self.image_pass(records, started));
            let names = s.spawn(|| self.name_pass(records, started));
            (join_pass(exact), join_pass(image), join_pass(names))
        });

        if self.config.is_shutdown_requested() {
            log::info!("Detection interrupted after passes finished");
            return Err(DetectError::Interrupted);
        }

        let mut stats = DetectionStats {
            input_files: records.len(),
            images_considered: records.iter().filter(|r| r.is_image()).count(),
            ..DetectionStats::default()
        };
        let mut warnings = Vec::new();
        let mut tentative = Vec::new();

        for (method, outcome) in [
            (DetectionMethod::Exact, exact),
            (DetectionMethod::PerceptualImage, image),
            (DetectionMethod::SimilarName, names),
        ] {
            match outcome {
                Ok(output) => {
                    match method {
                        DetectionMethod::Exact => stats.content_skipped = output.skipped,
                        DetectionMethod::PerceptualImage => stats.images_skipped = output.skipped,
                        DetectionMethod::SimilarName => {}
                    }
                    stats.tasks_timed_out += output.timed_out;
                    tentative.extend(output.candidates);
                }
                Err(failure) => {
                    log::warn!("{method} pass skipped: {failure}");
                    warnings.push(PassWarning {
                        method,
                        message: failure.to_string(),
                    });
                }
            }
        }

        stats.content_hashed = records.iter().filter(|r| r.content_hash().is_some()).count();
        stats.images_hashed = records
            .iter()
            .filter(|r| r.is_image() && r.perceptual_hash().is_some())
            .count();
        stats.tentative_groups = tentative.len();

        let merged = priority_merge(tentative, |candidate| self.rescore(candidate, records));
        let groups: Vec<DuplicateGroup> = merged
            .iter()
            .filter_map(|candidate| DuplicateGroup::from_candidate(candidate, records))
            .collect();

        stats.final_groups = groups.len();
        stats.duration = started.elapsed();

        log::info!(
            "Found {} duplicate groups ({} tentative) in {:?}",
            stats.final_groups,
            stats.tentative_groups,
            stats.duration
        );

        Ok(DetectionReport {
            groups,
            warnings,
            stats,
        })
    }

    /// Confidence for a group whose membership shrank during the merge.
    fn rescore(&self, candidate: &Candidate, records: &[FileRecord]) -> f64 {
        match candidate.method {
            DetectionMethod::Exact => 1.0,
            DetectionMethod::PerceptualImage => {
                let hashes: Vec<&PerceptualHash> = candidate
                    .members
                    .iter()
                    .filter_map(|&idx| records[idx].perceptual_hash())
                    .collect();
                hamming_confidence(&hashes)
            }
            DetectionMethod::SimilarName => {
                let names: Vec<String> = candidate
                    .members
                    .iter()
                    .map(|&idx| records[idx].name().to_lowercase())
                    .collect();
                self.names.mean_pairwise_similarity(&names)
            }
        }
    }

    fn exact_pass(&self, records: &[FileRecord], started: Instant) -> Result<PassOutput, PassFailure> {
        let jobs: Vec<(usize, PathBuf)> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.content_hash().is_none())
            .map(|(idx, r)| (idx, r.path().to_path_buf()))
            .collect();

        log::debug!(
            "Exact pass: {} of {} files need hashing",
            jobs.len(),
            records.len()
        );

        // Workers read through the memo but never write it: a digest that
        // arrives after its task was timed out must not outlive this run.
        let hasher = self.content.clone();
        let results = self.dispatch(PHASE_EXACT, jobs, started, move |path| {
            if let Some(digest) = hasher.cached(path) {
                return TaskOutcome::Ready(digest);
            }
            match hasher.digest_prefix(path) {
                Ok(digest) => TaskOutcome::Ready(digest),
                Err(e) => TaskOutcome::Skipped(SkipReason::Io(e)),
            }
        })?;

        let mut output = PassOutput::default();
        for (idx, outcome) in results {
            match outcome {
                TaskOutcome::Ready(digest) => {
                    self.content.remember(records[idx].path(), digest);
                    records[idx].fill_content_hash(digest);
                }
                TaskOutcome::Skipped(reason) => {
                    note_skip(&mut output, PHASE_EXACT, records[idx].path(), &reason);
                }
            }
        }

        // digest -> members, in order of first appearance
        let mut slots: HashMap<u64, usize> = HashMap::new();
        let mut buckets: Vec<Vec<usize>> = Vec::new();
        for (idx, record) in records.iter().enumerate() {
            let Some(digest) = record.content_hash() else {
                continue;
            };
            let slot = *slots.entry(digest).or_insert_with(|| {
                buckets.push(Vec::new());
                buckets.len() - 1
            });
            buckets[slot].push(idx);
        }

        output.candidates = buckets
            .into_iter()
            .filter(|members| members.len() >= 2)
            .map(|members| Candidate::new(members, DetectionMethod::Exact, 1.0))
            .collect();

        self.check_deadline(started)?;
        Ok(output)
    }

    fn image_pass(&self, records: &[FileRecord], started: Instant) -> Result<PassOutput, PassFailure> {
        let jobs: Vec<(usize, PathBuf)> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_image() && r.perceptual_hash().is_none())
            .map(|(idx, r)| (idx, r.path().to_path_buf()))
            .collect();

        log::debug!("Image pass: {} images need hashing", jobs.len());

        let hasher = self.perceptual;
        let results = self.dispatch(PHASE_PERCEPTUAL, jobs, started, move |path| {
            match hasher.hash_path(path) {
                Ok(Some(hash)) => TaskOutcome::Ready(hash),
                Ok(None) => TaskOutcome::Skipped(SkipReason::Undecodable),
                Err(e) => TaskOutcome::Skipped(SkipReason::Io(e)),
            }
        })?;

        let mut output = PassOutput::default();
        for (idx, outcome) in results {
            match outcome {
                TaskOutcome::Ready(hash) => {
                    records[idx].fill_perceptual_hash(hash);
                }
                TaskOutcome::Skipped(reason) => {
                    note_skip(&mut output, PHASE_PERCEPTUAL, records[idx].path(), &reason);
                }
            }
        }

        let hashes: Vec<(usize, PerceptualHash)> = records
            .iter()
            .enumerate()
            .filter_map(|(idx, r)| r.perceptual_hash().map(|h| (idx, h.clone())))
            .collect();
        output.candidates = self.matcher.group(&hashes);

        self.check_deadline(started)?;
        Ok(output)
    }

    fn name_pass(&self, records: &[FileRecord], started: Instant) -> Result<PassOutput, PassFailure> {
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(PHASE_NAMES, records.len());
        }

        let candidates = self.pool.install(|| self.names.group(records));

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(PHASE_NAMES);
        }

        self.check_deadline(started)?;
        Ok(PassOutput {
            candidates,
            ..PassOutput::default()
        })
    }

    fn check_deadline(&self, started: Instant) -> Result<(), PassFailure> {
        let elapsed = started.elapsed();
        if elapsed >= self.config.pass_timeout {
            return Err(PassFailure::Overran {
                elapsed,
                limit: self.config.pass_timeout,
            });
        }
        Ok(())
    }

    /// Run `work` for every job on the pool and collect outcomes by record index.
    ///
    /// Results arrive in completion order. A job running longer than the task
    /// timeout is settled as [`SkipReason::TimedOut`] without waiting for it,
    /// and its late result is dropped. Jobs whose worker died without
    /// reporting come back as [`SkipReason::Aborted`].
    fn dispatch<T, F>(
        &self,
        phase: &str,
        jobs: Vec<(usize, PathBuf)>,
        started: Instant,
        work: F,
    ) -> Result<Vec<(usize, TaskOutcome<T>)>, PassFailure>
    where
        T: Send + 'static,
        F: Fn(&Path) -> TaskOutcome<T> + Send + Sync + 'static,
    {
        let total = jobs.len();
        let callback = self.config.progress_callback.clone();
        if let Some(ref cb) = callback {
            cb.on_phase_start(phase, total);
        }

        let work = Arc::new(work);
        let task_timeout = self.config.task_timeout;
        let task_starts: Arc<Vec<OnceLock<Instant>>> =
            Arc::new((0..total).map(|_| OnceLock::new()).collect());
        let (tx, rx) = mpsc::channel::<(usize, PathBuf, TaskOutcome<T>)>();
        let mut jobs_by_slot = Vec::with_capacity(total);

        for (slot, (idx, path)) in jobs.into_iter().enumerate() {
            jobs_by_slot.push((idx, path.clone()));
            let tx = tx.clone();
            let work = Arc::clone(&work);
            let task_starts = Arc::clone(&task_starts);
            let shutdown = self.config.shutdown_flag.clone();

            self.pool.spawn(move || {
                let outcome = if shutdown.is_some_and(|f| f.load(Ordering::SeqCst)) {
                    TaskOutcome::Skipped(SkipReason::Cancelled)
                } else {
                    let task_started = *task_starts[slot].get_or_init(Instant::now);
                    let outcome = work(&path);
                    if task_started.elapsed() > task_timeout {
                        TaskOutcome::Skipped(SkipReason::TimedOut)
                    } else {
                        outcome
                    }
                };
                // Receiver is gone once the pass gave up.
                let _ = tx.send((slot, path, outcome));
            });
        }
        drop(tx);

        let limit = self.config.pass_timeout;
        let mut settled = vec![false; total];
        let mut results = Vec::with_capacity(total);

        while results.len() < total {
            // Give up on running tasks past their own timeout.
            let mut wait = limit.saturating_sub(started.elapsed());
            for slot in 0..total {
                if settled[slot] {
                    continue;
                }
                let Some(task_started) = task_starts[slot].get() else {
                    continue;
                };
                let running = task_started.elapsed();
                if running >= task_timeout {
                    settled[slot] = true;
                    results.push((jobs_by_slot[slot].0, TaskOutcome::Skipped(SkipReason::TimedOut)));
                    log::debug!(
                        "[{phase}] No result for {} within {:?}",
                        jobs_by_slot[slot].1.display(),
                        task_timeout
                    );
                } else {
                    wait = wait.min(task_timeout - running);
                }
            }
            if results.len() == total {
                break;
            }

            match rx.recv_timeout(wait) {
                Ok((slot, path, outcome)) => {
                    if settled[slot] {
                        continue;
                    }
                    settled[slot] = true;
                    results.push((jobs_by_slot[slot].0, outcome));
                    if let Some(ref cb) = callback {
                        cb.on_progress(phase, results.len(), &path.to_string_lossy());
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if started.elapsed() < limit {
                        continue;
                    }
                    if let Some(ref cb) = callback {
                        cb.on_phase_end(phase);
                    }
                    return Err(PassFailure::TimedOut {
                        pending: total - results.len(),
                        limit,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    for (slot, done) in settled.iter().enumerate() {
                        if !done {
                            results.push((jobs_by_slot[slot].0, TaskOutcome::Skipped(SkipReason::Aborted)));
                        }
                    }
                    break;
                }
            }
        }

        if let Some(ref cb) = callback {
            cb.on_phase_end(phase);
        }
        Ok(results)
    }
}

fn note_skip(output: &mut PassOutput, phase: &str, path: &Path, reason: &SkipReason) {
    output.skipped += 1;
    match reason {
        SkipReason::Undecodable | SkipReason::Cancelled => {
            log::debug!("[{phase}] Skipping {}: {reason}", path.display());
        }
        SkipReason::TimedOut => {
            output.timed_out += 1;
            log::warn!("[{phase}] Skipping {}: {reason}", path.display());
        }
        SkipReason::Io(_) | SkipReason::Aborted => {
            log::warn!("[{phase}] Skipping {}: {reason}", path.display());
        }
    }
}

fn join_pass(handle: ScopedJoinHandle<'_, Result<PassOutput, PassFailure>>) -> Result<PassOutput, PassFailure> {
    handle.join().unwrap_or_else(|payload| Err(PassFailure::from_panic(payload)))
}
