//! Progress reporting utilities using indicatif.
//!
//! The detector reports through the [`ProgressCallback`] trait. Its three
//! passes run concurrently, so [`Progress`] keeps one bar per phase name
//! inside a shared [`MultiProgress`].

use std::collections::HashMap;
use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Phase name reported by the exact-content pass.
pub const PHASE_EXACT: &str = "exact";
/// Phase name reported by the perceptual-image pass.
pub const PHASE_PERCEPTUAL: &str = "perceptual";
/// Phase name reported by the filename pass.
pub const PHASE_NAMES: &str = "names";

/// Progress callback for detection phases.
///
/// Implement this trait to receive progress updates from the detector.
/// Calls for different phases may arrive from different threads.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (see the `PHASE_*` constants)
    /// * `total` - Total number of items to process
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for each item processed.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase
    /// * `current` - Number of items finished so far (1-based)
    /// * `path` - Path that was just processed
    fn on_progress(&self, phase: &str, current: usize, path: &str);

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);
}

/// Progress reporter using indicatif.
pub struct Progress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    ///
    /// # Examples
    ///
    /// ```
    /// use dupesift::progress::Progress;
    ///
    /// let progress = Progress::new(true);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            quiet,
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] {prefix:>10} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn label(phase: &str) -> &str {
        match phase {
            PHASE_EXACT => "content",
            PHASE_PERCEPTUAL => "images",
            PHASE_NAMES => "names",
            other => other,
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }
        let pb = self.multi.add(ProgressBar::new(total as u64));
        pb.set_style(Self::style());
        pb.set_prefix(Self::label(phase).to_string());
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(phase.to_string(), pb);
        }
    }

    fn on_progress(&self, phase: &str, current: usize, path: &str) {
        if self.quiet {
            return;
        }
        if let Ok(bars) = self.bars.lock() {
            if let Some(pb) = bars.get(phase) {
                pb.set_position(current as u64);
                pb.set_message(path.to_string());
            }
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        if let Ok(mut bars) = self.bars.lock() {
            if let Some(pb) = bars.remove(phase) {
                pb.finish_and_clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_progress_tracks_nothing() {
        let progress = Progress::new(true);
        progress.on_phase_start(PHASE_EXACT, 10);
        progress.on_progress(PHASE_EXACT, 1, "/a");
        progress.on_phase_end(PHASE_EXACT);
        assert!(progress.bars.lock().unwrap().is_empty());
    }

    #[test]
    fn test_bars_are_per_phase() {
        let progress = Progress::new(false);
        progress.on_phase_start(PHASE_EXACT, 3);
        progress.on_phase_start(PHASE_PERCEPTUAL, 2);
        assert_eq!(progress.bars.lock().unwrap().len(), 2);

        progress.on_progress(PHASE_EXACT, 2, "/x");
        assert_eq!(progress.bars.lock().unwrap()[PHASE_EXACT].position(), 2);

        progress.on_phase_end(PHASE_EXACT);
        progress.on_phase_end(PHASE_PERCEPTUAL);
        assert!(progress.bars.lock().unwrap().is_empty());
    }

    #[test]
    fn test_labels() {
        assert_eq!(Progress::label(PHASE_EXACT), "content");
        assert_eq!(Progress::label("other"), "other");
    }

    #[test]
    fn test_progress_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Progress>();
    }
}
