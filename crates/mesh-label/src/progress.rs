//! Progress reporting, cancellation and cost estimation.
//!
//! The isolated-face search is the only operation in this crate whose cost
//! is superlinear. Hosts that run it off their interactive path can pass a
//! [`ProgressCallback`] to observe it and cancel it.
//!
//! ```ignore
//! use mesh_label::progress::ProgressCallback;
//!
//! let callback: ProgressCallback = Box::new(|progress| {
//!     println!("{}% {}", progress.percent(), progress.message);
//!     true // return false to cancel
//! });
//!
//! let report = detect_isolated_faces(&topology, &positions, &params, Some(&callback))?;
//! ```

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::isolated::NeighborSearch;

/// Progress information passed to callbacks.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Current step (0-based).
    pub current: u64,

    /// Total number of steps.
    pub total: u64,

    /// Human-readable message describing current operation.
    pub message: String,

    /// Elapsed time since operation started.
    pub elapsed: Duration,

    /// Estimated time remaining (if available).
    pub estimated_remaining: Option<Duration>,
}

impl Progress {
    /// Create a new progress report.
    pub fn new(current: u64, total: u64, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
            elapsed: Duration::ZERO,
            estimated_remaining: None,
        }
    }

    /// Get progress as a fraction (0.0 to 1.0).
    #[inline]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current as f64) / (self.total as f64)
        }
    }

    /// Get progress as a percentage (0 to 100).
    #[inline]
    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0).round() as u32
    }
}

/// Callback function for progress reporting.
///
/// Returns `true` to continue, `false` to request cancellation.
pub type ProgressCallback = Box<dyn Fn(&Progress) -> bool + Send + Sync>;

/// A thread-safe progress tracker, updated from rayon workers.
#[derive(Debug)]
pub struct ProgressTracker {
    current: AtomicU64,
    total: u64,
    cancelled: AtomicBool,
    start_time: Instant,
    last_callback_time: Mutex<Instant>,
    callback_interval: Duration,
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new(total: u64) -> Self {
        Self::with_interval(total, Duration::from_millis(100))
    }

    /// Create a tracker with custom callback interval.
    pub fn with_interval(total: u64, interval: Duration) -> Self {
        Self {
            current: AtomicU64::new(0),
            total,
            cancelled: AtomicBool::new(false),
            start_time: Instant::now(),
            last_callback_time: Mutex::new(Instant::now()),
            callback_interval: interval,
        }
    }

    /// Increment progress by one.
    #[inline]
    pub fn increment(&self) {
        self.current.fetch_add(1, Ordering::Relaxed);
    }

    /// Set the current progress value.
    #[inline]
    pub fn set(&self, value: u64) {
        self.current.store(value, Ordering::Relaxed);
    }

    /// Get the current progress value.
    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    /// Get the total count.
    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Check if cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Get elapsed time.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Estimate remaining time based on current progress.
    pub fn estimated_remaining(&self) -> Option<Duration> {
        let current = self.current();
        if current == 0 {
            return None;
        }

        let rate = current as f64 / self.elapsed().as_secs_f64();
        if rate > 0.0 {
            let remaining = self.total.saturating_sub(current) as f64 / rate;
            Some(Duration::from_secs_f64(remaining))
        } else {
            None
        }
    }

    /// Create a Progress snapshot.
    pub fn snapshot(&self, message: impl Into<String>) -> Progress {
        Progress {
            current: self.current(),
            total: self.total,
            message: message.into(),
            elapsed: self.elapsed(),
            estimated_remaining: self.estimated_remaining(),
        }
    }

    /// Call the callback if enough time has passed since the last call.
    ///
    /// Returns `false` once cancellation has been requested.
    pub fn maybe_callback(
        &self,
        callback: Option<&ProgressCallback>,
        message: impl Into<String>,
    ) -> bool {
        if self.is_cancelled() {
            return false;
        }

        let Some(callback) = callback else {
            return true;
        };

        let now = Instant::now();
        {
            // A poisoned lock only means another worker panicked mid-update;
            // the timestamp is still usable.
            let mut last = self
                .last_callback_time
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if now.duration_since(*last) < self.callback_interval {
                return true;
            }
            *last = now;
        }

        let should_continue = callback(&self.snapshot(message));
        if !should_continue {
            self.cancel();
        }
        should_continue
    }
}

// ============================================================================
// Search Cost Estimation
// ============================================================================

/// Rough cost of a near-duplicate vertex search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchEstimate {
    pub seconds: f64,
    pub complexity: &'static str,
}

/// Estimate how long the isolated-face search takes for `isolated_faces`
/// faces over `vertex_count` vertices.
///
/// Figures assume a mid-range desktop CPU and only decide whether the
/// search deserves a warning.
pub fn estimate_search_time(
    vertex_count: usize,
    isolated_faces: usize,
    search: NeighborSearch,
) -> SearchEstimate {
    let v = vertex_count as f64;
    let queries = 3.0 * isolated_faces as f64;

    match search {
        NeighborSearch::BruteForce => SearchEstimate {
            seconds: queries * v / 200_000_000.0,
            complexity: "O(isolated × V)",
        },
        NeighborSearch::KdTree => {
            let log_v = v.max(2.0).ln();
            SearchEstimate {
                seconds: v * log_v / 20_000_000.0 + queries * log_v / 5_000_000.0,
                complexity: "O(V log V + isolated × log V)",
            }
        }
    }
}
