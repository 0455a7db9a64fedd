//! Throughput estimation for backend write progress
//!
//! The backend reports how much data it has committed in coarse steps and at
//! irregular intervals (lines arrive in bursts). [`ThroughputEstimator`] turns
//! those `(bytes, timestamp)` samples into a smoothed rate that is only
//! reported when it changes noticeably, and keeps enough state to compute the
//! overall average of a run.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Instant;

/// Number of instantaneous rates averaged into the smoothed rate
pub const WINDOW_SIZE: usize = 5;

/// Minimum change (bytes/s) of the smoothed rate before a new update is emitted
pub const SPEED_CHANGE_THRESHOLD: u64 = 1024;

/// Throughput of a 1x CD in bytes per second (150 KiB/s)
pub const CD_BASELINE_BPS: u64 = 150 * 1024;

/// A smoothed speed figure ready to be reported
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeedUpdate {
    /// Smoothed rate in bytes per second
    pub bytes_per_sec: u64,

    /// Rate relative to the 1x CD baseline
    pub multiplier: f64,
}

impl SpeedUpdate {
    /// Build an update for the given rate
    pub fn new(bytes_per_sec: u64) -> Self {
        Self {
            bytes_per_sec,
            multiplier: speed_multiplier(bytes_per_sec),
        }
    }
}

/// Sliding-window rate estimator
#[derive(Debug, Default)]
pub struct ThroughputEstimator {
    first: Option<(Instant, u64)>,
    last: Option<(Instant, u64)>,
    rates: VecDeque<u64>,
    last_emitted: Option<u64>,
}

impl ThroughputEstimator {
    /// Create an empty estimator
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all samples, ready for a new run
    pub fn reset(&mut self) {
        self.first = None;
        self.last = None;
        self.rates.clear();
        self.last_emitted = None;
    }

    /// Record the total number of bytes written so far at `at`
    ///
    /// Returns an update when the smoothed rate moved by more than
    /// [`SPEED_CHANGE_THRESHOLD`] since the last emitted one. Samples that do
    /// not advance both the byte count and the clock are ignored.
    pub fn sample(&mut self, total_bytes: u64, at: Instant) -> Option<SpeedUpdate> {
        let Some((last_at, last_bytes)) = self.last else {
            self.first = Some((at, total_bytes));
            self.last = Some((at, total_bytes));
            return None;
        };

        if total_bytes <= last_bytes {
            return None;
        }

        let elapsed = at.saturating_duration_since(last_at);
        if elapsed.is_zero() {
            return None;
        }

        let rate = ((total_bytes - last_bytes) as f64 / elapsed.as_secs_f64()) as u64;
        self.last = Some((at, total_bytes));

        if self.rates.len() >= WINDOW_SIZE {
            self.rates.pop_front();
        }
        self.rates.push_back(rate);

        let smoothed = self.current_rate();
        let changed = match self.last_emitted {
            None => true,
            Some(previous) => smoothed.abs_diff(previous) > SPEED_CHANGE_THRESHOLD,
        };

        if changed {
            self.last_emitted = Some(smoothed);
            Some(SpeedUpdate::new(smoothed))
        } else {
            None
        }
    }

    /// Moving average over the current window (0 until two samples arrived)
    pub fn current_rate(&self) -> u64 {
        if self.rates.is_empty() {
            return 0;
        }
        self.rates.iter().sum::<u64>() / self.rates.len() as u64
    }

    /// Mean rate over the whole run: total bytes over total elapsed time
    pub fn average(&self) -> u64 {
        let (Some((first_at, first_bytes)), Some((last_at, last_bytes))) = (self.first, self.last)
        else {
            return 0;
        };

        let elapsed = last_at.saturating_duration_since(first_at);
        if elapsed.is_zero() {
            return 0;
        }

        (last_bytes.saturating_sub(first_bytes) as f64 / elapsed.as_secs_f64()) as u64
    }
}

/// Rate relative to the 1x CD baseline
pub fn speed_multiplier(bytes_per_sec: u64) -> f64 {
    bytes_per_sec as f64 / CD_BASELINE_BPS as f64
}

/// Format speed for display
pub fn format_speed(bytes_per_second: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes_per_second >= GB {
        format!("{:.1} GB/s", bytes_per_second as f64 / GB as f64)
    } else if bytes_per_second >= MB {
        format!("{:.1} MB/s", bytes_per_second as f64 / MB as f64)
    } else if bytes_per_second >= KB {
        format!("{:.1} KB/s", bytes_per_second as f64 / KB as f64)
    } else {
        format!("{} B/s", bytes_per_second)
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
