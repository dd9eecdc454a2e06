//! Progress tracking: completion percentage, throughput and ETA.
//!
//! Figures are advisory and never drive control flow.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;
use tracing::info;

/// Point-in-time progress figures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// Completion percentage, 0..=100.
    pub percent: u64,
    /// Records per second since the start.
    pub rate_per_second: f64,
    /// Estimated seconds remaining (0 when unknown or done).
    pub eta_seconds: f64,
}

/// Computes progress from counters and elapsed time.
#[derive(Debug, Clone, Copy)]
pub struct ProgressTracker {
    started_at: Instant,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Starts tracking now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    /// Computes a snapshot for explicit counters and elapsed seconds.
    #[must_use]
    pub fn update(migrated: u64, total: u64, elapsed_seconds: f64) -> ProgressSnapshot {
        let rate_per_second = if elapsed_seconds > 0.0 {
            migrated as f64 / elapsed_seconds
        } else {
            0.0
        };

        if total == 0 {
            return ProgressSnapshot {
                percent: 100,
                rate_per_second,
                eta_seconds: 0.0,
            };
        }

        let percent = ((100.0 * migrated as f64 / total as f64).round() as u64).min(100);
        let eta_seconds = if rate_per_second > 0.0 {
            (total.saturating_sub(migrated)) as f64 / rate_per_second
        } else {
            0.0
        };

        ProgressSnapshot {
            percent,
            rate_per_second,
            eta_seconds,
        }
    }

    /// Computes a snapshot using the time elapsed since [`ProgressTracker::new`].
    #[must_use]
    pub fn snapshot(&self, migrated: u64, total: u64) -> ProgressSnapshot {
        Self::update(migrated, total, self.started_at.elapsed().as_secs_f64())
    }
}

/// Renders progress to a terminal bar and the log.
pub struct ProgressReporter {
    tracker: ProgressTracker,
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Creates a reporter for `total` records. `visible = false` hides the bar.
    #[must_use]
    pub fn new(total: u64, visible: bool) -> Self {
        let bar = if visible {
            create_progress_bar(total)
        } else {
            ProgressBar::hidden()
        };
        Self {
            tracker: ProgressTracker::new(),
            bar,
        }
    }

    /// Records that `migrated` of `total` records are done.
    pub fn record(&self, migrated: u64, total: u64) -> ProgressSnapshot {
        let snap = self.tracker.snapshot(migrated, total);
        self.bar.set_position(migrated);
        info!(
            "Progress: {}% ({}/{}) | Speed: {:.1} pts/sec | ETA: {}s",
            snap.percent,
            migrated,
            total,
            snap.rate_per_second,
            snap.eta_seconds as u64
        );
        snap
    }

    /// Completes the bar with a final message.
    pub fn finish(&self, message: &'static str) {
        self.bar.finish_with_message(message);
    }

    /// Leaves the bar at its current position.
    pub fn abandon(&self, message: &'static str) {
        self.bar.abandon_with_message(message);
    }
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = if total > 0 {
        ProgressBar::new(total)
    } else {
        ProgressBar::new_spinner()
    };

    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    pb
}
