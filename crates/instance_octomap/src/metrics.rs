//! Pipeline statistics: per-stage timings and drop counters.
//!
//! # Usage
//!
//! ```ignore
//! let metrics = mapper.metrics();
//! println!(
//!   "insert avg {:.0}us, {} processed, {} stale",
//!   metrics.insertion.average(),
//!   metrics.processed,
//!   metrics.stale,
//! );
//! ```

use std::collections::VecDeque;

use web_time::Instant;

/// Samples kept per timing window.
pub const TIMING_WINDOW: usize = 128;

/// Rolling window for storing recent values (e.g., timing history).
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    buffer: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a new value, evicting the oldest if at capacity.
    pub fn push(&mut self, value: T) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buffer.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.buffer.back()
    }
}

impl RollingWindow<u64> {
    pub fn sum(&self) -> u64 {
        self.buffer.iter().sum()
    }

    pub fn average(&self) -> f64 {
        if self.buffer.is_empty() {
            0.0
        } else {
            self.sum() as f64 / self.buffer.len() as f64
        }
    }

    pub fn min_max(&self) -> Option<(u64, u64)> {
        let min = *self.buffer.iter().min()?;
        let max = *self.buffer.iter().max()?;
        Some((min, max))
    }
}

impl Default for RollingWindow<u64> {
    fn default() -> Self {
        Self::new(TIMING_WINDOW)
    }
}

/// Pipeline stages with their own timing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Projection,
    Tracking,
    Insertion,
    Export,
    Publish,
}

/// Timings in microseconds and scan counters of one mapper.
#[derive(Debug, Clone, Default)]
pub struct MapMetrics {
    pub projection: RollingWindow<u64>,
    pub tracking: RollingWindow<u64>,
    pub insertion: RollingWindow<u64>,
    pub export: RollingWindow<u64>,
    pub publish: RollingWindow<u64>,

    /// Scans that went through the whole pipeline.
    pub processed: u64,
    /// Scans older than the last reset.
    pub stale: u64,
    /// Scans dropped because the pose could not be resolved in time.
    pub pose_dropped: u64,
    /// Scans dropped because the projector failed.
    pub projection_failed: u64,
    /// Scans replaced by a newer one before the worker got to them.
    pub skipped: u64,
    /// Number of resets.
    pub resets: u64,
}

impl MapMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(&self, stage: Stage) -> &RollingWindow<u64> {
        match stage {
            Stage::Projection => &self.projection,
            Stage::Tracking => &self.tracking,
            Stage::Insertion => &self.insertion,
            Stage::Export => &self.export,
            Stage::Publish => &self.publish,
        }
    }

    fn window_mut(&mut self, stage: Stage) -> &mut RollingWindow<u64> {
        match stage {
            Stage::Projection => &mut self.projection,
            Stage::Tracking => &mut self.tracking,
            Stage::Insertion => &mut self.insertion,
            Stage::Export => &mut self.export,
            Stage::Publish => &mut self.publish,
        }
    }

    pub fn record(&mut self, stage: Stage, timing_us: u64) {
        self.window_mut(stage).push(timing_us);
    }

    /// Run `f` and record its duration under `stage`.
    pub fn time<R>(&mut self, stage: Stage, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        self.record(stage, start.elapsed().as_micros() as u64);
        result
    }

    /// Mean time of one full scan over all stages, in microseconds.
    pub fn avg_scan_us(&self) -> f64 {
        [
            Stage::Projection,
            Stage::Tracking,
            Stage::Insertion,
            Stage::Export,
            Stage::Publish,
        ]
        .into_iter()
        .map(|stage| self.window(stage).average())
        .sum()
    }

    /// Clear timings. Counters are cumulative and survive.
    pub fn clear_timings(&mut self) {
        self.projection.clear();
        self.tracking.clear();
        self.insertion.clear();
        self.export.clear();
        self.publish.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_window() {
        let mut window = RollingWindow::new(3);
        assert!(window.is_empty());
        assert_eq!(window.min_max(), None);

        window.push(10u64);
        window.push(20);
        window.push(30);
        assert_eq!(window.sum(), 60);
        assert_eq!(window.average(), 20.0);

        window.push(40);
        assert_eq!(window.len(), 3);
        assert_eq!(window.sum(), 90);
        assert_eq!(window.min_max(), Some((20, 40)));
        assert_eq!(window.last(), Some(&40));
    }

    #[test]
    fn test_stage_timing() {
        let mut metrics = MapMetrics::new();
        metrics.record(Stage::Insertion, 1000);
        metrics.record(Stage::Insertion, 3000);
        metrics.record(Stage::Export, 500);

        assert_eq!(metrics.window(Stage::Insertion).average(), 2000.0);
        assert_eq!(metrics.avg_scan_us(), 2500.0);

        let value = metrics.time(Stage::Publish, || 7);
        assert_eq!(value, 7);
        assert_eq!(metrics.publish.len(), 1);
    }

    #[test]
    fn test_clear_keeps_counters() {
        let mut metrics = MapMetrics::new();
        metrics.processed = 4;
        metrics.record(Stage::Projection, 10);
        metrics.clear_timings();
        assert!(metrics.projection.is_empty());
        assert_eq!(metrics.processed, 4);
    }
}
