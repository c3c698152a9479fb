// THEORY:
// All tunables of the detector in one plain struct. Every field has a default
// that matches a 640x480 millimetre-depth sensor, and `validate` runs once at
// construction so a detector never starts with settings that would make a
// stage misbehave mid-stream.

use crate::core_modules::blob_reducer::DEFAULT_MAX_CLUSTER_SIZE;
use crate::core_modules::buffers::DEFAULT_BLOB_CAPACITY_HINT;
use crate::core_modules::components::{DEFAULT_CLUSTER_TOLERANCE, DEFAULT_DEPTH_SCALE};
use crate::core_modules::smoother::{DEFAULT_SMOOTH_DEPTH_TOLERANCE, DEFAULT_SMOOTH_WINDOW, MAX_SMOOTH_WINDOW};
use crate::error::{DetectorError, Result};

/// Configuration for a `BodyPartsDetector`.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Frame height the buffers are first sized for. Frames of another size
    /// are still accepted; buffers are resized on the fly.
    pub rows: usize,
    /// Frame width the buffers are first sized for.
    pub cols: usize,
    /// Largest component, in pixels, that may become a blob (inclusive).
    pub max_cluster_size: usize,
    /// Largest depth gap, in cloud units, between adjacent pixels of one component.
    pub cluster_tolerance: f32,
    /// Cloud units per raw depth unit.
    pub depth_scale: f32,
    /// Side of the square smoothing window. Must be odd and at most 255.
    pub smooth_window: usize,
    /// Largest depth difference, in raw depth units, for a neighbour to vote
    /// during smoothing.
    pub smooth_depth_tolerance: u16,
    /// Blobs reserved per label. A hint, not a limit.
    pub blob_capacity_hint: usize,
    /// `None` runs the per-pixel stages on the global rayon pool. `Some(n)` gives
    /// the detector its own pool of `n` threads, `Some(0)` one per logical CPU.
    pub threads: Option<usize>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            rows: 480,
            cols: 640,
            max_cluster_size: DEFAULT_MAX_CLUSTER_SIZE,
            cluster_tolerance: DEFAULT_CLUSTER_TOLERANCE,
            depth_scale: DEFAULT_DEPTH_SCALE,
            smooth_window: DEFAULT_SMOOTH_WINDOW,
            smooth_depth_tolerance: DEFAULT_SMOOTH_DEPTH_TOLERANCE,
            blob_capacity_hint: DEFAULT_BLOB_CAPACITY_HINT,
            threads: None,
        }
    }
}

impl DetectorConfig {
    /// Default settings for a `rows x cols` sensor.
    pub fn with_resolution(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(DetectorError::InvalidResolution {
                rows: self.rows,
                cols: self.cols,
            });
        }
        if self.max_cluster_size == 0 {
            return Err(DetectorError::Config("max_cluster_size must be at least 1".into()));
        }
        if !(self.cluster_tolerance > 0.0) {
            return Err(DetectorError::Config(format!(
                "cluster_tolerance must be positive, got {}",
                self.cluster_tolerance
            )));
        }
        if !(self.depth_scale > 0.0) {
            return Err(DetectorError::Config(format!(
                "depth_scale must be positive, got {}",
                self.depth_scale
            )));
        }
        if self.smooth_window % 2 == 0 || self.smooth_window > MAX_SMOOTH_WINDOW {
            return Err(DetectorError::Config(format!(
                "smooth_window must be odd and at most {}, got {}",
                MAX_SMOOTH_WINDOW, self.smooth_window
            )));
        }
        Ok(())
    }

    /// Number of worker threads the detector's own pool should use, if any.
    pub(crate) fn pool_threads(&self) -> Option<usize> {
        self.threads.map(|n| if n == 0 { num_cpus::get() } else { n })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DetectorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_cluster_size, 25_000);
        assert_eq!(config.smooth_window, 5);
        assert_eq!(config.smooth_depth_tolerance, 300);
        assert!((config.cluster_tolerance - 0.05).abs() < f32::EPSILON);
    }

    #[test]
    fn rejects_bad_values() {
        let bad = [
            DetectorConfig::with_resolution(0, 10),
            DetectorConfig { smooth_window: 4, ..Default::default() },
            DetectorConfig { smooth_window: 257, ..DetectorConfig::with_resolution(260, 260) },
            DetectorConfig { cluster_tolerance: 0.0, ..Default::default() },
            DetectorConfig { depth_scale: f32::NAN, ..Default::default() },
            DetectorConfig { max_cluster_size: 0, ..Default::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?}", config);
        }
    }

    #[test]
    fn zero_threads_means_one_per_cpu() {
        let config = DetectorConfig { threads: Some(0), ..Default::default() };
        assert_eq!(config.pool_threads(), Some(num_cpus::get()));
        assert_eq!(DetectorConfig::default().pool_threads(), None);
    }
}
