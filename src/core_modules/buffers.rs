// THEORY:
// All per-frame scratch memory lives in one `FrameBuffers` value owned by the
// detector. Buffers are sized for the current resolution and reused frame after
// frame; a resolution change reshapes them in place instead of dropping and
// reallocating. Nothing in here carries meaning from one frame to the next:
// `reset` brings every per-frame table back to its empty state, and `allocate`
// with new dimensions clears everything.

use crate::core_modules::blob::{BlobMatrix, blob_matrix_with_capacity};
use crate::core_modules::body_part::{BACKGROUND, Label};
use crate::core_modules::grid::{ComponentIdMap, Grid, LabelImage};
use crate::error::{DetectorError, Result};
use nalgebra::Vector3;
use tracing::debug;

/// Blobs reserved per label so typical frames never reallocate.
pub const DEFAULT_BLOB_CAPACITY_HINT: usize = 5000;

/// Running position sum and point count of one component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionStat {
    pub sum: Vector3<f64>,
    pub count: u32,
}

impl Default for RegionStat {
    fn default() -> Self {
        Self {
            sum: Vector3::zeros(),
            count: 0,
        }
    }
}

/// Where a component's blob was placed: `matrix[label][lid]`.
pub type RemapEntry = Option<(Label, usize)>;

pub struct FrameBuffers {
    rows: usize,
    cols: usize,
    blob_capacity_hint: usize,
    /// Set when a failed frame may have left a buffer misshapen.
    needs_reshape: bool,
    pub(crate) raw_labels: LabelImage,
    pub(crate) smoothed_labels: LabelImage,
    pub(crate) components: ComponentIdMap,
    pub(crate) region_stats: Vec<RegionStat>,
    /// Accumulator for pixels without a component. Diagnostic only.
    pub(crate) invalid_region: RegionStat,
    pub(crate) remap: Vec<RemapEntry>,
    pub(crate) blob_matrix: BlobMatrix,
}

impl FrameBuffers {
    pub fn new(rows: usize, cols: usize, blob_capacity_hint: usize) -> Result<Self> {
        let mut buffers = Self {
            rows: 0,
            cols: 0,
            blob_capacity_hint,
            needs_reshape: true,
            raw_labels: Grid::new(0, 0, BACKGROUND),
            smoothed_labels: Grid::new(0, 0, BACKGROUND),
            components: Grid::new(0, 0, None),
            region_stats: Vec::new(),
            invalid_region: RegionStat::default(),
            remap: Vec::new(),
            blob_matrix: blob_matrix_with_capacity(blob_capacity_hint),
        };
        buffers.allocate(rows, cols)?;
        Ok(buffers)
    }

    /// Sizes every buffer for `rows x cols`. Returns `false` without touching
    /// anything when the dimensions are unchanged.
    pub fn allocate(&mut self, rows: usize, cols: usize) -> Result<bool> {
        if rows == 0 || cols == 0 || u32::try_from(rows * cols).is_err() {
            return Err(DetectorError::InvalidResolution { rows, cols });
        }
        if !self.needs_reshape && rows == self.rows && cols == self.cols {
            return Ok(false);
        }
        debug!(from = ?(self.rows, self.cols), to = ?(rows, cols), "resizing frame buffers");

        let len = rows * cols;
        self.needs_reshape = false;
        self.rows = rows;
        self.cols = cols;
        self.raw_labels.resize(rows, cols, BACKGROUND);
        self.smoothed_labels.resize(rows, cols, BACKGROUND);
        self.components.resize(rows, cols, None);
        self.region_stats.clear();
        self.region_stats.resize(len, RegionStat::default());
        self.remap.clear();
        self.remap.resize(len, None);
        self.invalid_region = RegionStat::default();
        for blobs in &mut self.blob_matrix {
            blobs.clear();
            blobs.reserve(self.blob_capacity_hint);
        }
        Ok(true)
    }

    /// Clears the per-frame reduction state: region stats, remap and blob lists.
    pub fn reset(&mut self) {
        self.region_stats.fill(RegionStat::default());
        self.invalid_region = RegionStat::default();
        self.remap.fill(None);
        for blobs in &mut self.blob_matrix {
            blobs.clear();
        }
    }

    /// Drops the current frame's blobs and forces the next `allocate` to
    /// reshape every buffer, whatever the dimensions.
    pub fn discard(&mut self) {
        self.needs_reshape = true;
        for blobs in &mut self.blob_matrix {
            blobs.clear();
        }
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn blob_capacity_hint(&self) -> usize {
        self.blob_capacity_hint
    }

    pub fn raw_labels(&self) -> &LabelImage {
        &self.raw_labels
    }

    pub fn smoothed_labels(&self) -> &LabelImage {
        &self.smoothed_labels
    }

    pub fn components(&self) -> &ComponentIdMap {
        &self.components
    }

    pub fn blob_matrix(&self) -> &BlobMatrix {
        &self.blob_matrix
    }

    pub fn region_stats(&self) -> &[RegionStat] {
        &self.region_stats
    }
}
