// THEORY:
// Every per-pixel buffer in the detector is a dense, row-major `rows x cols`
// grid. Depth frames, label images, component maps and organised point clouds
// only differ in their element type, so they share one container. A pixel's
// flat index (`row * cols + col`) is the common currency between stages: the
// point cloud is index-aligned with the depth frame, and blobs store flat
// indices as their membership.

use crate::core_modules::body_part::Label;
use crate::error::{DetectorError, Result};
use nalgebra::Point3;

/// A dense row-major 2D buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

/// Raw sensor depth, `0` meaning "no reading".
pub type DepthFrame = Grid<u16>;
/// One body-part label per pixel.
pub type LabelImage = Grid<Label>;
/// One component per pixel; `None` marks pixels that belong to no component.
pub type ComponentIdMap = Grid<Option<ComponentId>>;
/// An organised cloud: one back-projected point per depth pixel.
pub type PointCloud = Grid<Point3<f32>>;

/// Identifies a connected component within one frame. Values lie in
/// `[0, rows * cols)` so they can index per-component tables directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub u32);

impl ComponentId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl<T: Clone> Grid<T> {
    pub fn new(rows: usize, cols: usize, fill: T) -> Self {
        Self {
            rows,
            cols,
            data: vec![fill; rows * cols],
        }
    }

    /// Reshapes the grid in place, reusing the existing allocation where possible.
    /// Every element is reset to `fill`.
    pub fn resize(&mut self, rows: usize, cols: usize, fill: T) {
        self.rows = rows;
        self.cols = cols;
        self.data.clear();
        self.data.resize(rows * cols, fill);
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<T> Grid<T> {
    /// Wraps an existing row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(DetectorError::DimensionMismatch {
                expected: (rows, cols),
                found: (data.len(), 1),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Builds a grid by evaluating `f(row, col)` for every pixel.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                data.push(f(row, col));
            }
        }
        Self { rows, cols, data }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`
    #[inline]
    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn flat_index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if row < self.rows && col < self.cols {
            self.data.get(row * self.cols + col)
        } else {
            None
        }
    }

    #[inline]
    pub fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut T> {
        if row < self.rows && col < self.cols {
            self.data.get_mut(row * self.cols + col)
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Allocated element capacity, exposed so buffer reuse can be observed.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Fails with `DimensionMismatch` unless `other` has the same shape.
    pub fn ensure_same_dims<U>(&self, other: &Grid<U>) -> Result<()> {
        if self.dims() != other.dims() {
            return Err(DetectorError::DimensionMismatch {
                expected: self.dims(),
                found: other.dims(),
            });
        }
        Ok(())
    }
}

impl<T> std::ops::Index<usize> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        &self.data[index]
    }
}

impl<T> std::ops::IndexMut<usize> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.data[index]
    }
}
