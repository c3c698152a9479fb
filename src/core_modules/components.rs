// THEORY:
// Connected-component labeling stands in for Euclidean clustering of the point
// cloud. Instead of building a spatial index, it relies on the organised
// layout of the frame: two pixels that touch in the image are neighbours in
// space unless their depths disagree.
//
// Labeling runs in two steps, mirroring a device kernel pair:
// 1.  **Edge set**: for every pixel, decide whether it connects to its right
//     and lower neighbour. A connection requires both pixels to have a depth
//     reading, carry the same smoothed label, and be closer in depth than the
//     cluster tolerance. This step is independent per pixel and runs in parallel.
// 2.  **Flood fill**: a union-find pass over the edge set merges connected
//     pixels. Every component is named after its smallest flat pixel index, so
//     ids are deterministic for a given input.
//
// Pixels with no depth reading belong to no component.

use crate::core_modules::grid::{ComponentId, ComponentIdMap, DepthFrame, Grid, LabelImage};
use crate::error::{DetectorError, Result};
use rayon::prelude::*;

pub const DEFAULT_CLUSTER_TOLERANCE: f32 = 0.05;
/// Metres per raw depth unit for millimetre sensors.
pub const DEFAULT_DEPTH_SCALE: f32 = 0.001;

const EDGE_RIGHT: u8 = 0b01;
const EDGE_DOWN: u8 = 0b10;

/// Assigns a connected-component id to every pixel of a smoothed label image.
pub trait ComponentLabeler: Send {
    /// Overwrites every element of `components`, which has the same shape as `labels`.
    fn label_components(
        &mut self,
        labels: &LabelImage,
        depth: &DepthFrame,
        components: &mut ComponentIdMap,
    ) -> Result<()>;
}

/// Depth-gated 4-connected component labeler.
#[derive(Debug, Clone)]
pub struct DepthComponentLabeler {
    tolerance: f32,
    depth_scale: f32,
    edges: Grid<u8>,
    parent: Vec<u32>,
}

impl DepthComponentLabeler {
    /// `tolerance` is in cloud units; `depth_scale` converts raw depth to cloud units.
    pub fn new(tolerance: f32, depth_scale: f32) -> Result<Self> {
        if !(tolerance > 0.0) || !(depth_scale > 0.0) {
            return Err(DetectorError::Config(format!(
                "cluster tolerance ({}) and depth scale ({}) must be positive",
                tolerance, depth_scale
            )));
        }
        Ok(Self {
            tolerance,
            depth_scale,
            edges: Grid::new(0, 0, 0),
            parent: Vec::new(),
        })
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// The edge bitmask of the last frame: bit 0 links a pixel to its right
    /// neighbour, bit 1 to the one below.
    pub fn edges(&self) -> &Grid<u8> {
        &self.edges
    }

    fn compute_edges(&mut self, labels: &LabelImage, depth: &DepthFrame) {
        let (rows, cols) = labels.dims();
        self.edges.resize(rows, cols, 0);
        if cols == 0 {
            return;
        }
        let sq_tolerance = self.tolerance * self.tolerance;
        let scale = self.depth_scale;
        let labels = labels.as_slice();
        let depth = depth.as_slice();

        let connected = |a: usize, b: usize| -> bool {
            let (da, db) = (depth[a], depth[b]);
            if da == 0 || db == 0 || labels[a] != labels[b] {
                return false;
            }
            let dist = (da as f32 - db as f32) * scale;
            dist * dist < sq_tolerance
        };

        self.edges
            .as_mut_slice()
            .par_chunks_mut(cols)
            .enumerate()
            .for_each(|(row, out)| {
                for (col, mask) in out.iter_mut().enumerate() {
                    let idx = row * cols + col;
                    let mut bits = 0;
                    if col + 1 < cols && connected(idx, idx + 1) {
                        bits |= EDGE_RIGHT;
                    }
                    if row + 1 < rows && connected(idx, idx + cols) {
                        bits |= EDGE_DOWN;
                    }
                    *mask = bits;
                }
            });
    }

    fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            let grandparent = self.parent[self.parent[x as usize] as usize];
            self.parent[x as usize] = grandparent;
            x = grandparent;
        }
        x
    }

    fn union(&mut self, a: u32, b: u32) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // The smaller index always becomes the root.
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child as usize] = root;
        }
    }
}

impl Default for DepthComponentLabeler {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_CLUSTER_TOLERANCE,
            depth_scale: DEFAULT_DEPTH_SCALE,
            edges: Grid::new(0, 0, 0),
            parent: Vec::new(),
        }
    }
}

impl ComponentLabeler for DepthComponentLabeler {
    fn label_components(
        &mut self,
        labels: &LabelImage,
        depth: &DepthFrame,
        components: &mut ComponentIdMap,
    ) -> Result<()> {
        labels.ensure_same_dims(depth)?;
        labels.ensure_same_dims(components)?;
        let len = labels.len();
        if u32::try_from(len).is_err() {
            return Err(DetectorError::InvalidResolution {
                rows: labels.rows(),
                cols: labels.cols(),
            });
        }

        self.compute_edges(labels, depth);

        self.parent.clear();
        self.parent.extend(0..len as u32);
        let cols = labels.cols();
        for idx in 0..len {
            let mask = self.edges[idx];
            if mask & EDGE_RIGHT != 0 {
                self.union(idx as u32, (idx + 1) as u32);
            }
            if mask & EDGE_DOWN != 0 {
                self.union(idx as u32, (idx + cols) as u32);
            }
        }

        let depth = depth.as_slice();
        for idx in 0..len {
            components[idx] = if depth[idx] == 0 {
                None
            } else {
                Some(ComponentId(self.find(idx as u32)))
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(labels: &LabelImage, depth: &DepthFrame) -> ComponentIdMap {
        let mut out = Grid::new(labels.rows(), labels.cols(), None);
        DepthComponentLabeler::default()
            .label_components(labels, depth, &mut out)
            .unwrap();
        out
    }

    #[test]
    fn uniform_block_is_one_component() {
        let labels: LabelImage = Grid::new(4, 5, 3);
        let depth: DepthFrame = Grid::new(4, 5, 1200);
        let comps = run(&labels, &depth);
        assert!(comps.as_slice().iter().all(|&c| c == Some(ComponentId(0))));
    }

    #[test]
    fn label_boundary_splits_components() {
        let labels = Grid::from_fn(3, 4, |_, c| if c < 2 { 1 } else { 2 });
        let depth: DepthFrame = Grid::new(3, 4, 1000);
        let comps = run(&labels, &depth);
        assert_eq!(comps[0], Some(ComponentId(0)));
        assert_eq!(comps[11], Some(ComponentId(2)));
        assert_ne!(comps[1], comps[2]);
    }

    #[test]
    fn depth_step_beyond_tolerance_splits_components() {
        // 0.049m step stays connected, 0.051m step breaks.
        let labels: LabelImage = Grid::new(1, 3, 5);
        let depth = Grid::from_vec(1, 3, vec![1000u16, 1049, 1100]).unwrap();
        let comps = run(&labels, &depth);
        assert_eq!(comps[0], comps[1]);
        assert_ne!(comps[1], comps[2]);
    }

    #[test]
    fn missing_depth_has_no_component() {
        let labels: LabelImage = Grid::new(1, 3, 5);
        let depth = Grid::from_vec(1, 3, vec![1000u16, 0, 1000]).unwrap();
        let comps = run(&labels, &depth);
        assert_eq!(comps[1], None);
        assert_eq!(comps[0], Some(ComponentId(0)));
        assert_eq!(comps[2], Some(ComponentId(2)));
    }

    #[test]
    fn u_shape_merges_to_smallest_index() {
        // Two vertical arms joined at the bottom row.
        let labels: LabelImage = Grid::new(3, 3, 1);
        let depth = Grid::from_fn(3, 3, |r, c| if r < 2 && c == 1 { 0u16 } else { 1000 });
        let comps = run(&labels, &depth);
        for idx in [0, 2, 3, 5, 6, 7, 8] {
            assert_eq!(comps[idx], Some(ComponentId(0)), "pixel {}", idx);
        }
    }

    #[test]
    fn rejects_non_positive_tolerance() {
        assert!(DepthComponentLabeler::new(0.0, 0.001).is_err());
        assert!(DepthComponentLabeler::new(0.05, -1.0).is_err());
    }
}
