// THEORY:
// The classifier turns a depth frame into a raw per-pixel label image. The
// detector only relies on the `Classifier` contract: fill one label per pixel,
// same shape as the depth frame, or fail the frame. How the labels are
// produced (CPU, GPU, remote) is up to the implementation.
//
// `ForestClassifier` is the reference implementation. For every pixel it walks
// each tree of the ensemble. A split node compares two depth probes taken at
// offsets around the pixel; the offsets are divided by the pixel's own depth so
// the feature is invariant to the subject's distance from the sensor. Probes
// that fall outside the frame, or land on a pixel with no reading, see a far
// background depth. The per-tree leaf labels are then combined by majority
// vote, ties going to the lowest label.

use crate::core_modules::body_part::{BACKGROUND, Label, NUM_PARTS};
use crate::core_modules::grid::{DepthFrame, LabelImage};
use crate::core_modules::tree::{Ensemble, Node, Tree};
use crate::error::Result;
use rayon::prelude::*;

/// Depth probes that miss the subject read as this far-away value.
pub const BACKGROUND_DEPTH: i32 = 10_000;

/// Offsets in tree nodes are expressed for a subject at this depth.
const OFFSET_REFERENCE_DEPTH: f32 = 1000.0;

/// Produces a raw label image from a depth frame.
pub trait Classifier: Send {
    /// Overwrites every element of `labels`, which has the same shape as `depth`.
    fn classify(&mut self, depth: &DepthFrame, labels: &mut LabelImage) -> Result<()>;

    /// Number of trees behind this classifier, when it is tree based.
    fn trees_number(&self) -> usize {
        0
    }
}

/// CPU decision-forest classifier.
pub struct ForestClassifier {
    ensemble: Ensemble,
}

impl ForestClassifier {
    pub fn new(ensemble: Ensemble) -> Self {
        Self { ensemble }
    }

    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }

    /// Label of a single pixel. Exposed for callers that want to probe the forest.
    pub fn classify_pixel(&self, depth: &DepthFrame, row: usize, col: usize) -> Label {
        let center = depth.get(row, col).copied().unwrap_or(0);
        if center == 0 {
            return BACKGROUND;
        }
        let mut votes = [0u32; NUM_PARTS];
        for tree in self.ensemble.trees() {
            let leaf = evaluate_tree(tree, depth, row, col, center);
            votes[leaf as usize] += 1;
        }
        majority(&votes)
    }
}

impl Classifier for ForestClassifier {
    fn classify(&mut self, depth: &DepthFrame, labels: &mut LabelImage) -> Result<()> {
        depth.ensure_same_dims(labels)?;
        let cols = depth.cols();
        if cols == 0 {
            return Ok(());
        }
        let this = &*self;
        labels
            .as_mut_slice()
            .par_chunks_mut(cols)
            .enumerate()
            .for_each(|(row, out)| {
                for (col, label) in out.iter_mut().enumerate() {
                    *label = this.classify_pixel(depth, row, col);
                }
            });
        Ok(())
    }

    fn trees_number(&self) -> usize {
        self.ensemble.len()
    }
}

fn evaluate_tree(tree: &Tree, depth: &DepthFrame, row: usize, col: usize, center: u16) -> Label {
    let scale = OFFSET_REFERENCE_DEPTH / center as f32;
    tree.descend(|node: &Node| {
        let d1 = probe(depth, row, col, node.du1, node.dv1, scale);
        let d2 = probe(depth, row, col, node.du2, node.dv2, scale);
        d1 - d2
    })
}

#[inline]
fn probe(depth: &DepthFrame, row: usize, col: usize, du: i16, dv: i16, scale: f32) -> i32 {
    let x = col as i64 + (du as f32 * scale).round() as i64;
    let y = row as i64 + (dv as f32 * scale).round() as i64;
    if x < 0 || y < 0 {
        return BACKGROUND_DEPTH;
    }
    match depth.get(y as usize, x as usize) {
        Some(&d) if d != 0 => d as i32,
        _ => BACKGROUND_DEPTH,
    }
}

/// Most voted label; ties go to the lowest label.
pub(crate) fn majority(votes: &[u32; NUM_PARTS]) -> Label {
    let mut best = 0usize;
    for (label, &count) in votes.iter().enumerate().skip(1) {
        if count > votes[best] {
            best = label;
        }
    }
    best as Label
}
