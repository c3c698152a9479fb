// THEORY:
// Raw forest output is speckled: isolated pixels flip to a neighbouring part.
// The smoother replaces each label by the majority label of a small square
// window around it. Votes only count from neighbours whose depth is close to
// the centre pixel's, so a hand in front of the chest never "bleeds" chest
// labels across the depth discontinuity that separates them.

use crate::core_modules::body_part::NUM_PARTS;
use crate::core_modules::classifier::majority;
use crate::core_modules::grid::{DepthFrame, LabelImage};
use crate::error::{DetectorError, Result};
use rayon::prelude::*;

pub const DEFAULT_SMOOTH_WINDOW: usize = 5;
pub const DEFAULT_SMOOTH_DEPTH_TOLERANCE: u16 = 300;
/// Widest accepted smoothing window.
pub const MAX_SMOOTH_WINDOW: usize = 255;

/// Produces a denoised label image from a raw one.
pub trait Smoother: Send {
    /// Overwrites every element of `smoothed`, which has the same shape as `labels`.
    fn smooth(&mut self, labels: &LabelImage, depth: &DepthFrame, smoothed: &mut LabelImage) -> Result<()>;
}

/// Depth-gated majority filter over a square window.
#[derive(Debug, Clone)]
pub struct WindowSmoother {
    window: usize,
    depth_tolerance: u16,
}

impl WindowSmoother {
    pub fn new(window: usize, depth_tolerance: u16) -> Result<Self> {
        if window == 0 || window % 2 == 0 || window > MAX_SMOOTH_WINDOW {
            return Err(DetectorError::Config(format!(
                "smoothing window must be odd and in 1..={}, got {}",
                MAX_SMOOTH_WINDOW, window
            )));
        }
        Ok(Self {
            window,
            depth_tolerance,
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn depth_tolerance(&self) -> u16 {
        self.depth_tolerance
    }
}

impl Default for WindowSmoother {
    fn default() -> Self {
        Self {
            window: DEFAULT_SMOOTH_WINDOW,
            depth_tolerance: DEFAULT_SMOOTH_DEPTH_TOLERANCE,
        }
    }
}

impl Smoother for WindowSmoother {
    fn smooth(&mut self, labels: &LabelImage, depth: &DepthFrame, smoothed: &mut LabelImage) -> Result<()> {
        labels.ensure_same_dims(depth)?;
        labels.ensure_same_dims(smoothed)?;
        let (rows, cols) = labels.dims();
        if cols == 0 {
            return Ok(());
        }
        if let Some(index) = labels.as_slice().iter().position(|&l| l as usize >= NUM_PARTS) {
            return Err(DetectorError::LabelOutOfRange {
                label: labels[index],
                index,
            });
        }

        let half = self.window / 2;
        let tolerance = self.depth_tolerance as i32;
        let raw = labels.as_slice();
        let depth = depth.as_slice();

        smoothed
            .as_mut_slice()
            .par_chunks_mut(cols)
            .enumerate()
            .for_each(|(row, out)| {
                let row_lo = row.saturating_sub(half);
                let row_hi = (row + half).min(rows - 1);
                for (col, label) in out.iter_mut().enumerate() {
                    let center = row * cols + col;
                    let center_depth = depth[center] as i32;
                    if center_depth == 0 {
                        *label = raw[center];
                        continue;
                    }

                    let col_lo = col.saturating_sub(half);
                    let col_hi = (col + half).min(cols - 1);
                    let mut votes = [0u32; NUM_PARTS];
                    let mut any = false;
                    for r in row_lo..=row_hi {
                        for c in col_lo..=col_hi {
                            let idx = r * cols + c;
                            let d = depth[idx] as i32;
                            if d != 0 && (d - center_depth).abs() <= tolerance {
                                votes[raw[idx] as usize] += 1;
                                any = true;
                            }
                        }
                    }
                    *label = if any { majority(&votes) } else { raw[center] };
                }
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::grid::Grid;

    #[test]
    fn removes_isolated_speckle() {
        let mut labels: LabelImage = Grid::new(7, 7, 2);
        labels[3 * 7 + 3] = 9;
        let depth: DepthFrame = Grid::new(7, 7, 1500);
        let mut out = Grid::new(7, 7, 0);

        WindowSmoother::default().smooth(&labels, &depth, &mut out).unwrap();
        assert!(out.as_slice().iter().all(|&l| l == 2));
    }

    #[test]
    fn does_not_smooth_across_depth_steps() {
        // Columns 0..=1 are label 4 at 1000mm; columns 2..=6 are label 7 at 2000mm.
        let labels = Grid::from_fn(5, 7, |_, c| if c < 2 { 4 } else { 7 });
        let depth = Grid::from_fn(5, 7, |_, c| if c < 2 { 1000u16 } else { 2000 });
        let mut out = Grid::new(5, 7, 0);

        WindowSmoother::default().smooth(&labels, &depth, &mut out).unwrap();
        assert_eq!(out, labels);
    }

    #[test]
    fn zero_depth_keeps_raw_label() {
        let labels = Grid::from_fn(3, 3, |r, c| (r * 3 + c) as u8);
        let depth: DepthFrame = Grid::new(3, 3, 0);
        let mut out = Grid::new(3, 3, 0);

        WindowSmoother::default().smooth(&labels, &depth, &mut out).unwrap();
        assert_eq!(out, labels);
    }

    #[test]
    fn even_window_is_rejected() {
        assert!(WindowSmoother::new(4, 300).is_err());
        assert!(WindowSmoother::new(0, 300).is_err());
        assert!(WindowSmoother::new(3, 300).is_ok());
    }

    #[test]
    fn window_is_capped() {
        assert!(WindowSmoother::new(MAX_SMOOTH_WINDOW, 300).is_ok());
        assert!(matches!(
            WindowSmoother::new(MAX_SMOOTH_WINDOW + 2, 300),
            Err(DetectorError::Config(_))
        ));
    }

    #[test]
    fn widest_window_spans_the_whole_frame() {
        // Label 6 holds 41 of 81 pixels, so it wins everywhere once the window
        // covers the frame.
        let labels = Grid::from_fn(9, 9, |r, c| if r * 9 + c < 41 { 6 } else { 1 });
        let depth: DepthFrame = Grid::new(9, 9, 1200);
        let mut out = Grid::new(9, 9, 0);

        WindowSmoother::new(MAX_SMOOTH_WINDOW, 300)
            .unwrap()
            .smooth(&labels, &depth, &mut out)
            .unwrap();
        assert!(out.as_slice().iter().all(|&l| l == 6));
    }

    #[test]
    fn out_of_range_labels_fail_the_frame() {
        let labels: LabelImage = Grid::new(2, 2, NUM_PARTS as u8);
        let depth: DepthFrame = Grid::new(2, 2, 1000);
        let mut out = Grid::new(2, 2, 0);
        assert!(matches!(
            WindowSmoother::default().smooth(&labels, &depth, &mut out),
            Err(DetectorError::LabelOutOfRange { index: 0, .. })
        ));
    }
}
