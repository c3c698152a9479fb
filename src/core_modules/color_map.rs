// THEORY:
// A fixed colour per body-part label turns a label image into something a
// human can inspect. The table is built once and then only read. Colours are
// stored as RGB with alpha forced to fully opaque.

use crate::core_modules::body_part::{Label, NUM_PARTS};
use crate::core_modules::grid::LabelImage;
use image::{Rgba, RgbaImage};

/// Default palette, one RGB triple per label. The last entry is background.
pub const DEFAULT_PALETTE: [[u8; 3]; NUM_PARTS] = [
    [22, 34, 50],
    [196, 247, 24],
    [189, 207, 33],
    [127, 194, 254],
    [175, 115, 88],
    [64, 91, 158],
    [2, 90, 14],
    [227, 156, 100],
    [17, 167, 243],
    [184, 194, 145],
    [147, 171, 234],
    [93, 112, 220],
    [163, 132, 93],
    [85, 4, 122],
    [46, 168, 75],
    [108, 5, 15],
    [107, 125, 180],
    [167, 77, 157],
    [73, 89, 214],
    [58, 183, 52],
    [75, 155, 54],
    [187, 61, 249],
    [11, 57, 143],
    [0, 198, 246],
    [251, 177, 202],
    [0, 0, 0],
];

/// Colour of labels that have no entry in the table.
const UNKNOWN: Rgba<u8> = Rgba([0, 0, 0, 255]);

#[derive(Debug, Clone)]
pub struct LabelColorMap {
    lut: Vec<Rgba<u8>>,
}

impl LabelColorMap {
    pub fn new(palette: &[[u8; 3]]) -> Self {
        let lut = palette.iter().map(|&[r, g, b]| Rgba([r, g, b, 255])).collect();
        Self { lut }
    }

    #[inline]
    pub fn color(&self, label: Label) -> Rgba<u8> {
        self.lut.get(label as usize).copied().unwrap_or(UNKNOWN)
    }

    pub fn len(&self) -> usize {
        self.lut.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lut.is_empty()
    }

    /// Renders `labels` as an image of `cols x rows` pixels.
    pub fn colorize(&self, labels: &LabelImage) -> RgbaImage {
        let cols = labels.cols();
        RgbaImage::from_fn(cols as u32, labels.rows() as u32, |x, y| {
            self.color(labels[y as usize * cols + x as usize])
        })
    }
}

impl Default for LabelColorMap {
    fn default() -> Self {
        Self::new(&DEFAULT_PALETTE)
    }
}
