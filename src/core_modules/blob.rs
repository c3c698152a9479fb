// THEORY:
// A `Blob` is a size-qualified connected component promoted to a first-class
// entity: one body-part label, a 3D centroid, and the flat indices of the
// pixels it owns. Blobs only live for one frame. Their `id` is unique across
// the whole frame while `lid` is the position within their label's list, so
// `matrix[label][lid]` always finds a blob again.
//
// `links` is filled by a relation builder after reduction and lets a skeleton
// fitter walk between blobs of different labels.

use crate::core_modules::body_part::{Label, NUM_PARTS};
use nalgebra::Point3;

/// Direction of a link relative to the blob that stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Parent,
    Child,
}

/// A reference from one blob to another blob of the same frame.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobLink {
    pub kind: LinkKind,
    pub label: Label,
    pub lid: usize,
    pub id: usize,
    /// Distance between the two centroids, in cloud units.
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub label: Label,
    /// Centroid of the member points in cloud coordinates.
    pub mean: Point3<f32>,
    /// Flat pixel indices, ascending.
    pub indices: Vec<usize>,
    /// Frame-wide id: label ascending, then `lid` ascending, from 0.
    pub id: usize,
    /// Position within `matrix[label]`.
    pub lid: usize,
    pub links: Vec<BlobLink>,
}

impl Blob {
    pub fn new(label: Label, mean: Point3<f32>, capacity: usize) -> Self {
        Self {
            label,
            mean,
            indices: Vec::with_capacity(capacity),
            id: 0,
            lid: 0,
            links: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.indices.len()
    }

    pub fn parent(&self) -> Option<&BlobLink> {
        self.links.iter().find(|l| l.kind == LinkKind::Parent)
    }

    pub fn children(&self) -> impl Iterator<Item = &BlobLink> {
        self.links.iter().filter(|l| l.kind == LinkKind::Child)
    }
}

/// One list of blobs per label; the outer index is the label.
pub type BlobMatrix = Vec<Vec<Blob>>;

/// An empty matrix with `capacity` blobs reserved per label.
pub fn blob_matrix_with_capacity(capacity: usize) -> BlobMatrix {
    (0..NUM_PARTS).map(|_| Vec::with_capacity(capacity)).collect()
}

/// Total number of blobs across every label.
pub fn blob_count(matrix: &BlobMatrix) -> usize {
    matrix.iter().map(Vec::len).sum()
}

/// Iterates every blob in id order.
pub fn iter_blobs(matrix: &BlobMatrix) -> impl Iterator<Item = &Blob> {
    matrix.iter().flatten()
}
