// THEORY:
// The blob reducer is where millions of classified pixels collapse into a
// handful of labelled 3D regions. It runs on the host after the component map
// is available and works in three passes over the frame:
//
// 1.  **Accumulate**: sum the 3D point and count the pixels of every component.
//     Pixels without a component go to a separate accumulator that never
//     qualifies.
// 2.  **Promote**: walk the pixels again in flat-index order. The first pixel of
//     each size-qualified component creates its blob (centroid = sum / count,
//     index storage reserved for the whole component) and records where the
//     blob landed in the remap table; every pixel then appends its index to
//     that blob.
// 3.  **Identify**: number the blobs frame-wide, label ascending and then in
//     list order, and store each blob's position within its label.
//
// Components outside `[min_pts, max_pts]` are dropped silently, along with
// their pixels. A frame where nothing qualifies yields an empty table.

use crate::core_modules::blob::Blob;
use crate::core_modules::body_part::NUM_PARTS;
use crate::core_modules::buffers::{FrameBuffers, RegionStat};
use crate::core_modules::grid::PointCloud;
use crate::error::{DetectorError, Result, Stage};
use nalgebra::Point3;

pub const DEFAULT_MAX_CLUSTER_SIZE: usize = 25_000;

/// Counters describing one reduction, used for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReduceSummary {
    pub blobs: usize,
    /// Components rejected by the size filter.
    pub dropped_components: usize,
    /// Pixels that belonged to rejected components.
    pub dropped_pixels: usize,
    /// Pixels without any component.
    pub invalid_pixels: usize,
}

#[inline]
fn qualifies(stat: &RegionStat, min_pts: usize, max_pts: usize) -> bool {
    let count = stat.count as usize;
    count > 0 && min_pts <= count && count <= max_pts
}

/// Rebuilds `buffers.blob_matrix` from the smoothed labels and component map
/// already stored in `buffers`, using `cloud` for 3D positions.
pub fn reduce_blobs(
    buffers: &mut FrameBuffers,
    cloud: &PointCloud,
    min_pts: usize,
    max_pts: usize,
) -> Result<ReduceSummary> {
    buffers.reset();
    let FrameBuffers {
        smoothed_labels: labels,
        components,
        region_stats,
        invalid_region,
        remap,
        blob_matrix,
        ..
    } = buffers;
    labels.ensure_same_dims(cloud)?;
    labels.ensure_same_dims(components)?;

    // --- 1. Accumulate ---
    // Ids come from a pluggable labeler; every later pass relies on this check.
    let pixels = region_stats.len();
    for (k, (component, point)) in components.as_slice().iter().zip(cloud.as_slice()).enumerate() {
        let stat = match component {
            Some(cc) => region_stats.get_mut(cc.index()).ok_or_else(|| {
                DetectorError::stage(
                    Stage::ComponentLabeler,
                    format!("component id {} at pixel {} is outside a {}-pixel frame", cc.0, k, pixels),
                )
            })?,
            None => &mut *invalid_region,
        };
        stat.sum += point.coords.cast::<f64>();
        stat.count += 1;
    }

    // --- 2. Promote ---
    for (k, component) in components.as_slice().iter().enumerate() {
        let Some(cc) = component else { continue };
        let stat = &region_stats[cc.index()];
        if !qualifies(stat, min_pts, max_pts) {
            continue;
        }

        let entry = remap[cc.index()];
        let (label, lid) = match entry {
            Some(entry) => entry,
            None => {
                let label = labels[k];
                if label as usize >= NUM_PARTS {
                    return Err(DetectorError::LabelOutOfRange { label, index: k });
                }
                let blobs = &mut blob_matrix[label as usize];
                let lid = blobs.len();
                let mean = stat.sum / stat.count as f64;
                blobs.push(Blob::new(label, Point3::from(mean.cast::<f32>()), stat.count as usize));
                remap[cc.index()] = Some((label, lid));
                (label, lid)
            }
        };
        blob_matrix[label as usize][lid].indices.push(k);
    }

    // --- 3. Identify ---
    let mut id = 0;
    for blobs in blob_matrix.iter_mut() {
        for (lid, blob) in blobs.iter_mut().enumerate() {
            blob.id = id;
            blob.lid = lid;
            id += 1;
        }
    }

    let mut summary = ReduceSummary {
        blobs: id,
        invalid_pixels: invalid_region.count as usize,
        ..Default::default()
    };
    for stat in region_stats.iter().filter(|s| s.count > 0) {
        if !qualifies(stat, min_pts, max_pts) {
            summary.dropped_components += 1;
            summary.dropped_pixels += stat.count as usize;
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::grid::{ComponentId, Grid};

    fn buffers_with(labels: Vec<u8>, comps: Vec<Option<u32>>, rows: usize, cols: usize) -> FrameBuffers {
        let mut buffers = FrameBuffers::new(rows, cols, 4).unwrap();
        buffers.smoothed_labels = Grid::from_vec(rows, cols, labels).unwrap();
        buffers.components = Grid::from_vec(rows, cols, comps.into_iter().map(|c| c.map(ComponentId)).collect()).unwrap();
        buffers
    }

    fn cloud(rows: usize, cols: usize) -> PointCloud {
        Grid::from_fn(rows, cols, |r, c| Point3::new(c as f32, r as f32, 1.0))
    }

    #[test]
    fn means_and_membership() {
        // Row 0: component 0 (label 2), row 1: component 3 (label 5).
        let mut buffers = buffers_with(
            vec![2, 2, 2, 5, 5, 5],
            vec![Some(0), Some(0), Some(0), Some(3), Some(3), Some(3)],
            2,
            3,
        );
        let summary = reduce_blobs(&mut buffers, &cloud(2, 3), 1, 100).unwrap();
        assert_eq!(summary.blobs, 2);

        let matrix = buffers.blob_matrix();
        assert_eq!(matrix[2].len(), 1);
        assert_eq!(matrix[2][0].indices, vec![0, 1, 2]);
        assert!((matrix[2][0].mean - Point3::new(1.0, 0.0, 1.0)).norm() < 1e-6);
        assert_eq!(matrix[5][0].indices, vec![3, 4, 5]);
        assert!((matrix[5][0].mean - Point3::new(1.0, 1.0, 1.0)).norm() < 1e-6);
        assert_eq!((matrix[2][0].id, matrix[5][0].id), (0, 1));
    }

    #[test]
    fn size_filter_is_inclusive() {
        let mut buffers = buffers_with(
            vec![1, 1, 1, 1, 1, 1],
            vec![Some(0), Some(0), Some(2), Some(2), Some(2), Some(2)],
            1,
            6,
        );
        let summary = reduce_blobs(&mut buffers, &cloud(1, 6), 2, 3).unwrap();
        assert_eq!(summary.blobs, 1);
        assert_eq!(summary.dropped_components, 1);
        assert_eq!(summary.dropped_pixels, 4);
        assert_eq!(buffers.blob_matrix()[1][0].indices, vec![0, 1]);
    }

    #[test]
    fn pixels_without_component_never_form_blobs() {
        let mut buffers = buffers_with(vec![3; 4], vec![None; 4], 2, 2);
        let summary = reduce_blobs(&mut buffers, &cloud(2, 2), 0, 100).unwrap();
        assert_eq!(summary.blobs, 0);
        assert_eq!(summary.invalid_pixels, 4);
        assert!(buffers.blob_matrix().iter().all(Vec::is_empty));
    }

    #[test]
    fn ids_follow_label_then_lid() {
        // Label 4 has two components, label 1 has one found last.
        let mut buffers = buffers_with(
            vec![4, 4, 4, 1],
            vec![Some(0), Some(1), Some(1), Some(3)],
            1,
            4,
        );
        reduce_blobs(&mut buffers, &cloud(1, 4), 1, 10).unwrap();
        let matrix = buffers.blob_matrix();
        assert_eq!((matrix[1][0].id, matrix[1][0].lid), (0, 0));
        assert_eq!((matrix[4][0].id, matrix[4][0].lid), (1, 0));
        assert_eq!((matrix[4][1].id, matrix[4][1].lid), (2, 1));
        assert_eq!(matrix[4][1].indices, vec![1, 2]);
    }

    #[test]
    fn previous_frame_blobs_are_discarded() {
        let mut buffers = buffers_with(vec![1; 4], vec![Some(0); 4], 2, 2);
        reduce_blobs(&mut buffers, &cloud(2, 2), 1, 10).unwrap();
        assert_eq!(buffers.blob_matrix()[1].len(), 1);

        buffers.components.fill(None);
        reduce_blobs(&mut buffers, &cloud(2, 2), 1, 10).unwrap();
        assert!(buffers.blob_matrix().iter().all(Vec::is_empty));
    }

    #[test]
    fn component_ids_beyond_the_frame_fail_the_labeler_stage() {
        let mut buffers = buffers_with(vec![1; 16], vec![Some(1_000_000); 16], 4, 4);
        let err = reduce_blobs(&mut buffers, &cloud(4, 4), 1, 100).unwrap_err();
        assert!(matches!(err, DetectorError::Stage { stage: Stage::ComponentLabeler, .. }));
        assert!(buffers.blob_matrix().iter().all(Vec::is_empty));

        // The last valid id is still accepted.
        let mut buffers = buffers_with(vec![1; 16], vec![Some(15); 16], 4, 4);
        assert_eq!(reduce_blobs(&mut buffers, &cloud(4, 4), 1, 100).unwrap().blobs, 1);
    }

    #[test]
    fn cloud_shape_must_match() {
        let mut buffers = buffers_with(vec![1; 4], vec![Some(0); 4], 2, 2);
        assert!(matches!(
            reduce_blobs(&mut buffers, &cloud(4, 1), 1, 10),
            Err(DetectorError::DimensionMismatch { .. })
        ));
    }
}
