// THEORY:
// Relation building is the last step of a frame. It receives the finished
// blob table and annotates it in place with links between blobs of different
// labels, which a skeleton fitter later walks. The detector does not care how
// the links are chosen; it only guarantees the builder runs exactly once per
// frame, after every blob is final.
//
// `NoRelations` leaves the table as it is. `NearestParentRelations` is one
// concrete rule a caller can opt into: every blob is attached to the closest
// blob of its parent part, provided the two centroids are near enough.

use crate::core_modules::blob::{BlobLink, BlobMatrix, LinkKind};
use crate::core_modules::body_part::{BodyPart, Label, NUM_PARTS};
use crate::error::{DetectorError, Result};

/// Annotates a finished blob table with inter-blob relations.
pub trait RelationBuilder: Send {
    fn build_relations(&mut self, blobs: &mut BlobMatrix) -> Result<()>;
}

/// Leaves the blob table untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRelations;

impl RelationBuilder for NoRelations {
    fn build_relations(&mut self, _blobs: &mut BlobMatrix) -> Result<()> {
        Ok(())
    }
}

/// Links each blob to the nearest blob of its parent label.
#[derive(Debug, Clone)]
pub struct NearestParentRelations {
    parents: [Option<Label>; NUM_PARTS],
    max_distance: f32,
}

impl NearestParentRelations {
    /// Uses the standard kinematic tree (`BodyPart::kinematic_parent`).
    pub fn new(max_distance: f32) -> Result<Self> {
        let mut parents = [None; NUM_PARTS];
        for part in BodyPart::ALL {
            parents[part as usize] = part.kinematic_parent().map(BodyPart::label);
        }
        Self::with_parents(parents, max_distance)
    }

    /// Uses a caller-supplied parent table, indexed by child label.
    pub fn with_parents(parents: [Option<Label>; NUM_PARTS], max_distance: f32) -> Result<Self> {
        if !(max_distance > 0.0) {
            return Err(DetectorError::Config(format!(
                "relation distance must be positive, got {}",
                max_distance
            )));
        }
        if let Some(bad) = parents.iter().flatten().find(|&&p| p as usize >= NUM_PARTS) {
            return Err(DetectorError::Config(format!("parent label {} is out of range", bad)));
        }
        Ok(Self { parents, max_distance })
    }
}

impl RelationBuilder for NearestParentRelations {
    fn build_relations(&mut self, blobs: &mut BlobMatrix) -> Result<()> {
        if blobs.len() != NUM_PARTS {
            return Err(DetectorError::stage(
                crate::error::Stage::RelationBuilder,
                format!("expected {} label lists, got {}", NUM_PARTS, blobs.len()),
            ));
        }

        // (child label, child lid, parent label, parent lid, distance)
        let mut pairs = Vec::new();
        for (child_label, children) in blobs.iter().enumerate() {
            let Some(parent_label) = self.parents[child_label] else { continue };
            let candidates = &blobs[parent_label as usize];
            for (child_lid, child) in children.iter().enumerate() {
                let nearest = candidates
                    .iter()
                    .enumerate()
                    .map(|(lid, p)| (lid, (p.mean - child.mean).norm()))
                    .filter(|&(_, d)| d <= self.max_distance)
                    .min_by(|a, b| a.1.total_cmp(&b.1));
                if let Some((parent_lid, distance)) = nearest {
                    pairs.push((child_label, child_lid, parent_label as usize, parent_lid, distance));
                }
            }
        }

        for (child_label, child_lid, parent_label, parent_lid, distance) in pairs {
            let parent_id = blobs[parent_label][parent_lid].id;
            let child_id = blobs[child_label][child_lid].id;
            blobs[child_label][child_lid].links.push(BlobLink {
                kind: LinkKind::Parent,
                label: parent_label as Label,
                lid: parent_lid,
                id: parent_id,
                distance,
            });
            blobs[parent_label][parent_lid].links.push(BlobLink {
                kind: LinkKind::Child,
                label: child_label as Label,
                lid: child_lid,
                id: child_id,
                distance,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::blob::{Blob, blob_matrix_with_capacity};
    use nalgebra::Point3;

    fn blob(label: BodyPart, lid: usize, id: usize, at: [f32; 3]) -> Blob {
        let mut blob = Blob::new(label.label(), Point3::from(at), 0);
        blob.lid = lid;
        blob.id = id;
        blob
    }

    #[test]
    fn links_child_to_nearest_parent() {
        let mut matrix = blob_matrix_with_capacity(2);
        matrix[BodyPart::LHand as usize].push(blob(BodyPart::LHand, 0, 0, [0.0, 0.0, 1.0]));
        matrix[BodyPart::LForearm as usize].push(blob(BodyPart::LForearm, 0, 1, [0.5, 0.0, 1.0]));
        matrix[BodyPart::LForearm as usize].push(blob(BodyPart::LForearm, 1, 2, [0.1, 0.0, 1.0]));

        NearestParentRelations::new(0.3).unwrap().build_relations(&mut matrix).unwrap();

        let hand = &matrix[BodyPart::LHand as usize][0];
        let parent = hand.parent().unwrap();
        assert_eq!((parent.label, parent.lid, parent.id), (BodyPart::LForearm.label(), 1, 2));
        assert!((parent.distance - 0.1).abs() < 1e-5);

        let forearm = &matrix[BodyPart::LForearm as usize][1];
        let children: Vec<_> = forearm.children().collect();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, 0);
        assert!(matrix[BodyPart::LForearm as usize][0].links.is_empty());
    }

    #[test]
    fn far_parents_are_not_linked() {
        let mut matrix = blob_matrix_with_capacity(1);
        matrix[BodyPart::RFoot as usize].push(blob(BodyPart::RFoot, 0, 0, [0.0, 0.0, 1.0]));
        matrix[BodyPart::RLeg as usize].push(blob(BodyPart::RLeg, 0, 1, [0.0, 2.0, 1.0]));

        NearestParentRelations::new(0.5).unwrap().build_relations(&mut matrix).unwrap();
        assert!(matrix.iter().flatten().all(|b| b.links.is_empty()));
    }

    #[test]
    fn no_relations_is_a_no_op() {
        let mut matrix = blob_matrix_with_capacity(1);
        matrix[0].push(blob(BodyPart::LFoot, 0, 0, [0.0, 0.0, 0.0]));
        let before = matrix.clone();
        NoRelations.build_relations(&mut matrix).unwrap();
        assert_eq!(matrix, before);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(NearestParentRelations::new(0.0).is_err());
        let mut parents = [None; NUM_PARTS];
        parents[0] = Some(NUM_PARTS as Label);
        assert!(NearestParentRelations::with_parents(parents, 1.0).is_err());
    }
}
