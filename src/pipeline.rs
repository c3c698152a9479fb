// THEORY:
// The `pipeline` module is the top-level API of the detector. A
// `BodyPartsDetector` owns every stage and every per-frame buffer, and drives
// one frame at a time through a fixed sequence:
//
//   depth -> classifier -> raw labels -> smoother -> smoothed labels
//         -> component labeler -> component map -> blob reducer -> blob table
//         -> relation builder
//
// No stage is ever skipped or reordered. Each stage hands its output to the
// next through buffers owned by the detector, so nothing is allocated per
// frame once the resolution is stable. If any stage fails, the frame is
// abandoned: the error goes back to the caller and the blob table is left
// empty rather than holding a half-built result.

use crate::config::DetectorConfig;
use crate::core_modules::blob::{BlobMatrix, blob_count};
use crate::core_modules::blob_reducer::{ReduceSummary, reduce_blobs};
use crate::core_modules::buffers::FrameBuffers;
use crate::core_modules::classifier::{Classifier, ForestClassifier};
use crate::core_modules::color_map::LabelColorMap;
use crate::core_modules::components::{ComponentLabeler, DepthComponentLabeler};
use crate::core_modules::grid::{ComponentIdMap, DepthFrame, LabelImage, PointCloud};
use crate::core_modules::relations::{NoRelations, RelationBuilder};
use crate::core_modules::smoother::{Smoother, WindowSmoother};
use crate::core_modules::tree::{Ensemble, TreeSource};
use crate::error::{DetectorError, Result, Stage};
use image::RgbaImage;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Assembles a detector, replacing any of the reference stages.
pub struct DetectorBuilder {
    config: DetectorConfig,
    ensemble: Option<Ensemble>,
    classifier: Option<Box<dyn Classifier>>,
    smoother: Option<Box<dyn Smoother>>,
    labeler: Option<Box<dyn ComponentLabeler>>,
    relations: Box<dyn RelationBuilder>,
    palette: Option<Vec<[u8; 3]>>,
}

impl DetectorBuilder {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            ensemble: None,
            classifier: None,
            smoother: None,
            labeler: None,
            relations: Box::new(NoRelations),
            palette: None,
        }
    }

    /// Loads the trees for the reference forest classifier, in order.
    pub fn trees<I, S>(mut self, sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: TreeSource,
    {
        self.ensemble = Some(Ensemble::from_sources(sources)?);
        Ok(self)
    }

    /// Uses an external classifier (a device kernel, for instance) instead of
    /// the CPU forest.
    pub fn classifier(mut self, classifier: impl Classifier + 'static) -> Self {
        self.classifier = Some(Box::new(classifier));
        self
    }

    pub fn smoother(mut self, smoother: impl Smoother + 'static) -> Self {
        self.smoother = Some(Box::new(smoother));
        self
    }

    pub fn component_labeler(mut self, labeler: impl ComponentLabeler + 'static) -> Self {
        self.labeler = Some(Box::new(labeler));
        self
    }

    pub fn relation_builder(mut self, relations: impl RelationBuilder + 'static) -> Self {
        self.relations = Box::new(relations);
        self
    }

    /// Replaces the label colour table used by `colorize_labels`.
    pub fn palette(mut self, palette: &[[u8; 3]]) -> Self {
        self.palette = Some(palette.to_vec());
        self
    }

    pub fn build(self) -> Result<BodyPartsDetector> {
        let config = self.config;
        config.validate()?;

        let classifier: Box<dyn Classifier> = match (self.classifier, self.ensemble) {
            (Some(classifier), _) => classifier,
            (None, Some(ensemble)) => Box::new(ForestClassifier::new(ensemble)),
            (None, None) => return Err(DetectorError::EmptyEnsemble),
        };
        let smoother: Box<dyn Smoother> = match self.smoother {
            Some(smoother) => smoother,
            None => Box::new(WindowSmoother::new(config.smooth_window, config.smooth_depth_tolerance)?),
        };
        let labeler: Box<dyn ComponentLabeler> = match self.labeler {
            Some(labeler) => labeler,
            None => Box::new(DepthComponentLabeler::new(config.cluster_tolerance, config.depth_scale)?),
        };
        let color_map = match &self.palette {
            Some(palette) => LabelColorMap::new(palette),
            None => LabelColorMap::default(),
        };
        let pool = match config.pool_threads() {
            Some(threads) => Some(rayon::ThreadPoolBuilder::new().num_threads(threads).build()?),
            None => None,
        };
        let buffers = FrameBuffers::new(config.rows, config.cols, config.blob_capacity_hint)?;

        info!(
            trees = classifier.trees_number(),
            rows = config.rows,
            cols = config.cols,
            threads = ?pool.as_ref().map(|p| p.current_num_threads()),
            "body parts detector ready"
        );

        Ok(BodyPartsDetector {
            config,
            classifier,
            smoother,
            labeler,
            relations: self.relations,
            buffers,
            color_map,
            pool,
        })
    }
}

/// Turns depth frames into labelled blob tables.
pub struct BodyPartsDetector {
    config: DetectorConfig,
    classifier: Box<dyn Classifier>,
    smoother: Box<dyn Smoother>,
    labeler: Box<dyn ComponentLabeler>,
    relations: Box<dyn RelationBuilder>,
    buffers: FrameBuffers,
    color_map: LabelColorMap,
    pool: Option<rayon::ThreadPool>,
}

impl BodyPartsDetector {
    /// Builds a detector with the reference CPU stages and the trees from
    /// `sources`, in order. At least one source is required.
    pub fn new<I, S>(sources: I, config: DetectorConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: TreeSource,
    {
        DetectorBuilder::new(config).trees(sources)?.build()
    }

    pub fn builder(config: DetectorConfig) -> DetectorBuilder {
        DetectorBuilder::new(config)
    }

    /// Runs one frame through the full pipeline. `min_pts_per_cluster` is the
    /// inclusive lower size bound for blobs.
    ///
    /// `depth` and `cloud` must have the same shape; otherwise no stage runs.
    /// Any failure aborts the frame and leaves the blob table empty.
    pub fn process(&mut self, depth: &DepthFrame, cloud: &PointCloud, min_pts_per_cluster: usize) -> Result<()> {
        let started = Instant::now();
        let outcome = depth.ensure_same_dims(cloud).and_then(|()| {
            let (rows, cols) = depth.dims();
            if self.buffers.allocate(rows, cols)? {
                info!(rows, cols, "frame buffers reshaped");
            }
            self.run_stages(depth, cloud, min_pts_per_cluster)
        });
        match outcome {
            Ok(summary) => {
                debug!(
                    blobs = summary.blobs,
                    elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
                    "frame processed"
                );
                Ok(())
            }
            Err(err) => {
                self.buffers.discard();
                warn!(error = %err, "frame aborted");
                Err(err)
            }
        }
    }

    fn run_stages(&mut self, depth: &DepthFrame, cloud: &PointCloud, min_pts: usize) -> Result<ReduceSummary> {
        let Self {
            config,
            classifier,
            smoother,
            labeler,
            relations,
            buffers,
            pool,
            ..
        } = self;
        let pool = pool.as_ref();
        let dims = depth.dims();

        let t = Instant::now();
        in_pool(pool, || classifier.classify(depth, &mut buffers.raw_labels))?;
        check_output(Stage::Classifier, dims, buffers.raw_labels.dims())?;
        let FrameBuffers {
            raw_labels,
            smoothed_labels,
            ..
        } = &mut *buffers;
        in_pool(pool, || smoother.smooth(raw_labels, depth, smoothed_labels))?;
        check_output(Stage::Smoother, dims, smoothed_labels.dims())?;
        debug!(elapsed_ms = t.elapsed().as_secs_f64() * 1e3, "classify and smooth");

        let t = Instant::now();
        let FrameBuffers {
            smoothed_labels,
            components,
            ..
        } = &mut *buffers;
        in_pool(pool, || labeler.label_components(smoothed_labels, depth, components))?;
        check_output(Stage::ComponentLabeler, dims, components.dims())?;
        debug!(elapsed_ms = t.elapsed().as_secs_f64() * 1e3, "component labeling");

        let t = Instant::now();
        let summary = reduce_blobs(buffers, cloud, min_pts, config.max_cluster_size)?;
        trace!(?summary, "blob reduction");
        relations.build_relations(&mut buffers.blob_matrix)?;
        debug!(elapsed_ms = t.elapsed().as_secs_f64() * 1e3, "reduce and relate");
        Ok(summary)
    }

    /// Smoothed labels of the last processed frame.
    pub fn labels(&self) -> &LabelImage {
        self.buffers.smoothed_labels()
    }

    /// Classifier output of the last processed frame, before smoothing.
    pub fn raw_labels(&self) -> &LabelImage {
        self.buffers.raw_labels()
    }

    /// Component map of the last processed frame.
    pub fn components(&self) -> &ComponentIdMap {
        self.buffers.components()
    }

    /// Blob table of the last processed frame.
    pub fn blob_matrix(&self) -> &BlobMatrix {
        self.buffers.blob_matrix()
    }

    pub fn blob_count(&self) -> usize {
        blob_count(self.buffers.blob_matrix())
    }

    pub fn trees_number(&self) -> usize {
        self.classifier.trees_number()
    }

    pub fn colorize_labels(&self, labels: &LabelImage) -> RgbaImage {
        self.color_map.colorize(labels)
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Resolution the buffers are currently sized for.
    pub fn dims(&self) -> (usize, usize) {
        self.buffers.dims()
    }
}

fn in_pool<R: Send>(pool: Option<&rayon::ThreadPool>, f: impl FnOnce() -> R + Send) -> R {
    match pool {
        Some(pool) => pool.install(f),
        None => f(),
    }
}

fn check_output(stage: Stage, expected: (usize, usize), found: (usize, usize)) -> Result<()> {
    if expected != found {
        return Err(DetectorError::stage(
            stage,
            format!("produced a {}x{} buffer for a {}x{} frame", found.0, found.1, expected.0, expected.1),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::body_part::BACKGROUND;
    use crate::core_modules::grid::Grid;
    use crate::core_modules::tree::Tree;
    use nalgebra::Point3;

    struct BrokenKernel;

    impl Classifier for BrokenKernel {
        fn classify(&mut self, _depth: &DepthFrame, _labels: &mut LabelImage) -> Result<()> {
            Err(DetectorError::stage(Stage::Classifier, "device lost"))
        }
    }

    fn frame(rows: usize, cols: usize, depth: u16) -> (DepthFrame, PointCloud) {
        let z = depth as f32 / 1000.0;
        (
            Grid::new(rows, cols, depth),
            Grid::from_fn(rows, cols, |r, c| Point3::new(c as f32 * 0.01, r as f32 * 0.01, z)),
        )
    }

    #[test]
    fn requires_a_tree_or_a_classifier() {
        let sources: Vec<Tree> = Vec::new();
        assert!(matches!(
            BodyPartsDetector::new(sources, DetectorConfig::with_resolution(4, 4)),
            Err(DetectorError::EmptyEnsemble)
        ));
        assert!(matches!(
            BodyPartsDetector::builder(DetectorConfig::with_resolution(4, 4)).build(),
            Err(DetectorError::EmptyEnsemble)
        ));
    }

    #[test]
    fn mismatched_cloud_is_rejected_up_front() {
        let mut detector =
            BodyPartsDetector::new(vec![Tree::constant(3)], DetectorConfig::with_resolution(4, 4)).unwrap();
        let (depth, good_cloud) = frame(4, 4, 1000);
        detector.process(&depth, &good_cloud, 1).unwrap();
        assert_eq!(detector.blob_count(), 1);

        let (_, cloud) = frame(4, 5, 1000);
        assert!(matches!(
            detector.process(&depth, &cloud, 1),
            Err(DetectorError::DimensionMismatch { .. })
        ));
        assert_eq!(detector.dims(), (4, 4));
        assert_eq!(detector.blob_count(), 0);
    }

    #[test]
    fn failed_stage_publishes_no_blobs() {
        let config = DetectorConfig::with_resolution(4, 4);
        let mut detector = BodyPartsDetector::new(vec![Tree::constant(3)], config.clone()).unwrap();
        let (depth, cloud) = frame(4, 4, 1000);
        detector.process(&depth, &cloud, 1).unwrap();
        assert_eq!(detector.blob_count(), 1);

        let mut broken = BodyPartsDetector::builder(config).classifier(BrokenKernel).build().unwrap();
        assert!(matches!(
            broken.process(&depth, &cloud, 1),
            Err(DetectorError::Stage { stage: Stage::Classifier, .. })
        ));
        assert_eq!(broken.blob_count(), 0);
    }

    #[test]
    fn dedicated_pool_gives_same_result() {
        let (depth, cloud) = frame(6, 6, 1200);
        let mut shared = BodyPartsDetector::new(vec![Tree::constant(7)], DetectorConfig::with_resolution(6, 6)).unwrap();
        let mut pooled = BodyPartsDetector::new(
            vec![Tree::constant(7)],
            DetectorConfig {
                threads: Some(2),
                ..DetectorConfig::with_resolution(6, 6)
            },
        )
        .unwrap();
        shared.process(&depth, &cloud, 1).unwrap();
        pooled.process(&depth, &cloud, 1).unwrap();
        assert_eq!(shared.blob_matrix(), pooled.blob_matrix());
        assert_eq!(pooled.trees_number(), 1);
    }

    #[test]
    fn zero_depth_frame_has_only_invalid_pixels() {
        let mut detector =
            BodyPartsDetector::new(vec![Tree::constant(3)], DetectorConfig::with_resolution(3, 3)).unwrap();
        let (depth, cloud) = frame(3, 3, 0);
        detector.process(&depth, &cloud, 0).unwrap();
        assert_eq!(detector.blob_count(), 0);
        assert!(detector.labels().as_slice().iter().all(|&l| l == BACKGROUND));
        assert!(detector.components().as_slice().iter().all(Option::is_none));
    }
}
