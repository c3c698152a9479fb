// THEORY:
// This file is the entry point of the `bodyparts_detector` library crate. The
// crate turns one depth frame at a time into a table of body-part blobs that a
// skeleton estimator can consume.
//
// The public face is `BodyPartsDetector` (in `pipeline`), configured through
// `DetectorConfig`, plus `DetectorService` (in `async_pipeline`) for async
// callers. The stage contracts (`Classifier`, `Smoother`, `ComponentLabeler`,
// `RelationBuilder`) and their CPU reference implementations live in
// `core_modules`, so a device back end can replace any stage without touching
// the blob reduction that the rest of the crate is built around.

pub mod async_pipeline;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use async_pipeline::{DetectorService, FrameResult};
pub use config::DetectorConfig;
pub use core_modules::blob::{Blob, BlobLink, BlobMatrix, LinkKind};
pub use core_modules::body_part::{BACKGROUND, BodyPart, Label, NUM_PARTS};
pub use core_modules::classifier::{Classifier, ForestClassifier};
pub use core_modules::components::{ComponentLabeler, DepthComponentLabeler};
pub use core_modules::grid::{ComponentId, ComponentIdMap, DepthFrame, Grid, LabelImage, PointCloud};
pub use core_modules::relations::{NearestParentRelations, NoRelations, RelationBuilder};
pub use core_modules::smoother::{Smoother, WindowSmoother};
pub use core_modules::tree::{Ensemble, Node, Tree, TreeSource};
pub use error::{DetectorError, Result, Stage};
pub use pipeline::{BodyPartsDetector, DetectorBuilder};
