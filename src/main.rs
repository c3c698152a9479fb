// Example runner: segments a few synthetic frames of a person raising a hand
// in front of a wall and logs the blobs found. Pass a path to also write the
// colourised labels of the last frame as a PNG.
//
//   RUST_LOG=debug cargo run -- labels.png

use bodyparts_detector::core_modules::blob::iter_blobs;
use bodyparts_detector::{
    BodyPart, BodyPartsDetector, DepthFrame, DetectorConfig, DetectorService, Grid, NearestParentRelations, Node,
    PointCloud, Tree,
};
use nalgebra::Point3;
use tracing::info;
use tracing_subscriber::EnvFilter;

const ROWS: usize = 120;
const COLS: usize = 160;
const FOCAL: f32 = 140.0;
const WALL_DEPTH: u16 = 3000;
const BODY_DEPTH: u16 = 1500;
const HAND_DEPTH: u16 = 1200;

/// Near pixels are hand, mid-range pixels chest, everything else background.
/// Both splits compare the pixel with an off-frame probe, which reads as a
/// constant far depth, so they act as depth thresholds.
fn demo_tree() -> bodyparts_detector::Result<Tree> {
    let far_probe = 1000;
    let nodes = vec![
        Node::new(0, 0, far_probe, 0, -8000), // depth > 2000 -> right
        Node::new(0, 0, far_probe, 0, -8700), // depth > 1300 -> chest
        Node::new(0, 0, far_probe, 0, 0),
    ];
    let leaves = vec![
        BodyPart::RHand.label(),
        BodyPart::RChest.label(),
        BodyPart::Background.label(),
        BodyPart::Background.label(),
    ];
    Tree::new(2, nodes, leaves)
}

fn synthetic_frame(hand_row: usize) -> (DepthFrame, PointCloud) {
    let depth = Grid::from_fn(ROWS, COLS, |r, c| {
        let in_hand = (hand_row..hand_row + 15).contains(&r) && (100..115).contains(&c);
        let in_body = (40..110).contains(&r) && (60..100).contains(&c);
        if in_hand {
            HAND_DEPTH
        } else if in_body {
            BODY_DEPTH
        } else {
            WALL_DEPTH
        }
    });
    let (cx, cy) = (COLS as f32 / 2.0, ROWS as f32 / 2.0);
    let cloud = Grid::from_fn(ROWS, COLS, |r, c| {
        let z = depth[r * COLS + c] as f32 / 1000.0;
        Point3::new((c as f32 - cx) * z / FOCAL, (r as f32 - cy) * z / FOCAL, z)
    });
    (depth, cloud)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let output = std::env::args().nth(1);

    let detector = BodyPartsDetector::builder(DetectorConfig::with_resolution(ROWS, COLS))
        .trees([demo_tree()?])?
        .relation_builder(NearestParentRelations::new(1.0)?)
        .build()?;
    let service = DetectorService::spawn(detector, 2);

    let mut last_labels = None;
    for hand_row in [60, 45, 30] {
        let (depth, cloud) = synthetic_frame(hand_row);
        let result = service.process(depth, cloud, 50).await?;
        for blob in iter_blobs(&result.blobs) {
            info!(
                frame = result.frame_id,
                id = blob.id,
                part = ?BodyPart::from_label(blob.label),
                points = blob.size(),
                mean = ?blob.mean,
                links = blob.links.len(),
                "blob"
            );
        }
        last_labels = Some(result.labels);
    }

    let detector = service.shutdown().await?;
    if let (Some(path), Some(labels)) = (output, last_labels) {
        detector.colorize_labels(&labels).save(&path)?;
        info!(%path, "wrote colourised labels");
    }
    Ok(())
}
