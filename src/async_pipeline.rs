// THEORY:
// `DetectorService` lets an async application hand frames to a detector
// without blocking its executor. One worker owns the detector on a blocking
// thread; frames arrive over a bounded channel and each result travels back on
// its own oneshot channel. Because there is a single worker and the channel is
// FIFO, frames are still processed strictly one after another, in submission
// order. The caller gains overlap (capturing frame N+1 while frame N is being
// processed), never concurrency within the detector.

use crate::core_modules::blob::BlobMatrix;
use crate::core_modules::grid::{DepthFrame, LabelImage, PointCloud};
use crate::error::{DetectorError, Result};
use crate::pipeline::BodyPartsDetector;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

/// A finished frame, detached from the detector's buffers.
#[derive(Debug, Clone)]
pub struct FrameResult {
    /// Position of the frame in submission order, from 0.
    pub frame_id: u64,
    pub labels: LabelImage,
    pub blobs: BlobMatrix,
}

struct FrameTask {
    depth: DepthFrame,
    cloud: PointCloud,
    min_pts_per_cluster: usize,
    result_sender: oneshot::Sender<Result<FrameResult>>,
}

pub struct DetectorService {
    task_sender: mpsc::Sender<FrameTask>,
    worker: JoinHandle<BodyPartsDetector>,
}

impl DetectorService {
    /// Moves `detector` onto a worker thread. At most `queue_depth` frames wait
    /// in line; further submissions wait for room. Must be called from within a
    /// tokio runtime.
    pub fn spawn(mut detector: BodyPartsDetector, queue_depth: usize) -> Self {
        let (task_sender, mut task_receiver) = mpsc::channel::<FrameTask>(queue_depth.max(1));

        let worker = tokio::task::spawn_blocking(move || {
            let mut frame_id = 0u64;
            while let Some(task) = task_receiver.blocking_recv() {
                let result = detector
                    .process(&task.depth, &task.cloud, task.min_pts_per_cluster)
                    .map(|()| FrameResult {
                        frame_id,
                        labels: detector.labels().clone(),
                        blobs: detector.blob_matrix().clone(),
                    });
                frame_id += 1;
                // The submitter may have stopped waiting; that is not our problem.
                let _ = task.result_sender.send(result);
            }
            debug!(frames = frame_id, "detector service stopped");
            detector
        });

        Self { task_sender, worker }
    }

    /// Queues a frame and waits for its result.
    pub async fn process(
        &self,
        depth: DepthFrame,
        cloud: PointCloud,
        min_pts_per_cluster: usize,
    ) -> Result<FrameResult> {
        let receiver = self.submit(depth, cloud, min_pts_per_cluster).await?;
        receiver.await.map_err(|_| DetectorError::ServiceClosed)?
    }

    /// Queues a frame and returns a receiver for its result, so the caller can
    /// keep several frames in flight.
    pub async fn submit(
        &self,
        depth: DepthFrame,
        cloud: PointCloud,
        min_pts_per_cluster: usize,
    ) -> Result<oneshot::Receiver<Result<FrameResult>>> {
        let (result_sender, result_receiver) = oneshot::channel();
        let task = FrameTask {
            depth,
            cloud,
            min_pts_per_cluster,
            result_sender,
        };
        self.task_sender
            .send(task)
            .await
            .map_err(|_| DetectorError::ServiceClosed)?;
        Ok(result_receiver)
    }

    /// Stops accepting frames, drains the queue and hands the detector back.
    pub async fn shutdown(self) -> Result<BodyPartsDetector> {
        let Self { task_sender, worker } = self;
        drop(task_sender);
        worker.await.map_err(|_| DetectorError::ServiceClosed)
    }
}
