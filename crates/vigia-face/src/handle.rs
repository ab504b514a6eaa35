//! Dedicated-thread front for the blocking ONNX session.
//!
//! The session lives on its own OS thread behind an mpsc request channel;
//! async callers hold a clone-safe handle. Loading happens before the
//! thread starts, so a missing or corrupt model fails fast at startup.

use crate::pipeline::{FacePipeline, PipelineError};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use vigia_core::{DetectedFace, FaceCapability, InfraError};

enum PipelineRequest {
    Detect {
        frame: Vec<u8>,
        reply: oneshot::Sender<Result<Vec<DetectedFace>, PipelineError>>,
    },
}

/// Clone-safe handle to the pipeline thread.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::Sender<PipelineRequest>,
}

/// Load the model and spawn the pipeline on a dedicated OS thread.
pub fn spawn_pipeline(model_path: &str, confidence: f32) -> Result<PipelineHandle, PipelineError> {
    let mut pipeline = FacePipeline::load(model_path, confidence)?;

    let (tx, mut rx) = mpsc::channel::<PipelineRequest>(4);

    std::thread::Builder::new()
        .name("vigia-face".into())
        .spawn(move || {
            tracing::info!("face pipeline thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    PipelineRequest::Detect { frame, reply } => {
                        let _ = reply.send(pipeline.detect(&frame));
                    }
                }
            }
            tracing::info!("face pipeline thread exiting");
        })
        .expect("failed to spawn face pipeline thread");

    Ok(PipelineHandle { tx })
}

impl PipelineHandle {
    async fn request(&self, frame: Vec<u8>) -> Result<Vec<DetectedFace>, PipelineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PipelineRequest::Detect {
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| PipelineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| PipelineError::ChannelClosed)?
    }
}

#[async_trait]
impl FaceCapability for PipelineHandle {
    async fn detect(&self, frame: &[u8]) -> Result<Vec<DetectedFace>, InfraError> {
        self.request(frame.to_vec())
            .await
            .map_err(|e| InfraError::Capability(Box::new(e)))
    }
}
