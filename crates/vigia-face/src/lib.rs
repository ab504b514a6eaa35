//! vigia-face — ONNX-backed implementation of the face capability.
//!
//! Decodes uploaded frames, runs a combined detection+embedding model via
//! ONNX Runtime, and hands unit-normalized embeddings to the decision
//! engine.

pub mod handle;
pub mod pipeline;

pub use handle::{spawn_pipeline, PipelineHandle};
pub use pipeline::{FacePipeline, PipelineError, DEFAULT_CONFIDENCE_THRESHOLD};
