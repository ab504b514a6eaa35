//! ONNX face pipeline: frame bytes in, detected faces out.
//!
//! Runs a single-stage detection+embedding model. The expected output is a
//! `[N, 517]` float tensor, one row per candidate face:
//! `(cx, cy, w, h, score, 512-dim embedding)` with box coordinates in
//! model-input pixels. Rows under the confidence threshold are dropped and
//! surviving embeddings are L2-normalized, so downstream distance
//! comparisons see unit vectors.

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;
use vigia_core::types::l2_normalize;
use vigia_core::{BoundingBox, DetectedFace};

const INPUT_SIZE: usize = 640;
const INPUT_MEAN: f32 = 127.5;
const INPUT_STD: f32 = 128.0;
const EMBEDDING_DIM: usize = 512;
/// cx, cy, w, h, score, then the embedding.
const ROW_LEN: usize = 5 + EMBEDDING_DIM;

/// Default detection score below which a candidate row is discarded.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("frame decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
    #[error("pipeline thread exited")]
    ChannelClosed,
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Owns the ONNX session. Inference is blocking; run it on a dedicated
/// thread via [`spawn_pipeline`](crate::spawn_pipeline).
pub struct FacePipeline {
    session: Session,
    confidence: f32,
}

impl FacePipeline {
    /// Load the pipeline model from the given path.
    pub fn load(model_path: &str, confidence: f32) -> Result<Self, PipelineError> {
        if !Path::new(model_path).exists() {
            return Err(PipelineError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face pipeline model"
        );

        Ok(Self {
            session,
            confidence,
        })
    }

    /// Decode an uploaded frame and return every face found in it,
    /// highest confidence first.
    pub fn detect(&mut self, frame: &[u8]) -> Result<Vec<DetectedFace>, PipelineError> {
        let rgb = image::load_from_memory(frame)?.to_rgb8();
        let (src_w, src_h) = rgb.dimensions();

        let (input, letterbox) = preprocess(&rgb);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::Inference(format!("output extraction: {e}")))?;

        if data.len() % ROW_LEN != 0 {
            return Err(PipelineError::Inference(format!(
                "output length {} is not a multiple of row length {ROW_LEN}",
                data.len()
            )));
        }

        let mut faces = decode_detections(data, self.confidence, &letterbox, src_w, src_h);
        faces.sort_by(|a, b| {
            b.bounding_box
                .confidence
                .partial_cmp(&a.bounding_box.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        tracing::debug!(found = faces.len(), "frame processed");
        Ok(faces)
    }
}

/// Letterbox-resize an RGB frame into a normalized NCHW tensor.
fn preprocess(rgb: &RgbImage) -> (Array4<f32>, Letterbox) {
    let (width, height) = rgb.dimensions();

    let scale_w = INPUT_SIZE as f32 / width as f32;
    let scale_h = INPUT_SIZE as f32 / height as f32;
    let scale = scale_w.min(scale_h);

    let new_w = ((width as f32 * scale).round() as u32).max(1);
    let new_h = ((height as f32 * scale).round() as u32).max(1);
    let pad_x = (INPUT_SIZE as f32 - new_w as f32) / 2.0;
    let pad_y = (INPUT_SIZE as f32 - new_h as f32) / 2.0;

    let resized = image::imageops::resize(rgb, new_w, new_h, FilterType::Triangle);

    // Zeros outside the letterbox; the model was exported with zero padding.
    let mut tensor = Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
    let x0 = pad_x.floor() as usize;
    let y0 = pad_y.floor() as usize;

    for y in 0..new_h as usize {
        for x in 0..new_w as usize {
            let pixel = resized.get_pixel(x as u32, y as u32);
            for c in 0..3 {
                tensor[[0, c, y0 + y, x0 + x]] = (pixel.0[c] as f32 - INPUT_MEAN) / INPUT_STD;
            }
        }
    }

    (tensor, Letterbox { scale, pad_x, pad_y })
}

/// Filter candidate rows and map boxes back to source-image pixels.
fn decode_detections(
    data: &[f32],
    confidence: f32,
    letterbox: &Letterbox,
    src_w: u32,
    src_h: u32,
) -> Vec<DetectedFace> {
    let mut faces = Vec::new();

    for row in data.chunks_exact(ROW_LEN) {
        let (cx, cy, w, h, score) = (row[0], row[1], row[2], row[3], row[4]);
        if score < confidence {
            continue;
        }

        let inv = 1.0 / letterbox.scale;
        let x = ((cx - w / 2.0 - letterbox.pad_x) * inv).clamp(0.0, src_w as f32);
        let y = ((cy - h / 2.0 - letterbox.pad_y) * inv).clamp(0.0, src_h as f32);
        let width = (w * inv).min(src_w as f32 - x);
        let height = (h * inv).min(src_h as f32 - y);

        let mut embedding = row[5..].to_vec();
        l2_normalize(&mut embedding);

        faces.push(DetectedFace {
            embedding,
            bounding_box: BoundingBox {
                x,
                y,
                width,
                height,
                confidence: score,
            },
        });
    }

    faces
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build one output row: a box centered at (cx, cy) with the given
    /// score and an embedding pointing along one axis.
    fn row(cx: f32, cy: f32, w: f32, h: f32, score: f32, axis: usize) -> Vec<f32> {
        let mut r = vec![cx, cy, w, h, score];
        let mut embedding = vec![0.0; EMBEDDING_DIM];
        embedding[axis] = 2.5;
        r.extend(embedding);
        r
    }

    #[test]
    fn test_decode_filters_by_confidence() {
        let lb = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let mut data = row(100.0, 100.0, 50.0, 60.0, 0.9, 0);
        data.extend(row(200.0, 200.0, 50.0, 60.0, 0.2, 1));

        let faces = decode_detections(&data, 0.5, &lb, 640, 640);
        assert_eq!(faces.len(), 1);
        assert!((faces[0].bounding_box.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_decode_normalizes_embeddings() {
        let lb = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let data = row(100.0, 100.0, 50.0, 60.0, 0.9, 3);

        let faces = decode_detections(&data, 0.5, &lb, 640, 640);
        let norm: f32 = faces[0].embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!((faces[0].embedding[3] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_decode_undoes_letterbox() {
        // Source 1280x640 scales by 0.5 to 640x320, padded 160 top/bottom.
        let lb = Letterbox {
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 160.0,
        };
        let data = row(320.0, 320.0, 100.0, 100.0, 0.9, 0);

        let faces = decode_detections(&data, 0.5, &lb, 1280, 640);
        let b = faces[0].bounding_box;
        assert!((b.x - 540.0).abs() < 1e-3);
        assert!((b.y - 220.0).abs() < 1e-3);
        assert!((b.width - 200.0).abs() < 1e-3);
        assert!((b.height - 200.0).abs() < 1e-3);
    }

    #[test]
    fn test_preprocess_shape_and_normalization() {
        // A uniform mid-gray image: every in-letterbox value normalizes to
        // (128 - 127.5) / 128.
        let rgb = RgbImage::from_pixel(64, 64, image::Rgb([128, 128, 128]));
        let (tensor, lb) = preprocess(&rgb);

        assert_eq!(tensor.shape(), &[1, 3, INPUT_SIZE, INPUT_SIZE]);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 0.0);
        assert!((lb.scale - 10.0).abs() < 1e-6);

        let expected = (128.0 - INPUT_MEAN) / INPUT_STD;
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 1e-6);
        assert!((tensor[[0, 2, INPUT_SIZE - 1, INPUT_SIZE - 1]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_pads_non_square_frames() {
        let rgb = RgbImage::from_pixel(64, 32, image::Rgb([255, 255, 255]));
        let (tensor, lb) = preprocess(&rgb);

        assert!((lb.scale - 10.0).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert!((lb.pad_y - 160.0).abs() < 1e-6);
        // Padding stays zero; the letterbox interior carries the image.
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        assert!(tensor[[0, 0, INPUT_SIZE / 2, INPUT_SIZE / 2]] > 0.9);
    }
}
