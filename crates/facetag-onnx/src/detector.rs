//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes a grayscale image into the square model input, decodes the
//! three stride levels (score, box offsets, five keypoints), then applies
//! non-maximum suppression.

use facetag_core::Rectangle;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
const SCRFD_OUTPUTS: usize = SCRFD_STRIDES.len() * 3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// One face found by SCRFD, in source image coordinates.
#[derive(Debug, Clone)]
pub struct Detection {
    pub rectangle: Rectangle,
    /// [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Scale and padding used to map letterboxed coordinates back to the source.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: usize, height: usize, target: usize) -> Self {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: (target as f32 - new_w) / 2.0,
            pad_y: (target as f32 - new_h) / 2.0,
        }
    }

    fn to_source(self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// (score, bbox, kps) output tensor positions for one stride.
type StrideOutputs = (usize, usize, usize);

pub struct FaceDetector {
    session: Session,
    stride_outputs: [StrideOutputs; 3],
}

impl FaceDetector {
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.is_file() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if output_names.len() < SCRFD_OUTPUTS {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs {SCRFD_OUTPUTS} outputs (score/bbox/kps per stride), got {}",
                output_names.len()
            )));
        }

        let stride_outputs = map_outputs(&output_names);
        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            ?stride_outputs,
            "loaded SCRFD model"
        );

        Ok(Self {
            session,
            stride_outputs,
        })
    }

    /// Detect faces in an 8-bit grayscale image, highest confidence first.
    pub fn detect(&mut self, gray: &[u8], width: u32, height: u32) -> Result<Vec<Detection>, DetectorError> {
        let (width, height) = (width as usize, height as usize);
        if width == 0 || height == 0 || gray.len() < width * height {
            return Err(DetectorError::InferenceFailed(format!(
                "image buffer of {} bytes does not cover {width}x{height}",
                gray.len()
            )));
        }

        let letterbox = Letterbox::fit(width, height, SCRFD_INPUT_SIZE);
        let input = to_tensor(gray, width, height, letterbox);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_outputs[pos];
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };

            let scores = extract(score_idx, "scores")?;
            let boxes = extract(bbox_idx, "boxes")?;
            let kps = extract(kps_idx, "keypoints")?;
            candidates.extend(decode_stride(scores, boxes, kps, stride, letterbox));
        }

        let kept = nms(candidates, SCRFD_NMS_THRESHOLD);
        tracing::debug!(faces = kept.len(), "SCRFD detections");
        Ok(kept)
    }
}

/// Map output tensors to strides by name (`score_8`, `bbox_16`, ...) when
/// the export names them, else assume [scores x3, boxes x3, kps x3].
fn map_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let find = |kind: &str, stride: usize| names.iter().position(|n| *n == format!("{kind}_{stride}"));

    let by_name: Option<Vec<StrideOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&s| Some((find("score", s)?, find("bbox", s)?, find("kps", s)?)))
        .collect();

    match by_name {
        Some(v) => [v[0], v[1], v[2]],
        None => [(0, 3, 6), (1, 4, 7), (2, 5, 8)],
    }
}

/// Bilinear letterbox resize into a normalized 1x3xNxN tensor (Y replicated to RGB).
fn to_tensor(gray: &[u8], width: usize, height: usize, lb: Letterbox) -> Array4<f32> {
    let size = SCRFD_INPUT_SIZE;
    let new_w = (width as f32 * lb.scale).round() as usize;
    let new_h = (height as f32 * lb.scale).round() as usize;
    let x_start = lb.pad_x.floor() as usize;
    let y_start = lb.pad_y.floor() as usize;
    let inv = 1.0 / lb.scale;

    // Padding is SCRFD_MEAN, which normalizes to zero.
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for y in 0..new_h.min(size - y_start) {
        let sy = ((y as f32 + 0.5) * inv - 0.5).max(0.0);
        let y0 = (sy.floor() as usize).min(height - 1);
        let y1 = (y0 + 1).min(height - 1);
        let fy = sy - sy.floor();

        for x in 0..new_w.min(size - x_start) {
            let sx = ((x as f32 + 0.5) * inv - 0.5).max(0.0);
            let x0 = (sx.floor() as usize).min(width - 1);
            let x1 = (x0 + 1).min(width - 1);
            let fx = sx - sx.floor();

            let px = |xx: usize, yy: usize| gray[yy * width + xx] as f32;
            let value = px(x0, y0) * (1.0 - fx) * (1.0 - fy)
                + px(x1, y0) * fx * (1.0 - fy)
                + px(x0, y1) * (1.0 - fx) * fy
                + px(x1, y1) * fx * fy;

            let normalized = (value.round().clamp(0.0, 255.0) - SCRFD_MEAN) / SCRFD_STD;
            for c in 0..3 {
                tensor[[0, c, y_start + y, x_start + x]] = normalized;
            }
        }
    }

    tensor
}

fn decode_stride(
    scores: &[f32],
    boxes: &[f32],
    kps: &[f32],
    stride: usize,
    lb: Letterbox,
) -> Vec<Detection> {
    let grid = SCRFD_INPUT_SIZE / stride;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    let mut out = Vec::new();
    for idx in 0..anchors.min(scores.len()) {
        let score = scores[idx];
        if score <= SCRFD_CONFIDENCE_THRESHOLD {
            continue;
        }
        let Some(b) = boxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let ax = (cell % grid) as f32 * step;
        let ay = (cell / grid) as f32 * step;

        let (x1, y1) = lb.to_source(ax - b[0] * step, ay - b[1] * step);
        let (x2, y2) = lb.to_source(ax + b[2] * step, ay + b[3] * step);

        let landmarks = kps.get(idx * 10..idx * 10 + 10).map(|k| {
            std::array::from_fn(|i| lb.to_source(ax + k[i * 2] * step, ay + k[i * 2 + 1] * step))
        });

        out.push(Detection {
            rectangle: Rectangle {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
            },
            landmarks,
        });
    }
    out
}

/// Greedy NMS; returns survivors sorted by descending confidence.
fn nms(mut dets: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    dets.sort_by(|a, b| b.rectangle.confidence.total_cmp(&a.rectangle.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    for det in dets {
        if keep.iter().all(|k| iou(&k.rectangle, &det.rectangle) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

fn iou(a: &Rectangle, b: &Rectangle) -> f32 {
    let w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = w * h;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
