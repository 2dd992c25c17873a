//! facetag-onnx — Face engine backed by ONNX Runtime.
//!
//! SCRFD finds faces and their five landmarks, each face is aligned to the
//! ArcFace template, and ArcFace produces a 512-dimensional L2-normalized
//! descriptor. Matching is Euclidean over those descriptors.

pub mod alignment;
pub mod detector;
pub mod embedder;
pub mod engine;

pub use detector::{Detection, DetectorError, FaceDetector};
pub use embedder::{EmbedderError, FaceEmbedder};
pub use engine::{default_model_dir, OnnxEngine};
