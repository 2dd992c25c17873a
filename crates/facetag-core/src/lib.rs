//! facetag-core — Labeled face gallery and identity classification.
//!
//! Enrolls (identity, descriptor) samples into an ordered gallery, persists
//! it as JSON, and resolves faces on new images to gallery identities by
//! nearest-descriptor matching within a tolerance. Detection and embedding
//! are delegated to a [`FaceEngine`].

pub mod config;
pub mod engine;
pub mod gallery;
pub mod index;
pub mod preprocess;
pub mod recognizer;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod types;

pub use config::{ConfigError, RecognizerConfig, DEFAULT_TOLERANCE};
pub use engine::{EngineError, FaceEngine, SingleFace};
pub use gallery::{DatasetError, Gallery};
pub use index::LinearIndex;
pub use preprocess::PreprocessError;
pub use recognizer::{RecognizeError, Recognizer};
pub use types::{
    Classification, ClassifiedFace, DetectedFace, Descriptor, GroupClassification, Rectangle, RowId,
    Sample,
};
