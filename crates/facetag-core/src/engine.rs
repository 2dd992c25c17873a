//! Boundary to the face detection / embedding engine.
//!
//! The distance metric, the detector and the nearest-neighbour search all
//! belong to the engine. The recognizer only orchestrates calls through
//! [`FaceEngine`], so any engine (or a scripted double) can be plugged in.

use crate::types::{DetectedFace, Descriptor, RowId};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine initialization failed: {0}")]
    Init(String),
    #[error("detection failed: {0}")]
    Detection(String),
}

/// Outcome of a detection where exactly one face is expected.
#[derive(Debug, Clone, PartialEq)]
pub enum SingleFace {
    Found(DetectedFace),
    NotFound,
    /// More than one face; carries the number detected.
    Ambiguous(usize),
}

impl From<Vec<DetectedFace>> for SingleFace {
    fn from(mut faces: Vec<DetectedFace>) -> Self {
        match faces.len() {
            0 => SingleFace::NotFound,
            1 => SingleFace::Found(faces.remove(0)),
            n => SingleFace::Ambiguous(n),
        }
    }
}

/// A face engine owned exclusively by one recognizer.
///
/// Dropping the engine releases its model resources.
pub trait FaceEngine: Send {
    /// Detect every face on the image at `path`.
    fn detect(&mut self, path: &Path, high_accuracy: bool)
        -> Result<Vec<DetectedFace>, EngineError>;

    /// Detect the single face on the image at `path`.
    fn detect_single(&mut self, path: &Path, high_accuracy: bool) -> Result<SingleFace, EngineError> {
        Ok(self.detect(path, high_accuracy)?.into())
    }

    /// Replace the matching index with `rows`.
    fn build_index(&mut self, rows: Vec<(RowId, Descriptor)>);

    /// Nearest indexed row whose distance to `probe` is within `tolerance`.
    fn match_within_tolerance(&self, probe: &Descriptor, tolerance: f32) -> Option<RowId>;
}
