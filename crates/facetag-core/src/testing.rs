//! Deterministic engine for exercising recognizer orchestration.
//!
//! [`ScriptedEngine`] identifies an image by its pixel dimensions, so the
//! same script answers for the original file and for its grayscale copy.

use crate::engine::{EngineError, FaceEngine};
use crate::index::LinearIndex;
use crate::types::{DetectedFace, Descriptor, RowId};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct ScriptedEngine {
    faces: HashMap<(u32, u32), Vec<DetectedFace>>,
    failing: HashSet<(u32, u32)>,
    index: LinearIndex,
    index_builds: usize,
    seen: Vec<PathBuf>,
    high_accuracy_calls: usize,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `faces` for any image of size `(width, height)`.
    pub fn with_faces(mut self, size: (u32, u32), faces: Vec<DetectedFace>) -> Self {
        self.faces.insert(size, faces);
        self
    }

    /// Fail detection for images of size `(width, height)`.
    pub fn failing_on(mut self, size: (u32, u32)) -> Self {
        self.failing.insert(size);
        self
    }

    /// Number of times the index has been (re)built.
    pub fn index_builds(&self) -> usize {
        self.index_builds
    }

    pub fn indexed_rows(&self) -> usize {
        self.index.len()
    }

    /// Every path handed to the engine, in call order.
    pub fn seen_paths(&self) -> &[PathBuf] {
        &self.seen
    }

    pub fn high_accuracy_calls(&self) -> usize {
        self.high_accuracy_calls
    }
}

impl FaceEngine for ScriptedEngine {
    fn detect(&mut self, path: &Path, high_accuracy: bool) -> Result<Vec<DetectedFace>, EngineError> {
        self.seen.push(path.to_path_buf());
        if high_accuracy {
            self.high_accuracy_calls += 1;
        }

        let size = image::image_dimensions(path)
            .map_err(|e| EngineError::Detection(format!("{}: {e}", path.display())))?;
        if self.failing.contains(&size) {
            return Err(EngineError::Detection(format!(
                "scripted failure for {}x{}",
                size.0, size.1
            )));
        }
        Ok(self.faces.get(&size).cloned().unwrap_or_default())
    }

    fn build_index(&mut self, rows: Vec<(RowId, Descriptor)>) {
        self.index = LinearIndex::build(rows);
        self.index_builds += 1;
    }

    fn match_within_tolerance(&self, probe: &Descriptor, tolerance: f32) -> Option<RowId> {
        self.index.nearest_within(probe, tolerance)
    }
}
