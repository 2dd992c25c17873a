use crate::detector::{DetectorError, FaceDetector};
use crate::embedder::{EmbedderError, FaceEmbedder};
use facetag_core::{DetectedFace, Descriptor, EngineError, FaceEngine, LinearIndex, RowId};
use std::path::{Path, PathBuf};

/// Accurate SCRFD model (required).
pub const ACCURATE_DETECTOR_FILE: &str = "det_10g.onnx";
/// Fast SCRFD model (optional).
pub const FAST_DETECTOR_FILE: &str = "det_500m.onnx";
/// ArcFace recognition model (required).
pub const EMBEDDER_FILE: &str = "w600k_r50.onnx";

impl From<DetectorError> for EngineError {
    fn from(err: DetectorError) -> Self {
        match err {
            DetectorError::ModelNotFound(_) => EngineError::Init(err.to_string()),
            _ => EngineError::Detection(err.to_string()),
        }
    }
}

impl From<EmbedderError> for EngineError {
    fn from(err: EmbedderError) -> Self {
        match err {
            EmbedderError::ModelNotFound(_) => EngineError::Init(err.to_string()),
            _ => EngineError::Detection(err.to_string()),
        }
    }
}

/// Default model directory: `$XDG_DATA_HOME/facetag/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facetag/models")
}

/// SCRFD + ArcFace engine with a brute-force Euclidean index.
///
/// Models are loaded once in [`OnnxEngine::load`] and freed on drop.
pub struct OnnxEngine {
    accurate: FaceDetector,
    /// `None` when only the accurate model is installed.
    fast: Option<FaceDetector>,
    embedder: FaceEmbedder,
    index: LinearIndex,
}

impl OnnxEngine {
    /// Load the models from `model_dir`, failing fast on anything missing.
    pub fn load(model_dir: impl AsRef<Path>) -> Result<Self, EngineError> {
        let model_dir = model_dir.as_ref();
        let init = |e: String| EngineError::Init(e);

        let accurate = FaceDetector::load(&model_dir.join(ACCURATE_DETECTOR_FILE))
            .map_err(|e| init(format!("accurate detector: {e}")))?;

        let fast_path = model_dir.join(FAST_DETECTOR_FILE);
        let fast = if fast_path.is_file() {
            Some(FaceDetector::load(&fast_path).map_err(|e| init(format!("fast detector: {e}")))?)
        } else {
            tracing::info!(
                path = %fast_path.display(),
                "fast detector not installed; using the accurate detector for every call"
            );
            None
        };

        let embedder = FaceEmbedder::load(&model_dir.join(EMBEDDER_FILE))
            .map_err(|e| init(format!("embedder: {e}")))?;

        tracing::info!(model_dir = %model_dir.display(), "ONNX engine ready");
        Ok(Self {
            accurate,
            fast,
            embedder,
            index: LinearIndex::new(),
        })
    }
}

impl FaceEngine for OnnxEngine {
    fn detect(&mut self, path: &Path, high_accuracy: bool) -> Result<Vec<DetectedFace>, EngineError> {
        let gray = image::open(path)
            .map_err(|e| EngineError::Detection(format!("{}: {e}", path.display())))?
            .to_luma8();
        let (width, height) = gray.dimensions();

        let detector = match (&mut self.fast, high_accuracy) {
            (Some(fast), false) => fast,
            _ => &mut self.accurate,
        };
        let detections = detector.detect(gray.as_raw(), width, height)?;

        let mut faces = Vec::with_capacity(detections.len());
        for det in &detections {
            let descriptor = self.embedder.embed(gray.as_raw(), width, height, det)?;
            faces.push(DetectedFace {
                descriptor,
                rectangle: det.rectangle,
            });
        }

        tracing::debug!(path = %path.display(), faces = faces.len(), high_accuracy, "detected");
        Ok(faces)
    }

    fn build_index(&mut self, rows: Vec<(RowId, Descriptor)>) {
        self.index = LinearIndex::build(rows);
    }

    fn match_within_tolerance(&self, probe: &Descriptor, tolerance: f32) -> Option<RowId> {
        self.index.nearest_within(probe, tolerance)
    }
}
