use facetag_core::RecognizerConfig;
use std::path::PathBuf;

/// Service configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Dataset appended to the gallery at startup, if the file exists.
    pub dataset_path: Option<PathBuf>,
    /// Pending requests accepted before callers wait.
    pub queue_depth: usize,
    pub recognizer: RecognizerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_dir: facetag_onnx::default_model_dir(),
            dataset_path: None,
            queue_depth: 4,
            recognizer: RecognizerConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `FACETAG_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_dir: std::env::var("FACETAG_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            dataset_path: std::env::var("FACETAG_DATASET_PATH").ok().map(PathBuf::from),
            queue_depth: env_usize("FACETAG_QUEUE_DEPTH", defaults.queue_depth).max(1),
            recognizer: RecognizerConfig::from_env(),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
