//! facetag-service — Shared access to one recognizer.
//!
//! The recognizer (and the engine it owns) lives on a dedicated thread;
//! async callers talk to it through a cloneable [`RecognizerHandle`].

pub mod config;
pub mod worker;

pub use config::ServiceConfig;
pub use worker::{spawn_recognizer, RecognizerHandle, ServiceError};

use facetag_core::{DatasetError, RecognizeError, Recognizer};
use facetag_onnx::OnnxEngine;

/// Load the ONNX engine, seed the gallery from the configured dataset and
/// start the engine thread. Fails fast if the models cannot be loaded.
pub fn start(config: &ServiceConfig) -> Result<RecognizerHandle, ServiceError> {
    let engine = OnnxEngine::load(&config.model_dir)?;
    let mut recognizer = Recognizer::new(engine, config.recognizer.clone())?;

    if let Some(path) = &config.dataset_path {
        match recognizer.load_dataset(path) {
            Ok(appended) => tracing::info!(path = %path.display(), appended, "seeded gallery"),
            Err(RecognizeError::Dataset(DatasetError::NotFound(_))) => {
                tracing::info!(path = %path.display(), "no dataset yet; starting with an empty gallery");
            }
            Err(err) => return Err(err.into()),
        }
    }

    spawn_recognizer(recognizer, config.queue_depth)
}
