//! Enrollment and classification against a labeled gallery.
//!
//! Each call runs `preprocess -> detect -> match -> assemble` against the
//! current gallery. The gallery can only be mutated through the
//! [`Recognizer`], which republishes it to the engine's matching index on
//! every mutation, so classification never sees rows the index lacks.

use crate::config::{self, ConfigError, RecognizerConfig};
use crate::engine::{EngineError, FaceEngine, SingleFace};
use crate::gallery::{DatasetError, Gallery};
use crate::preprocess::{self, PreparedImage, PreprocessError};
use crate::types::{Classification, ClassifiedFace, GroupClassification, RowId};
use std::path::Path;
use thiserror::Error;

/// Temp-name hint for classification probes.
const CLASSIFY_HINT: &str = "probe";

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),
    #[error("preprocess error: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("no face on the image")]
    NoFace,
    #[error("not a single face on the image ({count} detected)")]
    AmbiguousFace { count: usize },
    #[error("can't classify: no gallery row within tolerance")]
    NoMatch,
}

/// Classifier owning one engine and one gallery.
///
/// The engine is released when the recognizer is dropped.
pub struct Recognizer<E: FaceEngine> {
    engine: E,
    config: RecognizerConfig,
    gallery: Gallery,
    /// Gallery length at the last index publication.
    indexed_rows: usize,
}

impl<E: FaceEngine> Recognizer<E> {
    /// Recognizer with an empty gallery.
    pub fn new(engine: E, config: RecognizerConfig) -> Result<Self, RecognizeError> {
        Self::with_gallery(engine, config, Gallery::new())
    }

    /// Recognizer starting from an already populated gallery.
    pub fn with_gallery(
        engine: E,
        config: RecognizerConfig,
        gallery: Gallery,
    ) -> Result<Self, RecognizeError> {
        config.validate()?;
        let mut recognizer = Self {
            engine,
            config,
            gallery,
            indexed_rows: 0,
        };
        recognizer.reindex();
        Ok(recognizer)
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn set_tolerance(&mut self, tolerance: f32) -> Result<(), RecognizeError> {
        config::validate_tolerance(tolerance)?;
        self.config.tolerance = tolerance;
        Ok(())
    }

    /// Release the gallery and hand the engine back to the caller.
    pub fn into_engine(self) -> E {
        self.engine
    }

    /// Enroll the single face on `path` under `identity`.
    ///
    /// Fails with [`RecognizeError::NoFace`] or [`RecognizeError::AmbiguousFace`]
    /// unless exactly one face is detected; the gallery is unchanged then.
    pub fn enroll(&mut self, path: impl AsRef<Path>, identity: &str) -> Result<RowId, RecognizeError> {
        let prepared = self.prepare(path.as_ref(), identity)?;
        let mut faces = self.engine.detect(prepared.path(), self.config.high_accuracy)?;

        let face = match faces.len() {
            0 => return Err(RecognizeError::NoFace),
            1 => faces.remove(0),
            count => return Err(RecognizeError::AmbiguousFace { count }),
        };

        let row = self.gallery.enroll(identity, face.descriptor)?;
        self.reindex();

        tracing::debug!(identity, row, "enrolled");
        Ok(row)
    }

    /// Classify the single face on `path`.
    pub fn classify(&mut self, path: impl AsRef<Path>) -> Result<Classification, RecognizeError> {
        self.ensure_indexed();
        let prepared = self.prepare(path.as_ref(), CLASSIFY_HINT)?;

        let face = match self
            .engine
            .detect_single(prepared.path(), self.config.high_accuracy)?
        {
            SingleFace::Found(face) => face,
            SingleFace::NotFound => return Err(RecognizeError::NoFace),
            SingleFace::Ambiguous(count) => return Err(RecognizeError::AmbiguousFace { count }),
        };

        let row = self
            .engine
            .match_within_tolerance(&face.descriptor, self.config.tolerance)
            .ok_or(RecognizeError::NoMatch)?;
        let sample = self.gallery.get(row).ok_or(RecognizeError::NoMatch)?;

        tracing::debug!(identity = %sample.identity, row, "classified");
        Ok(Classification {
            identity: sample.identity.clone(),
            faces: vec![ClassifiedFace::new(row, sample, &face)],
        })
    }

    /// Classify every face on `path`.
    ///
    /// Best effort: faces with no gallery row within tolerance are left out,
    /// and an image with no (matching) faces yields an empty result. Only
    /// preprocessing or engine failures are errors.
    pub fn classify_multiples(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<GroupClassification, RecognizeError> {
        self.ensure_indexed();
        let prepared = self.prepare(path.as_ref(), CLASSIFY_HINT)?;
        let faces = self.engine.detect(prepared.path(), self.config.high_accuracy)?;

        let mut result = GroupClassification::default();
        for face in &faces {
            let Some(row) = self
                .engine
                .match_within_tolerance(&face.descriptor, self.config.tolerance)
            else {
                continue;
            };
            let Some(sample) = self.gallery.get(row) else {
                continue;
            };
            result.identities.push(sample.identity.clone());
            result.faces.push(ClassifiedFace::new(row, sample, face));
        }

        tracing::debug!(detected = faces.len(), matched = result.len(), "classified group");
        Ok(result)
    }

    /// Persist the gallery to `path`.
    pub fn save_dataset(&self, path: impl AsRef<Path>) -> Result<(), RecognizeError> {
        Ok(self.gallery.save(path)?)
    }

    /// Append the records in `path` to the gallery and republish the index.
    ///
    /// Like [`Gallery::load`] this merges: loading a file twice doubles the
    /// gallery. Returns the number of records appended.
    pub fn load_dataset(&mut self, path: impl AsRef<Path>) -> Result<usize, RecognizeError> {
        let appended = self.gallery.load(path)?;
        self.reindex();
        Ok(appended)
    }

    fn prepare<'a>(&self, path: &'a Path, hint: &str) -> Result<PreparedImage<'a>, RecognizeError> {
        if self.config.use_grayscale {
            let temp = preprocess::normalize(path, hint, &self.config.temp_dir())?;
            Ok(PreparedImage::Grayscale(temp))
        } else {
            Ok(PreparedImage::Original(path))
        }
    }

    fn reindex(&mut self) {
        self.engine.build_index(self.gallery.index_rows());
        self.indexed_rows = self.gallery.len();
        tracing::debug!(rows = self.indexed_rows, "matching index rebuilt");
    }

    fn ensure_indexed(&mut self) {
        if self.indexed_rows != self.gallery.len() {
            self.reindex();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedEngine;
    use crate::types::{DetectedFace, Descriptor, Rectangle};
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
            }
        }

        /// Write a `w`x`h` PNG; the scripted engine keys faces by size.
        fn image(&self, name: &str, w: u32, h: u32) -> PathBuf {
            let path = self.dir.path().join(name);
            image::RgbImage::new(w, h).save(&path).unwrap();
            path
        }

        fn config(&self) -> RecognizerConfig {
            RecognizerConfig {
                temp_dir: Some(self.dir.path().join("tmp")),
                ..RecognizerConfig::default()
            }
        }

        fn temp_files(&self) -> usize {
            std::fs::read_dir(self.dir.path().join("tmp")).unwrap().count()
        }
    }

    fn face(values: &[f32], x: f32) -> DetectedFace {
        DetectedFace {
            descriptor: Descriptor::new(values.to_vec()),
            rectangle: Rectangle::new(x, 10.0, 40.0, 40.0),
        }
    }

    fn amy() -> DetectedFace {
        face(&[1.0, 0.0, 0.0], 5.0)
    }

    fn bob() -> DetectedFace {
        face(&[0.0, 1.0, 0.0], 60.0)
    }

    fn stranger() -> DetectedFace {
        face(&[0.0, 0.0, 1.0], 120.0)
    }

    /// Engine scripted with: 10x10 = Amy, 11x11 = Bob, 12x12 = stranger,
    /// 13x13 = Amy+Bob, 14x14 = nobody, 15x15 = Amy+stranger+Bob, 16x16 = engine failure.
    fn engine() -> ScriptedEngine {
        ScriptedEngine::new()
            .with_faces((10, 10), vec![amy()])
            .with_faces((11, 11), vec![bob()])
            .with_faces((12, 12), vec![stranger()])
            .with_faces((13, 13), vec![amy(), bob()])
            .with_faces((14, 14), vec![])
            .with_faces((15, 15), vec![amy(), stranger(), bob()])
            .failing_on((16, 16))
    }

    fn recognizer(fx: &Fixture) -> Recognizer<ScriptedEngine> {
        std::fs::create_dir_all(fx.dir.path().join("tmp")).unwrap();
        Recognizer::new(engine(), fx.config()).unwrap()
    }

    #[test]
    fn test_enroll_grows_gallery() {
        let fx = Fixture::new();
        let mut rec = recognizer(&fx);

        let row = rec.enroll(fx.image("amy.png", 10, 10), "Amy").unwrap();
        assert_eq!(row, 0);
        assert_eq!(rec.gallery().len(), 1);
        assert_eq!(rec.gallery().get(0).unwrap().identity, "Amy");
        assert_eq!(rec.gallery().get(0).unwrap().descriptor, amy().descriptor);

        let row = rec.enroll(fx.image("amy2.png", 10, 10), "Amy").unwrap();
        assert_eq!(row, 1);
        assert_eq!(rec.gallery().len(), 2);
    }

    #[test]
    fn test_enroll_rejects_multiple_faces() {
        let fx = Fixture::new();
        let mut rec = recognizer(&fx);
        rec.enroll(fx.image("amy.png", 10, 10), "Amy").unwrap();

        let err = rec.enroll(fx.image("pair.png", 13, 13), "Pair").unwrap_err();
        assert!(matches!(err, RecognizeError::AmbiguousFace { count: 2 }));
        assert_eq!(rec.gallery().len(), 1);
    }

    #[test]
    fn test_enroll_rejects_no_face() {
        let fx = Fixture::new();
        let mut rec = recognizer(&fx);
        let err = rec.enroll(fx.image("empty.png", 14, 14), "Nobody").unwrap_err();
        assert!(matches!(err, RecognizeError::NoFace));
        assert!(rec.gallery().is_empty());
    }

    #[test]
    fn test_enroll_reindexes() {
        let fx = Fixture::new();
        let mut rec = recognizer(&fx);
        let builds = rec.engine().index_builds();

        rec.enroll(fx.image("amy.png", 10, 10), "Amy").unwrap();
        assert_eq!(rec.engine().index_builds(), builds + 1);
        assert_eq!(rec.engine().indexed_rows(), 1);
    }

    #[test]
    fn test_classify_known_and_stranger() {
        let fx = Fixture::new();
        let mut rec = recognizer(&fx);
        rec.enroll(fx.image("amy.png", 10, 10), "Amy").unwrap();

        let result = rec.classify(fx.image("amy_probe.png", 10, 10)).unwrap();
        assert_eq!(result.identity, "Amy");
        assert_eq!(result.faces.len(), 1);
        assert_eq!(result.faces[0].identity, "Amy");
        assert_eq!(result.faces[0].rectangle, amy().rectangle);
        assert_eq!(result.faces[0].descriptor, amy().descriptor);
        assert_eq!(result.faces[0].row, 0);

        let err = rec.classify(fx.image("stranger.png", 12, 12)).unwrap_err();
        assert!(matches!(err, RecognizeError::NoMatch));
    }

    #[test]
    fn test_classify_face_count_errors() {
        let fx = Fixture::new();
        let mut rec = recognizer(&fx);
        rec.enroll(fx.image("amy.png", 10, 10), "Amy").unwrap();

        let err = rec.classify(fx.image("empty.png", 14, 14)).unwrap_err();
        assert!(matches!(err, RecognizeError::NoFace));

        let err = rec.classify(fx.image("pair.png", 13, 13)).unwrap_err();
        assert!(matches!(err, RecognizeError::AmbiguousFace { count: 2 }));
    }

    #[test]
    fn test_classify_engine_failure_propagates() {
        let fx = Fixture::new();
        let mut rec = recognizer(&fx);
        let err = rec.classify(fx.image("broken.png", 16, 16)).unwrap_err();
        assert!(matches!(err, RecognizeError::Engine(EngineError::Detection(_))));
    }

    #[test]
    fn test_classify_against_empty_gallery() {
        let fx = Fixture::new();
        let mut rec = recognizer(&fx);
        let err = rec.classify(fx.image("amy.png", 10, 10)).unwrap_err();
        assert!(matches!(err, RecognizeError::NoMatch));
    }

    #[test]
    fn test_classify_multiples_best_effort() {
        let fx = Fixture::new();
        let mut rec = recognizer(&fx);
        rec.enroll(fx.image("amy.png", 10, 10), "Amy").unwrap();
        rec.enroll(fx.image("bob.png", 11, 11), "Bob").unwrap();

        // Three faces, two known.
        let result = rec.classify_multiples(fx.image("crowd.png", 15, 15)).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.identities, vec!["Amy".to_string(), "Bob".to_string()]);
        assert_eq!(result.faces[0].rectangle, amy().rectangle);
        assert_eq!(result.faces[1].rectangle, bob().rectangle);
        assert_eq!(result.faces[1].row, 1);
    }

    #[test]
    fn test_classify_multiples_empty_results() {
        let fx = Fixture::new();
        let mut rec = recognizer(&fx);
        rec.enroll(fx.image("amy.png", 10, 10), "Amy").unwrap();

        let none_detected = rec.classify_multiples(fx.image("empty.png", 14, 14)).unwrap();
        assert!(none_detected.is_empty());
        assert!(none_detected.identities.is_empty());

        let none_matched = rec.classify_multiples(fx.image("stranger.png", 12, 12)).unwrap();
        assert!(none_matched.is_empty());
    }

    #[test]
    fn test_classify_multiples_engine_failure_propagates() {
        let fx = Fixture::new();
        let mut rec = recognizer(&fx);
        let err = rec.classify_multiples(fx.image("broken.png", 16, 16)).unwrap_err();
        assert!(matches!(err, RecognizeError::Engine(_)));
    }

    #[test]
    fn test_tolerance_monotonicity() {
        let fx = Fixture::new();
        let mut rec = recognizer(&fx);
        rec.enroll(fx.image("amy.png", 10, 10), "Amy").unwrap();
        let stranger = fx.image("stranger.png", 12, 12);

        // Amy and the stranger are sqrt(2) apart.
        let mut matched_before = false;
        for tolerance in [0.1, 0.4, 1.0, 1.4, 1.5, 2.0, 3.0] {
            rec.set_tolerance(tolerance).unwrap();
            let matched = rec.classify(&stranger).is_ok();
            assert!(!matched_before || matched, "lost match at tolerance {tolerance}");
            matched_before = matched;
        }
        assert!(matched_before);
    }

    #[test]
    fn test_set_tolerance_validates() {
        let fx = Fixture::new();
        let mut rec = recognizer(&fx);
        assert!(matches!(
            rec.set_tolerance(0.0).unwrap_err(),
            RecognizeError::Config(ConfigError::InvalidTolerance(_))
        ));
        assert_eq!(rec.config().tolerance, 0.4);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = RecognizerConfig {
            tolerance: -0.4,
            ..RecognizerConfig::default()
        };
        assert!(Recognizer::new(engine(), config).is_err());
    }

    #[test]
    fn test_grayscale_temp_files_removed_on_every_path() {
        let fx = Fixture::new();
        let mut rec = recognizer(&fx);
        rec.enroll(fx.image("amy.png", 10, 10), "Amy").unwrap();
        let _ = rec.enroll(fx.image("pair.png", 13, 13), "Pair");
        let _ = rec.classify(fx.image("amy_probe.png", 10, 10));
        let _ = rec.classify(fx.image("stranger.png", 12, 12));
        let _ = rec.classify(fx.image("empty.png", 14, 14));
        let _ = rec.classify(fx.image("broken.png", 16, 16));
        let _ = rec.classify_multiples(fx.image("crowd.png", 15, 15));
        let _ = rec.classify_multiples(fx.image("broken2.png", 16, 16));

        // The engine saw grayscale copies inside the temp dir, all gone now.
        let seen = rec.engine().seen_paths();
        assert_eq!(seen.len(), 8);
        for path in seen {
            assert!(path.starts_with(fx.dir.path().join("tmp")));
            assert!(!path.exists(), "{} leaked", path.display());
        }
        assert_eq!(fx.temp_files(), 0);
    }

    #[test]
    fn test_without_grayscale_engine_reads_original() {
        let fx = Fixture::new();
        let config = RecognizerConfig {
            use_grayscale: false,
            ..fx.config()
        };
        let mut rec = Recognizer::new(engine(), config).unwrap();
        let path = fx.image("amy.png", 10, 10);
        rec.enroll(&path, "Amy").unwrap();
        assert_eq!(rec.engine().seen_paths(), &[path]);
    }

    #[test]
    fn test_high_accuracy_flag_forwarded() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.dir.path().join("tmp")).unwrap();
        let config = RecognizerConfig {
            high_accuracy: true,
            ..fx.config()
        };
        let mut rec = Recognizer::new(engine(), config).unwrap();
        rec.enroll(fx.image("amy.png", 10, 10), "Amy").unwrap();
        assert_eq!(rec.engine().high_accuracy_calls(), 1);
    }

    #[test]
    fn test_dataset_roundtrip_and_additive_load() {
        let fx = Fixture::new();
        let dataset = fx.dir.path().join("dataset.json");

        let mut rec = recognizer(&fx);
        rec.enroll(fx.image("amy.png", 10, 10), "Amy").unwrap();
        rec.enroll(fx.image("bob.png", 11, 11), "Bob").unwrap();
        rec.save_dataset(&dataset).unwrap();

        let mut fresh = recognizer(&fx);
        assert_eq!(fresh.load_dataset(&dataset).unwrap(), 2);
        assert_eq!(fresh.gallery().all(), rec.gallery().all());
        assert_eq!(fresh.engine().indexed_rows(), 2);

        let result = fresh.classify(fx.image("bob_probe.png", 11, 11)).unwrap();
        assert_eq!(result.identity, "Bob");

        fresh.load_dataset(&dataset).unwrap();
        assert_eq!(fresh.gallery().len(), 4);
        assert_eq!(fresh.engine().indexed_rows(), 4);
    }

    #[test]
    fn test_failed_load_keeps_gallery_and_index() {
        let fx = Fixture::new();
        let mut rec = recognizer(&fx);
        rec.enroll(fx.image("amy.png", 10, 10), "Amy").unwrap();

        let err = rec.load_dataset(fx.dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, RecognizeError::Dataset(DatasetError::NotFound(_))));
        assert_eq!(rec.gallery().len(), 1);
        assert_eq!(rec.engine().indexed_rows(), 1);
    }

    #[test]
    fn test_with_gallery_indexes_on_construction() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.dir.path().join("tmp")).unwrap();
        let mut gallery = Gallery::new();
        gallery.enroll("Amy", amy().descriptor).unwrap();

        let mut rec = Recognizer::with_gallery(engine(), fx.config(), gallery).unwrap();
        assert_eq!(rec.engine().indexed_rows(), 1);
        let result = rec.classify(fx.image("amy.png", 10, 10)).unwrap();
        assert_eq!(result.identity, "Amy");
    }
}
