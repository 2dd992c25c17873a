use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default maximum descriptor distance accepted as a match.
pub const DEFAULT_TOLERANCE: f32 = 0.4;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("tolerance must be a positive finite number, got {0}")]
    InvalidTolerance(f32),
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Recognizer settings, fixed before the first call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Maximum engine distance for a match. Smaller is stricter.
    pub tolerance: f32,
    /// Convert images to grayscale before detection.
    pub use_grayscale: bool,
    /// Ask the engine for its slower, more accurate detector.
    pub high_accuracy: bool,
    /// Where grayscale copies are written (default: the OS temp dir).
    pub temp_dir: Option<PathBuf>,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            use_grayscale: true,
            high_accuracy: false,
            temp_dir: None,
        }
    }
}

impl RecognizerConfig {
    /// Load configuration from `FACETAG_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tolerance: env_f32("FACETAG_TOLERANCE", defaults.tolerance),
            use_grayscale: env_bool("FACETAG_USE_GRAYSCALE", defaults.use_grayscale),
            high_accuracy: env_bool("FACETAG_HIGH_ACCURACY", defaults.high_accuracy),
            temp_dir: std::env::var("FACETAG_TEMP_DIR").ok().map(PathBuf::from),
        }
    }

    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&src)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_tolerance(self.tolerance)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

pub(crate) fn validate_tolerance(tolerance: f32) -> Result<(), ConfigError> {
    if tolerance.is_finite() && tolerance > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidTolerance(tolerance))
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
        .unwrap_or(default)
}
