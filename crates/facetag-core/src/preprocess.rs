//! Grayscale preprocessing through call-scoped temporary images.

use image::{DynamicImage, GrayImage};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const TEMP_IMAGE_EXTENSION: &str = ".png";
const MAX_HINT_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("image codec error on {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// A temporary image file, removed when dropped.
#[derive(Debug)]
pub struct TempImage {
    path: PathBuf,
}

impl TempImage {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to remove temp image");
            }
        }
    }
}

/// Image handed to the engine: either the caller's file or a grayscale copy.
#[derive(Debug)]
pub enum PreparedImage<'a> {
    Original(&'a Path),
    Grayscale(TempImage),
}

impl PreparedImage<'_> {
    pub fn path(&self) -> &Path {
        match self {
            PreparedImage::Original(path) => path,
            PreparedImage::Grayscale(temp) => temp.path(),
        }
    }
}

pub fn load_image(path: &Path) -> Result<DynamicImage, PreprocessError> {
    image::open(path).map_err(|source| PreprocessError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Save `img`; the format follows the file extension.
pub fn save_image(path: &Path, img: &DynamicImage) -> Result<(), PreprocessError> {
    img.save(path).map_err(|source| PreprocessError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Luminance conversion (Rec. 709 luma weights, 8-bit).
pub fn grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// `<dir>/<hint><32 hex chars of a random 128-bit value><suffix>`.
///
/// The hint is reduced to `[A-Za-z0-9_-]` so identities can be used directly.
pub fn temp_file_name(dir: &Path, hint: &str, suffix: &str) -> PathBuf {
    let hint: String = hint
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(MAX_HINT_LEN)
        .collect();
    let nonce: u128 = rand::random();
    dir.join(format!("{hint}{nonce:032x}{suffix}"))
}

/// Decode `source`, convert it to grayscale and write it to a fresh temp file.
///
/// The returned [`TempImage`] deletes the file when it goes out of scope.
pub fn normalize(source: &Path, hint: &str, temp_dir: &Path) -> Result<TempImage, PreprocessError> {
    let img = load_image(source)?;
    let gray = DynamicImage::ImageLuma8(grayscale(&img));

    let path = temp_file_name(temp_dir, hint, TEMP_IMAGE_EXTENSION);
    // Owned before the write so a partially written file is removed too.
    let temp = TempImage { path };
    save_image(temp.path(), &gray)?;

    tracing::debug!(source = %source.display(), temp = %temp.path().display(), "grayscale copy written");
    Ok(temp)
}
