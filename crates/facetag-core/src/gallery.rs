//! Descriptor store and its JSON persistence.
//!
//! The gallery is an append-only, ordered list of [`Sample`]s. A sample's
//! position is its [`RowId`], the key the matching index reports back.

use crate::types::{Descriptor, RowId, Sample};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("dataset file not found: {0}")]
    NotFound(PathBuf),
    #[error("dataset io on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed dataset: {0}")]
    Format(#[from] serde_json::Error),
    #[error("descriptor dimension mismatch at record {record}: expected {expected}, got {actual}")]
    DimensionMismatch {
        record: usize,
        expected: usize,
        actual: usize,
    },
}

/// Ordered collection of enrolled samples.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    samples: Vec<Sample>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh gallery holding exactly the records of `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let mut gallery = Self::new();
        gallery.load(path)?;
        Ok(gallery)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Descriptor length shared by every row, `None` while empty.
    pub fn dimension(&self) -> Option<usize> {
        self.samples.first().map(|s| s.descriptor.len())
    }

    pub fn get(&self, row: RowId) -> Option<&Sample> {
        self.samples.get(row)
    }

    /// All samples in enrollment order.
    pub fn all(&self) -> &[Sample] {
        &self.samples
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Rows in the shape the matching index consumes.
    pub fn index_rows(&self) -> Vec<(RowId, Descriptor)> {
        self.samples
            .iter()
            .enumerate()
            .map(|(row, s)| (row, s.descriptor.clone()))
            .collect()
    }

    /// Append one sample, returning its row id.
    pub fn enroll(
        &mut self,
        identity: impl Into<String>,
        descriptor: Descriptor,
    ) -> Result<RowId, DatasetError> {
        let row = self.samples.len();
        if let Some(expected) = self.dimension() {
            if descriptor.len() != expected {
                return Err(DatasetError::DimensionMismatch {
                    record: row,
                    expected,
                    actual: descriptor.len(),
                });
            }
        }
        self.samples.push(Sample {
            identity: identity.into(),
            descriptor,
        });
        Ok(row)
    }

    /// Write every sample to `path` as a JSON array of `{"Id", "Descriptor"}` records.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DatasetError> {
        let path = path.as_ref();
        let io_err = |source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = fs::File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &self.samples)?;
        writer.write_all(b"\n").map_err(io_err)?;
        writer.flush().map_err(io_err)?;

        tracing::info!(path = %path.display(), samples = self.samples.len(), "dataset saved");
        Ok(())
    }

    /// Read the records in `path` and **append** them to this gallery.
    ///
    /// This merges, it does not replace: rows already present stay, and
    /// loading the same file twice doubles the gallery. Start from
    /// [`Gallery::new`] (or use [`Gallery::from_file`]) for a clean load.
    ///
    /// The file is parsed and validated in full before anything is appended,
    /// so a failed load leaves the gallery untouched. Returns the number of
    /// records appended.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<usize, DatasetError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DatasetError::NotFound(path.to_path_buf()));
        }

        let raw = fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let records: Vec<Sample> = serde_json::from_str(&raw)?;

        let expected = self
            .dimension()
            .or_else(|| records.first().map(|s| s.descriptor.len()));
        if let Some(expected) = expected {
            if let Some((i, bad)) = records
                .iter()
                .enumerate()
                .find(|(_, s)| s.descriptor.len() != expected)
            {
                return Err(DatasetError::DimensionMismatch {
                    record: i,
                    expected,
                    actual: bad.descriptor.len(),
                });
            }
        }

        let appended = records.len();
        self.samples.extend(records);

        tracing::info!(
            path = %path.display(),
            appended,
            total = self.samples.len(),
            "dataset loaded"
        );
        Ok(appended)
    }
}
