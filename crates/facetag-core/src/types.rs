use serde::{Deserialize, Serialize};

/// Stable 0-based position of a [`Sample`] in the gallery.
pub type RowId = usize;

/// Axis-aligned face rectangle in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Detector score for this face, 0.0 when the engine does not report one.
    pub confidence: f32,
}

impl Rectangle {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence: 0.0,
        }
    }
}

/// Face descriptor produced by the embedding engine.
///
/// Dimensionality is fixed by the engine (512 for ArcFace). Serialized as a
/// bare number array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance between two descriptors.
    ///
    /// Only meaningful for descriptors of equal length; extra trailing
    /// dimensions are ignored.
    pub fn distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl From<Vec<f32>> for Descriptor {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// One enrolled gallery row.
///
/// Field names on disk follow the dataset file format: `{"Id": .., "Descriptor": [..]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(rename = "Id")]
    pub identity: String,
    #[serde(rename = "Descriptor")]
    pub descriptor: Descriptor,
}

/// A face reported by the engine for one image. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub descriptor: Descriptor,
    pub rectangle: Rectangle,
}

/// A detection resolved to a gallery row.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedFace {
    pub identity: String,
    /// Descriptor of the matched gallery row, not of the probe.
    pub descriptor: Descriptor,
    /// Rectangle of the source detection.
    pub rectangle: Rectangle,
    pub row: RowId,
}

impl ClassifiedFace {
    pub(crate) fn new(row: RowId, sample: &Sample, detection: &DetectedFace) -> Self {
        Self {
            identity: sample.identity.clone(),
            descriptor: sample.descriptor.clone(),
            rectangle: detection.rectangle,
            row,
        }
    }
}

/// Result of classifying an image expected to hold exactly one face.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub identity: String,
    pub faces: Vec<ClassifiedFace>,
}

/// Result of classifying every face on an image. Unmatched faces are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupClassification {
    pub identities: Vec<String>,
    pub faces: Vec<ClassifiedFace>,
}

impl GroupClassification {
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }
}
