use std::collections::BTreeMap;

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Overlap test used for detection grouping: two rectangles belong to
    /// the same cluster when each is within `delta`-relative tolerance of
    /// the other's position and size.
    pub fn is_similar(&self, other: &Rect, eps: f32) -> bool {
        let delta = eps * 0.5 * (self.width.min(other.width) + self.height.min(other.height)) as f32;
        (self.x as f32 - other.x as f32).abs() <= delta
            && (self.y as f32 - other.y as f32).abs() <= delta
            && (self.width as f32 - other.width as f32).abs() <= delta
            && (self.height as f32 - other.height as f32).abs() <= delta
    }
}

/// A face region that passed the two-eye acceptance rule.
///
/// Produced by the locator, consumed immediately by the feature stages;
/// never persisted.
#[derive(Debug, Clone)]
pub struct FaceCandidate {
    pub rect: Rect,
    pub crop: RgbImage,
}

/// Immutable class-name ↔ class-index mapping, loaded once per process.
#[derive(Debug, Clone)]
pub struct LabelMap {
    name_to_index: BTreeMap<String, usize>,
    index_to_name: Vec<String>,
}

impl LabelMap {
    /// Build from a name→index document. Indices must form the dense
    /// range `0..n` with no duplicates.
    pub fn from_map(map: BTreeMap<String, usize>) -> Result<Self, LabelMapError> {
        let n = map.len();
        let mut index_to_name = vec![String::new(); n];
        for (name, &idx) in &map {
            if idx >= n {
                return Err(LabelMapError::IndexOutOfRange { name: name.clone(), index: idx, classes: n });
            }
            if !index_to_name[idx].is_empty() {
                return Err(LabelMapError::DuplicateIndex { index: idx });
            }
            index_to_name[idx] = name.clone();
        }
        Ok(Self { name_to_index: map, index_to_name })
    }

    pub fn len(&self) -> usize {
        self.index_to_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_to_name.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.index_to_name.get(index).map(String::as_str)
    }

    pub fn index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index_to_name.iter().map(String::as_str)
    }

    /// The name→index document echoed back in every successful outcome.
    pub fn dictionary(&self) -> &BTreeMap<String, usize> {
        &self.name_to_index
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LabelMapError {
    #[error("class \"{name}\" has index {index}, outside 0..{classes}")]
    IndexOutOfRange { name: String, index: usize, classes: usize },
    #[error("class index {index} appears more than once")]
    DuplicateIndex { index: usize },
}

/// One successful per-face classification.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub class: String,
    /// Per-class probabilities as percentages, rounded to 2 decimals,
    /// ordered by class index.
    pub class_probability: Vec<f64>,
    pub class_dictionary: BTreeMap<String, usize>,
}

/// One entry of a classification response: either a per-face result or a
/// descriptive error. Serializes untagged so the wire shape is exactly
/// `{class, class_probability, class_dictionary}` or `{error}`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Classified(Classification),
    Error { error: String },
}

impl Outcome {
    pub fn error(message: impl Into<String>) -> Self {
        Outcome::Error { error: message.into() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error { .. })
    }
}
