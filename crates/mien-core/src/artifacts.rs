//! One-time artifact loading.
//!
//! Everything the pipeline needs at serve time — both cascades, the
//! trained classifier, and the class dictionary — is loaded into a single
//! immutable bundle before the first request. Load failures are fatal
//! startup errors, never per-request conditions; after construction the
//! bundle is shared read-only (typically behind an `Arc`) so concurrent
//! requests need no locking.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cascade::{CascadeDetector, CascadeError};
use crate::classifier::{Classifier, ClassifierError, LinearClassifier};
use crate::features::FEATURE_LEN;
use crate::locator::FaceEyeLocator;
use crate::types::{LabelMap, LabelMapError};

pub const FACE_CASCADE_FILE: &str = "face_cascade.json";
pub const EYE_CASCADE_FILE: &str = "eye_cascade.json";
pub const CLASSIFIER_FILE: &str = "classifier.json";
pub const CLASS_DICTIONARY_FILE: &str = "class_dictionary.json";

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cascade {path}: {source}")]
    Cascade {
        path: PathBuf,
        #[source]
        source: CascadeError,
    },
    #[error("classifier {path}: {source}")]
    Classifier {
        path: PathBuf,
        #[source]
        source: ClassifierError,
    },
    #[error("class dictionary {path}: {source}")]
    Labels {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("class dictionary {path}: {source}")]
    LabelMap {
        path: PathBuf,
        #[source]
        source: LabelMapError,
    },
    #[error(
        "classifier expects {model_dim}-element features for {model_classes} classes; \
         pipeline produces {pipeline_dim} elements over {label_classes} labels"
    )]
    ContractMismatch {
        model_dim: usize,
        model_classes: usize,
        pipeline_dim: usize,
        label_classes: usize,
    },
}

/// The immutable set of trained artifacts the pipeline runs against.
pub struct ArtifactBundle {
    pub locator: FaceEyeLocator,
    pub classifier: Box<dyn Classifier>,
    pub labels: LabelMap,
}

impl ArtifactBundle {
    /// Load and cross-validate all artifacts from a directory.
    ///
    /// Checks the training/serving contract up front: the classifier's
    /// feature length must match what the pipeline assembles, and its
    /// class count must match the label dictionary. Catching this at
    /// startup beats silently misclassifying every request.
    pub fn load(dir: &Path) -> Result<Self, ArtifactError> {
        let face_cascade = load_cascade(&dir.join(FACE_CASCADE_FILE))?;
        let eye_cascade = load_cascade(&dir.join(EYE_CASCADE_FILE))?;

        let classifier_path = dir.join(CLASSIFIER_FILE);
        let bytes = read(&classifier_path)?;
        let classifier = LinearClassifier::from_json(&bytes)
            .map_err(|source| ArtifactError::Classifier { path: classifier_path, source })?;

        let labels = load_labels(&dir.join(CLASS_DICTIONARY_FILE))?;

        if classifier.feature_len() != FEATURE_LEN || classifier.num_classes() != labels.len() {
            return Err(ArtifactError::ContractMismatch {
                model_dim: classifier.feature_len(),
                model_classes: classifier.num_classes(),
                pipeline_dim: FEATURE_LEN,
                label_classes: labels.len(),
            });
        }

        tracing::info!(
            dir = %dir.display(),
            classes = labels.len(),
            feature_len = classifier.feature_len(),
            "artifacts loaded"
        );

        Ok(Self {
            locator: FaceEyeLocator::new(face_cascade, eye_cascade),
            classifier: Box::new(classifier),
            labels,
        })
    }

    /// Assemble a bundle from already-constructed parts. No contract
    /// check: callers own the consistency of what they pass in.
    pub fn from_parts(
        locator: FaceEyeLocator,
        classifier: Box<dyn Classifier>,
        labels: LabelMap,
    ) -> Self {
        Self { locator, classifier, labels }
    }
}

fn read(path: &Path) -> Result<Vec<u8>, ArtifactError> {
    std::fs::read(path).map_err(|source| ArtifactError::Io { path: path.to_path_buf(), source })
}

fn load_cascade(path: &Path) -> Result<CascadeDetector, ArtifactError> {
    let bytes = read(path)?;
    CascadeDetector::from_json(&bytes)
        .map_err(|source| ArtifactError::Cascade { path: path.to_path_buf(), source })
}

fn load_labels(path: &Path) -> Result<LabelMap, ArtifactError> {
    let bytes = read(path)?;
    let map: BTreeMap<String, usize> = serde_json::from_slice(&bytes)
        .map_err(|source| ArtifactError::Labels { path: path.to_path_buf(), source })?;
    LabelMap::from_map(map)
        .map_err(|source| ArtifactError::LabelMap { path: path.to_path_buf(), source })
}
