//! mien-core — Face identity classification engine.
//!
//! Decodes an image, finds faces that show two eyes, extracts a combined
//! raw + Haar-wavelet-detail feature vector, and scores it with a trained
//! multi-class linear model. All trained artifacts load once into an
//! [`ArtifactBundle`]; the [`Pipeline`] then serves requests against the
//! shared bundle without further I/O.

pub mod artifacts;
pub mod cascade;
pub mod classifier;
pub mod decoder;
pub mod features;
pub mod locator;
pub mod pipeline;
pub mod types;
pub mod wavelet;

pub use artifacts::{ArtifactBundle, ArtifactError};
pub use pipeline::Pipeline;
pub use types::{Classification, FaceCandidate, LabelMap, Outcome, Rect};
