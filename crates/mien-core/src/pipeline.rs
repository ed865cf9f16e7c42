//! End-to-end classification pipeline.
//!
//! Decode → locate faces → wavelet detail → feature assembly → classify.
//! Every entry point returns an ordered list of per-face outcomes; input
//! problems become a single error outcome rather than a caller-visible
//! failure, and a failure on one face never aborts its siblings.

use std::path::Path;
use std::sync::Arc;

use image::RgbImage;

use crate::artifacts::ArtifactBundle;
use crate::decoder;
use crate::features::assemble_features;
use crate::types::{Classification, FaceCandidate, Outcome};
use crate::wavelet::{self, WaveletFamily};

const NO_FACE_MESSAGE: &str = "no face with two clearly visible eyes detected";

/// Stateless request-level orchestrator over a shared artifact bundle.
///
/// Cheap to clone; all heavy state lives in the bundle.
#[derive(Clone)]
pub struct Pipeline {
    artifacts: Arc<ArtifactBundle>,
}

impl Pipeline {
    pub fn new(artifacts: Arc<ArtifactBundle>) -> Self {
        Self { artifacts }
    }

    pub fn labels(&self) -> &crate::types::LabelMap {
        &self.artifacts.labels
    }

    /// Classify a base64-encoded image (data-URI header tolerated).
    pub fn classify_base64(&self, data: &str) -> Vec<Outcome> {
        match decoder::decode_base64_image(data) {
            Ok(image) => self.classify_image(&image),
            Err(err) => {
                tracing::debug!(%err, "rejecting undecodable payload");
                vec![Outcome::error(format!("cannot decode image: {err}"))]
            }
        }
    }

    /// Classify an image file on disk.
    pub fn classify_path(&self, path: &Path) -> Vec<Outcome> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                return vec![Outcome::error(format!(
                    "cannot read {}: {err}",
                    path.display()
                ))]
            }
        };
        match decoder::decode_image_bytes(&bytes) {
            Ok(image) => self.classify_image(&image),
            Err(err) => vec![Outcome::error(format!("cannot decode image: {err}"))],
        }
    }

    /// Classify an already-decoded image.
    pub fn classify_image(&self, image: &RgbImage) -> Vec<Outcome> {
        let candidates = self.artifacts.locator.locate(image);
        if candidates.is_empty() {
            return vec![Outcome::error(NO_FACE_MESSAGE)];
        }

        candidates
            .iter()
            .map(|candidate| self.classify_candidate(candidate))
            .collect()
    }

    fn classify_candidate(&self, candidate: &FaceCandidate) -> Outcome {
        let detail =
            wavelet::wavelet_detail(&candidate.crop, WaveletFamily::Haar, wavelet::DEFAULT_LEVEL);
        let features = assemble_features(&candidate.crop, &detail);

        let prediction = match self.artifacts.classifier.predict(&features) {
            Ok(prediction) => prediction,
            Err(err) => {
                tracing::warn!(rect = ?candidate.rect, %err, "classification failed for one face");
                return Outcome::error(format!("classification failed: {err}"));
            }
        };

        let class = match self.artifacts.labels.name(prediction.class_index) {
            Some(name) => name.to_string(),
            None => {
                // Guarded at load time; can only happen with a hand-built bundle.
                return Outcome::error(format!(
                    "predicted class index {} has no label",
                    prediction.class_index
                ));
            }
        };

        tracing::debug!(rect = ?candidate.rect, %class, "face classified");

        Outcome::Classified(Classification {
            class,
            class_probability: prediction.probabilities.iter().copied().map(to_percent).collect(),
            class_dictionary: self.artifacts.labels.dictionary().clone(),
        })
    }
}

/// Probability → percentage, rounded to two decimals.
fn to_percent(p: f32) -> f64 {
    (p as f64 * 100.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::testutil::{
        blind_eye_cascade, scene, scene_eye_cascade, scene_face_cascade,
    };
    use crate::classifier::{Classifier, ClassifierError, LinearClassifier, Prediction};
    use crate::features::{FEATURE_LEN, RAW_BRANCH_LEN};
    use crate::locator::FaceEyeLocator;
    use crate::types::LabelMap;
    use base64::Engine as _;
    use image::Rgb;
    use std::collections::BTreeMap;
    use std::io::Cursor;

    const WHITE_FACE: Rgb<u8> = Rgb([210u8, 210, 210]);
    const TEAL_FACE: Rgb<u8> = Rgb([40u8, 210, 210]);

    fn labels() -> LabelMap {
        let map: BTreeMap<String, usize> =
            [("ada".to_string(), 0), ("grace".to_string(), 1)].into();
        LabelMap::from_map(map).unwrap()
    }

    /// Two-class model keyed on the mean red channel of the raw branch:
    /// bright-red crops (the white face) go to "ada", red-poor crops (the
    /// teal face) to "grace". The boundary sits at mean red ≈ 125.
    fn red_mean_classifier() -> LinearClassifier {
        let mut w0 = vec![0.0f32; FEATURE_LEN];
        for i in (0..RAW_BRANCH_LEN).step_by(3) {
            w0[i] = 0.001;
        }
        let w1 = vec![0.0f32; FEATURE_LEN];
        let json = serde_json::json!({
            "weights": [w0, w1],
            "bias": [-128.0, 0.0],
        })
        .to_string();
        LinearClassifier::from_json(json.as_bytes()).unwrap()
    }

    fn pipeline() -> Pipeline {
        let bundle = ArtifactBundle::from_parts(
            FaceEyeLocator::new(scene_face_cascade(), scene_eye_cascade()),
            Box::new(red_mean_classifier()),
            labels(),
        );
        Pipeline::new(Arc::new(bundle))
    }

    fn png_base64(image: &RgbImage) -> String {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        base64::engine::general_purpose::STANDARD.encode(&bytes)
    }

    fn classified(outcome: &Outcome) -> &Classification {
        match outcome {
            Outcome::Classified(c) => c,
            Outcome::Error { error } => panic!("expected classification, got error: {error}"),
        }
    }

    #[test]
    fn test_single_face_classified() {
        let img = scene(60, 60, &[(4, 4, WHITE_FACE)]);
        let outcomes = pipeline().classify_image(&img);
        assert_eq!(outcomes.len(), 1);

        let c = classified(&outcomes[0]);
        assert_eq!(c.class, "ada");
        assert_eq!(c.class_probability.len(), 2);
        let total: f64 = c.class_probability.iter().sum();
        assert!((total - 100.0).abs() < 0.05, "percentages sum to {total}");
        assert!(c.class_probability[0] > 99.0);
        assert_eq!(c.class_dictionary["ada"], 0);
        assert_eq!(c.class_dictionary["grace"], 1);
    }

    #[test]
    fn test_two_faces_classified_independently() {
        let img = scene(120, 120, &[(4, 4, WHITE_FACE), (64, 64, TEAL_FACE)]);
        let outcomes = pipeline().classify_image(&img);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(classified(&outcomes[0]).class, "ada");
        assert_eq!(classified(&outcomes[1]).class, "grace");
    }

    #[test]
    fn test_no_face_yields_single_error() {
        let img = scene(60, 60, &[]);
        let outcomes = pipeline().classify_image(&img);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_error());
    }

    #[test]
    fn test_face_without_eyes_yields_single_error() {
        let bundle = ArtifactBundle::from_parts(
            FaceEyeLocator::new(scene_face_cascade(), blind_eye_cascade()),
            Box::new(red_mean_classifier()),
            labels(),
        );
        let img = scene(60, 60, &[(4, 4, WHITE_FACE)]);
        let outcomes = Pipeline::new(Arc::new(bundle)).classify_image(&img);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_error());
    }

    #[test]
    fn test_base64_round_trip() {
        let img = scene(60, 60, &[(4, 4, WHITE_FACE)]);
        let encoded = format!("data:image/png;base64,{}", png_base64(&img));
        let outcomes = pipeline().classify_base64(&encoded);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(classified(&outcomes[0]).class, "ada");
    }

    #[test]
    fn test_malformed_base64_yields_single_error() {
        let outcomes = pipeline().classify_base64("data:image/png;base64,@@not-base64@@");
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_error());
    }

    #[test]
    fn test_classify_path() {
        let img = scene(60, 60, &[(4, 4, WHITE_FACE)]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.png");
        img.save(&path).unwrap();

        let outcomes = pipeline().classify_path(&path);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(classified(&outcomes[0]).class, "ada");
    }

    #[test]
    fn test_classify_missing_path_yields_error() {
        let dir = tempfile::tempdir().unwrap();
        let outcomes = pipeline().classify_path(&dir.path().join("absent.png"));
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_error());
    }

    /// Classifier that fails on red-poor crops, succeeds otherwise. Used to
    /// verify per-face error isolation.
    struct FailsOnDarkRed;

    impl Classifier for FailsOnDarkRed {
        fn num_classes(&self) -> usize {
            2
        }

        fn feature_len(&self) -> usize {
            FEATURE_LEN
        }

        fn predict(&self, features: &[f32]) -> Result<Prediction, ClassifierError> {
            let red: f32 = features[..RAW_BRANCH_LEN].iter().step_by(3).sum();
            if red / (RAW_BRANCH_LEN as f32 / 3.0) < 125.0 {
                return Err(ClassifierError::InvalidModel("numeric failure".into()));
            }
            Ok(Prediction { class_index: 0, probabilities: vec![1.0, 0.0] })
        }
    }

    #[test]
    fn test_one_failing_face_does_not_abort_siblings() {
        let bundle = ArtifactBundle::from_parts(
            FaceEyeLocator::new(scene_face_cascade(), scene_eye_cascade()),
            Box::new(FailsOnDarkRed),
            labels(),
        );
        let img = scene(120, 120, &[(4, 4, WHITE_FACE), (64, 64, TEAL_FACE)]);
        let outcomes = Pipeline::new(Arc::new(bundle)).classify_image(&img);

        assert_eq!(outcomes.len(), 2);
        assert_eq!(classified(&outcomes[0]).class, "ada");
        assert!(outcomes[1].is_error(), "teal face must fail without dropping the white one");
    }

    #[test]
    fn test_percent_rounding() {
        assert_eq!(to_percent(0.97531), 97.53);
        assert_eq!(to_percent(0.024685), 2.47);
        assert_eq!(to_percent(1.0), 100.0);
        assert_eq!(to_percent(0.0), 0.0);
    }
}
