//! Classifier contract and the serialized linear model.
//!
//! The pipeline treats the classifier as an opaque predictor: fixed-length
//! features in, class index plus a probability distribution out. The
//! provided implementation is a multinomial linear model (optional
//! per-feature standardization, weight matrix, bias, softmax) loaded from
//! a JSON artifact produced at training time.

use ndarray::{Array1, Array2};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("feature vector has {actual} elements, model expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("classifier model parse failure: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid classifier model: {0}")]
    InvalidModel(String),
}

/// Predicted class plus the full distribution (sums to 1, class-index order).
#[derive(Debug, Clone)]
pub struct Prediction {
    pub class_index: usize,
    pub probabilities: Vec<f32>,
}

/// An opaque multi-class predictor over fixed-length feature vectors.
pub trait Classifier: Send + Sync {
    fn num_classes(&self) -> usize;
    fn feature_len(&self) -> usize;
    fn predict(&self, features: &[f32]) -> Result<Prediction, ClassifierError>;
}

/// On-disk shape of the linear model artifact.
#[derive(Deserialize)]
struct LinearModelFile {
    /// classes × feature_len.
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
    /// Optional training-time standardization.
    #[serde(default)]
    mean: Option<Vec<f32>>,
    #[serde(default)]
    std: Option<Vec<f32>>,
}

/// Multinomial linear classifier: `softmax(W · standardize(x) + b)`.
pub struct LinearClassifier {
    weights: Array2<f32>,
    bias: Array1<f32>,
    mean: Option<Array1<f32>>,
    std: Option<Array1<f32>>,
}

impl LinearClassifier {
    pub fn from_json(bytes: &[u8]) -> Result<Self, ClassifierError> {
        let file: LinearModelFile = serde_json::from_slice(bytes)?;

        let classes = file.weights.len();
        if classes < 2 {
            return Err(ClassifierError::InvalidModel(format!(
                "need at least 2 classes, got {classes}"
            )));
        }
        let dim = file.weights[0].len();
        if dim == 0 {
            return Err(ClassifierError::InvalidModel("empty weight rows".into()));
        }
        if file.weights.iter().any(|row| row.len() != dim) {
            return Err(ClassifierError::InvalidModel("ragged weight matrix".into()));
        }
        if file.bias.len() != classes {
            return Err(ClassifierError::InvalidModel(format!(
                "bias has {} entries for {classes} classes",
                file.bias.len()
            )));
        }

        let mean = file
            .mean
            .map(|m| check_len(m, dim, "mean").map(Array1::from))
            .transpose()?;
        let std = file
            .std
            .map(|s| {
                let s = check_len(s, dim, "std")?;
                if s.iter().any(|&v| v <= 0.0 || !v.is_finite()) {
                    return Err(ClassifierError::InvalidModel(
                        "std entries must be finite and positive".into(),
                    ));
                }
                Ok(Array1::from(s))
            })
            .transpose()?;

        let flat: Vec<f32> = file.weights.into_iter().flatten().collect();
        let weights = Array2::from_shape_vec((classes, dim), flat)
            .map_err(|e| ClassifierError::InvalidModel(e.to_string()))?;

        Ok(Self { weights, bias: Array1::from(file.bias), mean, std })
    }
}

impl Classifier for LinearClassifier {
    fn num_classes(&self) -> usize {
        self.weights.nrows()
    }

    fn feature_len(&self) -> usize {
        self.weights.ncols()
    }

    fn predict(&self, features: &[f32]) -> Result<Prediction, ClassifierError> {
        let expected = self.feature_len();
        if features.len() != expected {
            return Err(ClassifierError::DimensionMismatch { expected, actual: features.len() });
        }

        let mut x = Array1::from(features.to_vec());
        if let Some(mean) = &self.mean {
            x -= mean;
        }
        if let Some(std) = &self.std {
            x /= std;
        }

        let logits = self.weights.dot(&x) + &self.bias;
        let probabilities = softmax(logits.as_slice().unwrap_or(&[]));

        let class_index = probabilities
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);

        Ok(Prediction { class_index, probabilities })
    }
}

/// Numerically stable softmax (max-subtracted).
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    if total > 0.0 {
        exps.iter().map(|&e| e / total).collect()
    } else {
        vec![1.0 / logits.len().max(1) as f32; logits.len()]
    }
}

fn check_len(v: Vec<f32>, dim: usize, what: &str) -> Result<Vec<f32>, ClassifierError> {
    if v.len() != dim {
        return Err(ClassifierError::InvalidModel(format!(
            "{what} has {} entries, expected {dim}",
            v.len()
        )));
    }
    Ok(v)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn model(weights: Vec<Vec<f32>>, bias: Vec<f32>) -> LinearClassifier {
        let json = serde_json::json!({ "weights": weights, "bias": bias }).to_string();
        LinearClassifier::from_json(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(&[0.5, -2.0, 3.0]);
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(p.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn test_softmax_stable_for_large_logits() {
        let p = softmax(&[1000.0, 999.0]);
        assert!(p.iter().all(|v| v.is_finite()));
        assert!(p[0] > p[1]);
    }

    #[test]
    fn test_predict_picks_dominant_class() {
        let clf = model(vec![vec![1.0, 0.0], vec![0.0, 1.0]], vec![0.0, 0.0]);
        let p = clf.predict(&[5.0, 0.0]).unwrap();
        assert_eq!(p.class_index, 0);
        assert!(p.probabilities[0] > 0.9);
        assert!((p.probabilities.iter().sum::<f32>() - 1.0).abs() < 1e-5);

        let p = clf.predict(&[0.0, 5.0]).unwrap();
        assert_eq!(p.class_index, 1);
    }

    #[test]
    fn test_bias_shifts_decision() {
        let clf = model(vec![vec![0.0, 0.0], vec![0.0, 0.0]], vec![2.0, -2.0]);
        let p = clf.predict(&[1.0, 1.0]).unwrap();
        assert_eq!(p.class_index, 0);
    }

    #[test]
    fn test_standardization_applied() {
        let json = serde_json::json!({
            "weights": [[1.0], [-1.0]],
            "bias": [0.0, 0.0],
            "mean": [100.0],
            "std": [50.0],
        })
        .to_string();
        let clf = LinearClassifier::from_json(json.as_bytes()).unwrap();
        // 150 standardizes to +1 → class 0; 50 standardizes to -1 → class 1.
        assert_eq!(clf.predict(&[150.0]).unwrap().class_index, 0);
        assert_eq!(clf.predict(&[50.0]).unwrap().class_index, 1);
    }

    #[test]
    fn test_dimension_mismatch() {
        let clf = model(vec![vec![1.0, 0.0], vec![0.0, 1.0]], vec![0.0, 0.0]);
        assert!(matches!(
            clf.predict(&[1.0]),
            Err(ClassifierError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_rejects_ragged_weights() {
        let json = serde_json::json!({
            "weights": [[1.0, 2.0], [3.0]],
            "bias": [0.0, 0.0],
        })
        .to_string();
        assert!(matches!(
            LinearClassifier::from_json(json.as_bytes()),
            Err(ClassifierError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_rejects_single_class() {
        let json = serde_json::json!({ "weights": [[1.0]], "bias": [0.0] }).to_string();
        assert!(LinearClassifier::from_json(json.as_bytes()).is_err());
    }

    #[test]
    fn test_rejects_nonpositive_std() {
        let json = serde_json::json!({
            "weights": [[1.0], [2.0]],
            "bias": [0.0, 0.0],
            "std": [0.0],
        })
        .to_string();
        assert!(LinearClassifier::from_json(json.as_bytes()).is_err());
    }
}
