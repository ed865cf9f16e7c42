//! Face localization with the two-eye acceptance rule.
//!
//! A face candidate is kept only when the eye cascade fires at least
//! twice inside its region; everything else is silently dropped. An empty
//! result is a valid outcome ("no qualifying face"), not an error.

use image::{imageops, RgbImage};

use crate::cascade::{CascadeDetector, DetectParams};
use crate::types::{FaceCandidate, Rect};

// Detection constants are tied to the trained classifier; they are not
// per-deployment configuration.
const FACE_SCALE_FACTOR: f32 = 1.3;
const FACE_MIN_NEIGHBORS: usize = 5;
const EYE_SCALE_FACTOR: f32 = 1.1;
const EYE_MIN_NEIGHBORS: usize = 3;
const REQUIRED_EYES: usize = 2;

/// Locates face regions that show at least two detectable eyes.
pub struct FaceEyeLocator {
    face_cascade: CascadeDetector,
    eye_cascade: CascadeDetector,
}

impl FaceEyeLocator {
    pub fn new(face_cascade: CascadeDetector, eye_cascade: CascadeDetector) -> Self {
        Self { face_cascade, eye_cascade }
    }

    /// Find accepted face crops in detection order.
    pub fn locate(&self, image: &RgbImage) -> Vec<FaceCandidate> {
        let gray = imageops::grayscale(image);

        let faces = self.face_cascade.detect(
            &gray,
            &DetectParams { scale_factor: FACE_SCALE_FACTOR, min_neighbors: FACE_MIN_NEIGHBORS },
        );
        tracing::debug!(candidates = faces.len(), "face cascade pass complete");

        let mut accepted = Vec::new();
        for rect in faces {
            let Some(rect) = clamp_rect(rect, image.width(), image.height()) else {
                continue;
            };

            let roi_gray =
                imageops::crop_imm(&gray, rect.x, rect.y, rect.width, rect.height).to_image();
            let eyes = self.eye_cascade.detect(
                &roi_gray,
                &DetectParams { scale_factor: EYE_SCALE_FACTOR, min_neighbors: EYE_MIN_NEIGHBORS },
            );

            if eyes.len() < REQUIRED_EYES {
                tracing::debug!(?rect, eyes = eyes.len(), "candidate dropped: too few eyes");
                continue;
            }

            let crop =
                imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image();
            accepted.push(FaceCandidate { rect, crop });
        }

        tracing::debug!(accepted = accepted.len(), "face localization complete");
        accepted
    }
}

/// Clip a detection to the image bounds; grouping averages can land a
/// rect partially outside. Returns None when nothing remains.
fn clamp_rect(rect: Rect, img_w: u32, img_h: u32) -> Option<Rect> {
    if rect.x >= img_w || rect.y >= img_h {
        return None;
    }
    let width = rect.width.min(img_w - rect.x);
    let height = rect.height.min(img_h - rect.y);
    if width == 0 || height == 0 {
        return None;
    }
    Some(Rect { x: rect.x, y: rect.y, width, height })
}
