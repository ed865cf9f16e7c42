//! Fixed-length feature vector assembly.
//!
//! Both branches are resized to 32×32 with bilinear filtering — the same
//! interpolation used when the classifier was trained. Changing either the
//! filter or the layout below silently breaks classification accuracy, so
//! both are constants, not parameters.

use image::{imageops, imageops::FilterType, GrayImage, RgbImage};

/// Resize target for both branches.
pub const PATCH_SIZE: u32 = 32;
/// Interpolation fixed by the training/serving contract.
const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Flattened 32×32 RGB crop length.
pub const RAW_BRANCH_LEN: usize = (PATCH_SIZE * PATCH_SIZE * 3) as usize;
/// Flattened 32×32 wavelet-detail length.
pub const DETAIL_BRANCH_LEN: usize = (PATCH_SIZE * PATCH_SIZE) as usize;
/// Total feature vector length — the binding contract with the classifier.
pub const FEATURE_LEN: usize = RAW_BRANCH_LEN + DETAIL_BRANCH_LEN;

/// Build the classifier input from a color crop and its wavelet-detail
/// counterpart.
///
/// Layout: first the raw branch (row-major, RGB-interleaved), then the
/// detail branch. Always exactly [`FEATURE_LEN`] elements.
pub fn assemble_features(crop: &RgbImage, detail: &GrayImage) -> Vec<f32> {
    let raw = imageops::resize(crop, PATCH_SIZE, PATCH_SIZE, RESIZE_FILTER);
    let har = imageops::resize(detail, PATCH_SIZE, PATCH_SIZE, RESIZE_FILTER);

    let mut features = Vec::with_capacity(FEATURE_LEN);
    features.extend(raw.as_raw().iter().map(|&v| v as f32));
    features.extend(har.as_raw().iter().map(|&v| v as f32));

    debug_assert_eq!(features.len(), FEATURE_LEN);
    features
}
