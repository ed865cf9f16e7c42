//! Wavelet detail extraction.
//!
//! Runs a multi-level 2-D Haar decomposition over the grayscale crop,
//! zeroes the approximation band, and reconstructs. What remains is the
//! high-frequency edge/texture structure the classifier was trained on.
//! Odd extents use symmetric edge extension, so any crop size is valid.

use std::f32::consts::FRAC_1_SQRT_2;

use image::{imageops, GrayImage, RgbImage};
use ndarray::Array2;
use thiserror::Error;

/// Decomposition depth used at training time.
pub const DEFAULT_LEVEL: usize = 5;

/// Wavelet family identifier. Only the Haar basis (a.k.a. db1) is in the
/// training/serving contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WaveletFamily {
    #[default]
    Haar,
}

impl WaveletFamily {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "haar" | "db1" => Some(WaveletFamily::Haar),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum WaveletError {
    #[error("image {width}x{height} is too small for a level-{level} decomposition (max {max_level})")]
    TooSmall { width: u32, height: u32, level: usize, max_level: usize },
}

/// One decomposition level's detail bands plus the extent of the plane
/// that was decomposed (needed to undo the odd-size extension).
struct DetailBands {
    horizontal: Array2<f32>,
    vertical: Array2<f32>,
    diagonal: Array2<f32>,
    rows: usize,
    cols: usize,
}

/// Produce the wavelet-detail image for a color crop.
///
/// On transform failure (crop too small for the requested level) the plain
/// grayscale conversion is returned instead: classification degrades
/// gracefully rather than aborting the request.
pub fn wavelet_detail(crop: &RgbImage, family: WaveletFamily, level: usize) -> GrayImage {
    let gray = imageops::grayscale(crop);
    match detail_image(&gray, family, level) {
        Ok(detail) => detail,
        Err(err) => {
            tracing::warn!(error = %err, "wavelet transform failed; using grayscale fallback");
            gray
        }
    }
}

/// Decompose, zero the approximation band, reconstruct, quantize.
fn detail_image(gray: &GrayImage, _family: WaveletFamily, level: usize) -> Result<GrayImage, WaveletError> {
    let width = gray.width();
    let height = gray.height();
    let max = max_level(width.min(height) as usize);
    if level > max || level == 0 {
        return Err(WaveletError::TooSmall { width, height, level, max_level: max });
    }

    let mut plane = Array2::<f32>::zeros((height as usize, width as usize));
    for (x, y, pixel) in gray.enumerate_pixels() {
        plane[(y as usize, x as usize)] = pixel.0[0] as f32 / 255.0;
    }

    let (mut approx, bands) = wavedec2(plane, level);
    approx.fill(0.0);
    let reconstructed = waverec2(approx, &bands);

    let out = GrayImage::from_fn(width, height, |x, y| {
        let v = reconstructed[(y as usize, x as usize)] * 255.0;
        image::Luma([v.round().clamp(0.0, 255.0) as u8])
    });
    Ok(out)
}

/// Maximum usable decomposition depth for the Haar basis: the number of
/// times the shorter extent halves before dropping below 2.
pub fn max_level(min_dim: usize) -> usize {
    let mut n = min_dim;
    let mut level = 0;
    while n >= 2 {
        n = (n + 1) / 2;
        level += 1;
    }
    level
}

/// Multi-level 2-D analysis. Returns the final approximation plane and the
/// per-level detail bands, finest level first.
fn wavedec2(mut approx: Array2<f32>, level: usize) -> (Array2<f32>, Vec<DetailBands>) {
    let mut bands = Vec::with_capacity(level);
    for _ in 0..level {
        let (next, detail) = dwt2(&approx);
        bands.push(detail);
        approx = next;
    }
    (approx, bands)
}

/// Inverse of [`wavedec2`]: fold the detail bands back in, coarsest first.
fn waverec2(mut approx: Array2<f32>, bands: &[DetailBands]) -> Array2<f32> {
    for detail in bands.iter().rev() {
        approx = idwt2(&approx, detail);
    }
    approx
}

/// Single-level 2-D analysis: rows first, then columns.
fn dwt2(input: &Array2<f32>) -> (Array2<f32>, DetailBands) {
    let (rows, cols) = input.dim();
    let half_cols = cols.div_ceil(2);
    let half_rows = rows.div_ceil(2);

    // Row pass: per row, split into low/high halves.
    let mut low = Array2::<f32>::zeros((rows, half_cols));
    let mut high = Array2::<f32>::zeros((rows, half_cols));
    for r in 0..rows {
        for k in 0..half_cols {
            let a = input[(r, 2 * k)];
            let b = input[(r, (2 * k + 1).min(cols - 1))];
            low[(r, k)] = (a + b) * FRAC_1_SQRT_2;
            high[(r, k)] = (a - b) * FRAC_1_SQRT_2;
        }
    }

    // Column pass over each half.
    let mut ll = Array2::<f32>::zeros((half_rows, half_cols));
    let mut lh = Array2::<f32>::zeros((half_rows, half_cols));
    let mut hl = Array2::<f32>::zeros((half_rows, half_cols));
    let mut hh = Array2::<f32>::zeros((half_rows, half_cols));
    for c in 0..half_cols {
        for k in 0..half_rows {
            let top = 2 * k;
            let bottom = (2 * k + 1).min(rows - 1);

            let la = low[(top, c)];
            let lb = low[(bottom, c)];
            ll[(k, c)] = (la + lb) * FRAC_1_SQRT_2;
            lh[(k, c)] = (la - lb) * FRAC_1_SQRT_2;

            let ha = high[(top, c)];
            let hb = high[(bottom, c)];
            hl[(k, c)] = (ha + hb) * FRAC_1_SQRT_2;
            hh[(k, c)] = (ha - hb) * FRAC_1_SQRT_2;
        }
    }

    (ll, DetailBands { horizontal: lh, vertical: hl, diagonal: hh, rows, cols })
}

/// Single-level 2-D synthesis, truncating the symmetric extension back to
/// the original extent recorded in the bands.
fn idwt2(approx: &Array2<f32>, detail: &DetailBands) -> Array2<f32> {
    let (half_rows, half_cols) = approx.dim();
    let rows = detail.rows;
    let cols = detail.cols;

    // Undo the column pass.
    let mut low = Array2::<f32>::zeros((rows, half_cols));
    let mut high = Array2::<f32>::zeros((rows, half_cols));
    for c in 0..half_cols {
        for k in 0..half_rows {
            let la = (approx[(k, c)] + detail.horizontal[(k, c)]) * FRAC_1_SQRT_2;
            let lb = (approx[(k, c)] - detail.horizontal[(k, c)]) * FRAC_1_SQRT_2;
            let ha = (detail.vertical[(k, c)] + detail.diagonal[(k, c)]) * FRAC_1_SQRT_2;
            let hb = (detail.vertical[(k, c)] - detail.diagonal[(k, c)]) * FRAC_1_SQRT_2;

            low[(2 * k, c)] = la;
            high[(2 * k, c)] = ha;
            if 2 * k + 1 < rows {
                low[(2 * k + 1, c)] = lb;
                high[(2 * k + 1, c)] = hb;
            }
        }
    }

    // Undo the row pass.
    let mut output = Array2::<f32>::zeros((rows, cols));
    for r in 0..rows {
        for k in 0..half_cols {
            let a = (low[(r, k)] + high[(r, k)]) * FRAC_1_SQRT_2;
            let b = (low[(r, k)] - high[(r, k)]) * FRAC_1_SQRT_2;
            output[(r, 2 * k)] = a;
            if 2 * k + 1 < cols {
                output[(r, 2 * k + 1)] = b;
            }
        }
    }
    output
}
