//! Viola-Jones cascade object detector.
//!
//! Evaluates a pretrained sequence of rejection stages over a sliding
//! window at multiple scales. Each stage sums decision stumps over
//! Haar-like rectangle features computed on an integral image, with
//! per-window variance normalization. Raw hits are merged by rectangle
//! grouping so that isolated (low-support) windows are discarded.
//!
//! The serialized model is a JSON document; parsing and validation happen
//! once at load time, detection itself is allocation-light and
//! deterministic.

use image::GrayImage;
use serde::Deserialize;
use thiserror::Error;

use crate::types::Rect;

/// Relative tolerance used when clustering raw detections.
const GROUPING_EPS: f32 = 0.2;
/// Variance floor: windows flatter than this are treated as unit-variance
/// so the stump comparison stays finite.
const MIN_WINDOW_STDDEV: f32 = 1e-3;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("cascade model parse failure: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("cascade window is {width}x{height}; both extents must be positive")]
    EmptyWindow { width: u32, height: u32 },
    #[error("stage {stage}, stump {stump}: feature rect exceeds the {width}x{height} window")]
    RectOutOfWindow { stage: usize, stump: usize, width: u32, height: u32 },
}

/// A weighted rectangle of a Haar-like feature, in window-local coordinates.
#[derive(Debug, Clone, Deserialize)]
pub struct WeightedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f32,
}

/// A Haar-like feature: the weighted sum of its rectangles' pixel sums.
#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    pub rects: Vec<WeightedRect>,
}

/// Decision stump: compares the normalized feature value against a
/// threshold and contributes one of two votes to its stage.
#[derive(Debug, Clone, Deserialize)]
pub struct Stump {
    pub feature: Feature,
    pub threshold: f32,
    pub pass_value: f32,
    pub fail_value: f32,
}

/// One rejection stage. The window survives when the stump votes sum to
/// at least the stage threshold.
#[derive(Debug, Clone, Deserialize)]
pub struct Stage {
    pub threshold: f32,
    pub stumps: Vec<Stump>,
}

/// Serialized cascade: base window size plus the ordered stage list.
#[derive(Debug, Clone, Deserialize)]
pub struct CascadeModel {
    pub window_width: u32,
    pub window_height: u32,
    pub stages: Vec<Stage>,
}

/// Multi-scale sweep parameters. These are part of the trained-model
/// contract, not per-request knobs.
#[derive(Debug, Clone, Copy)]
pub struct DetectParams {
    /// Window growth factor between pyramid levels.
    pub scale_factor: f32,
    /// Minimum cluster size for a grouped detection to survive.
    /// Zero disables grouping and returns raw window hits.
    pub min_neighbors: usize,
}

/// Summed-area tables over a grayscale image; `sum` for plain intensities,
/// `sq_sum` for squares (window variance). Both are (w+1)×(h+1) so rect
/// sums need no boundary cases.
struct IntegralImage {
    width: usize,
    sum: Vec<f64>,
    sq_sum: Vec<f64>,
}

impl IntegralImage {
    fn new(gray: &GrayImage) -> Self {
        let w = gray.width() as usize;
        let h = gray.height() as usize;
        let stride = w + 1;
        let mut sum = vec![0.0f64; stride * (h + 1)];
        let mut sq_sum = vec![0.0f64; stride * (h + 1)];

        for y in 0..h {
            let mut row = 0.0f64;
            let mut sq_row = 0.0f64;
            for x in 0..w {
                let p = gray.get_pixel(x as u32, y as u32).0[0] as f64;
                row += p;
                sq_row += p * p;
                sum[(y + 1) * stride + (x + 1)] = sum[y * stride + (x + 1)] + row;
                sq_sum[(y + 1) * stride + (x + 1)] = sq_sum[y * stride + (x + 1)] + sq_row;
            }
        }

        Self { width: stride, sum, sq_sum }
    }

    fn rect_sum(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        let s = self.width;
        self.sum[(y + h) * s + (x + w)] + self.sum[y * s + x]
            - self.sum[y * s + (x + w)]
            - self.sum[(y + h) * s + x]
    }

    fn rect_sq_sum(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        let s = self.width;
        self.sq_sum[(y + h) * s + (x + w)] + self.sq_sum[y * s + x]
            - self.sq_sum[y * s + (x + w)]
            - self.sq_sum[(y + h) * s + x]
    }
}

/// A loaded, validated cascade ready for detection.
pub struct CascadeDetector {
    model: CascadeModel,
}

impl CascadeDetector {
    pub fn new(model: CascadeModel) -> Result<Self, CascadeError> {
        if model.window_width == 0 || model.window_height == 0 {
            return Err(CascadeError::EmptyWindow {
                width: model.window_width,
                height: model.window_height,
            });
        }
        for (si, stage) in model.stages.iter().enumerate() {
            for (ti, stump) in stage.stumps.iter().enumerate() {
                for r in &stump.feature.rects {
                    if r.x + r.width > model.window_width || r.y + r.height > model.window_height {
                        return Err(CascadeError::RectOutOfWindow {
                            stage: si,
                            stump: ti,
                            width: model.window_width,
                            height: model.window_height,
                        });
                    }
                }
            }
        }
        Ok(Self { model })
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, CascadeError> {
        let model: CascadeModel = serde_json::from_slice(bytes)?;
        Self::new(model)
    }

    pub fn window_size(&self) -> (u32, u32) {
        (self.model.window_width, self.model.window_height)
    }

    /// Run the cascade over a grayscale image.
    ///
    /// Sweeps a scale pyramid from the base window size up to the image
    /// extent, evaluates every window position, and groups raw hits.
    /// Output order follows the sweep (scale-major, then row-major);
    /// no randomness is involved.
    pub fn detect(&self, gray: &GrayImage, params: &DetectParams) -> Vec<Rect> {
        let img_w = gray.width() as usize;
        let img_h = gray.height() as usize;
        let base_w = self.model.window_width as usize;
        let base_h = self.model.window_height as usize;
        if img_w < base_w || img_h < base_h {
            return Vec::new();
        }

        let integral = IntegralImage::new(gray);
        let mut raw = Vec::new();

        let mut scale = 1.0f32;
        loop {
            let win_w = (base_w as f32 * scale).round() as usize;
            let win_h = (base_h as f32 * scale).round() as usize;
            if win_w > img_w || win_h > img_h {
                break;
            }

            // Shift grows with the window so coarse scales stay cheap.
            let step = ((scale * 2.0).round() as usize).max(1);

            let mut y = 0;
            while y + win_h <= img_h {
                let mut x = 0;
                while x + win_w <= img_w {
                    if self.eval_window(&integral, x, y, win_w, win_h, scale) {
                        raw.push(Rect::new(x as u32, y as u32, win_w as u32, win_h as u32));
                    }
                    x += step;
                }
                y += step;
            }

            scale *= params.scale_factor;
        }

        if params.min_neighbors == 0 {
            return raw;
        }
        group_rectangles(raw, params.min_neighbors, GROUPING_EPS)
    }

    /// Evaluate all stages for one window. Short-circuits on the first
    /// failing stage, which is what makes the cascade cheap on background.
    fn eval_window(
        &self,
        integral: &IntegralImage,
        x: usize,
        y: usize,
        win_w: usize,
        win_h: usize,
        scale: f32,
    ) -> bool {
        let area = (win_w * win_h) as f64;
        let inv_area = 1.0 / area;
        let mean = integral.rect_sum(x, y, win_w, win_h) * inv_area;
        let variance = integral.rect_sq_sum(x, y, win_w, win_h) * inv_area - mean * mean;
        let stddev = variance.max(0.0).sqrt().max(MIN_WINDOW_STDDEV as f64);

        for stage in &self.model.stages {
            let mut votes = 0.0f64;
            for stump in &stage.stumps {
                let mut value = 0.0f64;
                for r in &stump.feature.rects {
                    let rx = x + (r.x as f32 * scale).round() as usize;
                    let ry = y + (r.y as f32 * scale).round() as usize;
                    if rx >= x + win_w || ry >= y + win_h {
                        continue;
                    }
                    // Rounding can push a scaled rect one pixel past the
                    // scaled window; clamp back inside.
                    let rw = ((r.width as f32 * scale).round() as usize).min(x + win_w - rx);
                    let rh = ((r.height as f32 * scale).round() as usize).min(y + win_h - ry);
                    if rw == 0 || rh == 0 {
                        continue;
                    }
                    value += r.weight as f64 * integral.rect_sum(rx, ry, rw, rh);
                }
                value *= inv_area;

                votes += if value < stump.threshold as f64 * stddev {
                    stump.fail_value as f64
                } else {
                    stump.pass_value as f64
                };
            }
            if votes < stage.threshold as f64 {
                return false;
            }
        }
        true
    }
}

/// Rectangle grouping: partition raw hits into similarity classes by
/// transitive closure of the pairwise overlap test (two hits from the same
/// object chain together even when the extremes differ), average each
/// class, and keep classes with at least `min_neighbors` members.
fn group_rectangles(raw: Vec<Rect>, min_neighbors: usize, eps: f32) -> Vec<Rect> {
    if raw.is_empty() {
        return raw;
    }

    // Union-find over pairwise similarity.
    let mut parent: Vec<usize> = (0..raw.len()).collect();
    fn find(parent: &mut [usize], i: usize) -> usize {
        let mut root = i;
        while parent[root] != root {
            root = parent[root];
        }
        let mut cur = i;
        while parent[cur] != root {
            let next = parent[cur];
            parent[cur] = root;
            cur = next;
        }
        root
    }
    for i in 0..raw.len() {
        for j in (i + 1)..raw.len() {
            if raw[i].is_similar(&raw[j], eps) {
                let ri = find(&mut parent, i);
                let rj = find(&mut parent, j);
                if ri != rj {
                    parent[ri] = rj;
                }
            }
        }
    }

    let mut counts = vec![0usize; raw.len()];
    let mut sums = vec![[0u64; 4]; raw.len()];
    for i in 0..raw.len() {
        let root = find(&mut parent, i);
        counts[root] += 1;
        sums[root][0] += raw[i].x as u64;
        sums[root][1] += raw[i].y as u64;
        sums[root][2] += raw[i].width as u64;
        sums[root][3] += raw[i].height as u64;
    }

    let mut grouped = Vec::new();
    for root in 0..raw.len() {
        if counts[root] < min_neighbors {
            continue;
        }
        let n = counts[root] as u64;
        grouped.push(Rect::new(
            (sums[root][0] / n) as u32,
            (sums[root][1] / n) as u32,
            (sums[root][2] / n) as u32,
            (sums[root][3] / n) as u32,
        ));
    }
    grouped
}


#[cfg(test)]
mod tests {
    use super::testutil::{accept_all_cascade, checkerboard_gray, flat_bright_cascade};
    use super::*;
    use image::Luma;

    /// Checkerboard with one flat bright square painted over it.
    fn busy_image_with_flat_square(size: u32, sq_x: u32, sq_y: u32, sq: u32) -> GrayImage {
        let mut img = checkerboard_gray(size);
        for y in sq_y..sq_y + sq {
            for x in sq_x..sq_x + sq {
                img.put_pixel(x, y, Luma([210u8]));
            }
        }
        img
    }

    #[test]
    fn test_integral_rect_sums() {
        // 3x3 image with values 1..9 row-major
        let img = GrayImage::from_fn(3, 3, |x, y| Luma([(y * 3 + x + 1) as u8]));
        let integral = IntegralImage::new(&img);
        assert_eq!(integral.rect_sum(0, 0, 3, 3) as u64, 45);
        assert_eq!(integral.rect_sum(1, 1, 2, 2) as u64, 5 + 6 + 8 + 9);
        assert_eq!(integral.rect_sum(0, 2, 3, 1) as u64, 7 + 8 + 9);
        assert_eq!(integral.rect_sq_sum(0, 0, 1, 1) as u64, 1);
        assert_eq!(integral.rect_sq_sum(2, 2, 1, 1) as u64, 81);
    }

    #[test]
    fn test_detects_flat_region_only() {
        let detector = flat_bright_cascade(16, 20.0);
        let img = busy_image_with_flat_square(96, 40, 40, 24);
        let hits = detector.detect(&img, &DetectParams { scale_factor: 1.3, min_neighbors: 1 });

        assert!(!hits.is_empty(), "flat square should produce detections");
        for hit in &hits {
            // Every grouped hit must lie on the flat square.
            assert!(hit.x >= 40 && hit.x + hit.width <= 64, "hit {hit:?} misses square");
            assert!(hit.y >= 40 && hit.y + hit.height <= 64, "hit {hit:?} misses square");
        }
    }

    #[test]
    fn test_busy_image_yields_nothing() {
        let detector = flat_bright_cascade(16, 20.0);
        let img = checkerboard_gray(64);
        let hits = detector.detect(&img, &DetectParams { scale_factor: 1.3, min_neighbors: 1 });
        assert!(hits.is_empty());
    }

    #[test]
    fn test_image_smaller_than_window() {
        let detector = flat_bright_cascade(32, 0.0);
        let img = GrayImage::from_pixel(16, 16, Luma([255u8]));
        let hits = detector.detect(&img, &DetectParams { scale_factor: 1.3, min_neighbors: 0 });
        assert!(hits.is_empty());
    }

    #[test]
    fn test_accept_all_raw_windows() {
        let detector = accept_all_cascade(8);
        let img = GrayImage::from_pixel(16, 16, Luma([100u8]));
        let hits = detector.detect(&img, &DetectParams { scale_factor: 1.3, min_neighbors: 0 });
        // Raw mode: step 2 at scale 1, every position a hit.
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|r| r.width >= 8));
    }

    #[test]
    fn test_detection_is_deterministic() {
        let detector = flat_bright_cascade(16, 20.0);
        let img = busy_image_with_flat_square(80, 20, 30, 20);
        let params = DetectParams { scale_factor: 1.3, min_neighbors: 1 };
        assert_eq!(detector.detect(&img, &params), detector.detect(&img, &params));
    }

    #[test]
    fn test_grouping_requires_min_neighbors() {
        let cluster: Vec<Rect> = (0..6).map(|i| Rect::new(100 + i, 100, 50, 50)).collect();
        let mut raw = cluster.clone();
        raw.push(Rect::new(400, 400, 50, 50)); // lone outlier

        let grouped = group_rectangles(raw, 5, GROUPING_EPS);
        assert_eq!(grouped.len(), 1);
        let g = grouped[0];
        assert!(g.x >= 100 && g.x <= 105);
        assert_eq!(g.width, 50);
    }

    #[test]
    fn test_grouping_empty_input() {
        assert!(group_rectangles(Vec::new(), 3, GROUPING_EPS).is_empty());
    }

    #[test]
    fn test_rejects_feature_rect_outside_window() {
        let model = CascadeModel {
            window_width: 10,
            window_height: 10,
            stages: vec![Stage {
                threshold: 0.0,
                stumps: vec![Stump {
                    feature: Feature {
                        rects: vec![WeightedRect { x: 5, y: 5, width: 10, height: 10, weight: 1.0 }],
                    },
                    threshold: 0.0,
                    pass_value: 1.0,
                    fail_value: 0.0,
                }],
            }],
        };
        assert!(matches!(
            CascadeDetector::new(model),
            Err(CascadeError::RectOutOfWindow { .. })
        ));
    }

    #[test]
    fn test_model_json_round_trip() {
        let json = r#"{
            "window_width": 24,
            "window_height": 24,
            "stages": [{
                "threshold": 0.8,
                "stumps": [{
                    "feature": { "rects": [
                        { "x": 0, "y": 0, "width": 24, "height": 12, "weight": 1.0 },
                        { "x": 0, "y": 12, "width": 24, "height": 12, "weight": -1.0 }
                    ]},
                    "threshold": 0.02,
                    "pass_value": 0.9,
                    "fail_value": -0.4
                }]
            }]
        }"#;
        let detector = CascadeDetector::from_json(json.as_bytes()).unwrap();
        assert_eq!(detector.window_size(), (24, 24));
    }
}
