// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Multi-feature optical-flow tracker.
//!
//! Seeds up to [`MAX_FEATURES`] Shi-Tomasi corners inside the region of
//! interest, follows each one with pyramidal Lucas-Kanade, and reports the
//! median of the survivors. Features that fail are dropped for the rest of
//! the run; when fewer than [`MIN_INLIER_RATIO`] of them survive a frame the
//! track is lost.

use image::GrayImage;

use super::{PixelRect, Roi, TrackingError};

/// Maximum number of corner features seeded from the ROI.
pub const MAX_FEATURES: usize = 20;
/// Corner strength relative to the strongest corner.
pub const FEATURE_QUALITY: f32 = 0.01;
/// Minimum pixel distance between seeded features.
pub const FEATURE_MIN_DISTANCE: f32 = 5.0;
/// Minimum fraction of features that must survive a frame.
pub const MIN_INLIER_RATIO: f64 = 0.25;

/// Lucas-Kanade window half size (21x21 window).
const WINDOW_HALF: i32 = 10;
/// Coarsest pyramid level (four levels in total).
const MAX_LEVEL: usize = 3;
const MAX_ITERATIONS: usize = 30;
const EPSILON: f32 = 0.01;
/// Below this the window has no usable gradient structure.
const MIN_DETERMINANT: f32 = 1e-6;

/// A single-channel float image.
#[derive(Debug, Clone)]
struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    fn from_gray(image: &GrayImage) -> Self {
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            data: image.as_raw().iter().map(|&v| f32::from(v)).collect(),
        }
    }

    fn at(&self, x: i64, y: i64) -> f32 {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.data[y * self.width + x]
    }

    /// Bilinear sample, clamped at the borders.
    fn sample(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let (fx, fy) = (x - x0, y - y0);
        let (ix, iy) = (x0 as i64, y0 as i64);
        let top = self.at(ix, iy) * (1.0 - fx) + self.at(ix + 1, iy) * fx;
        let bottom = self.at(ix, iy + 1) * (1.0 - fx) + self.at(ix + 1, iy + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Half-resolution copy using 2x2 box averaging.
    fn downsample(&self) -> Self {
        let width = self.width / 2;
        let height = self.height / 2;
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let (sx, sy) = (2 * x as i64, 2 * y as i64);
                data.push(
                    (self.at(sx, sy) + self.at(sx + 1, sy) + self.at(sx, sy + 1) + self.at(sx + 1, sy + 1)) / 4.0,
                );
            }
        }
        Self { width, height, data }
    }
}

/// Image pyramid, finest level first.
#[derive(Debug, Clone)]
pub struct Pyramid {
    levels: Vec<Plane>,
}

impl Pyramid {
    pub fn build(image: &GrayImage, max_level: usize) -> Self {
        let mut levels = vec![Plane::from_gray(image)];
        while levels.len() <= max_level {
            let Some(last) = levels.last() else { break };
            if last.width / 2 < 2 || last.height / 2 < 2 {
                break;
            }
            let next = last.downsample();
            levels.push(next);
        }
        Self { levels }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    fn base(&self) -> &Plane {
        &self.levels[0]
    }
}

/// Detect up to `max_corners` Shi-Tomasi corners inside `rect`, strongest
/// first, at least `min_distance` apart. Coordinates are in frame space.
pub fn good_features_to_track(
    image: &GrayImage,
    rect: PixelRect,
    max_corners: usize,
    quality: f32,
    min_distance: f32,
) -> Vec<(f32, f32)> {
    let plane = Plane::from_gray(image);
    let (rx, ry) = (i64::from(rect.x), i64::from(rect.y));
    let (rw, rh) = (rect.width as usize, rect.height as usize);
    if rw == 0 || rh == 0 {
        return Vec::new();
    }

    // Sobel gradients inside the rect.
    let mut gx = vec![0.0f32; rw * rh];
    let mut gy = vec![0.0f32; rw * rh];
    for y in 0..rh {
        for x in 0..rw {
            let (px, py) = (rx + x as i64, ry + y as i64);
            let p = |dx: i64, dy: i64| plane.at(px + dx, py + dy);
            gx[y * rw + x] = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1)) - (p(-1, -1) + 2.0 * p(-1, 0) + p(-1, 1));
            gy[y * rw + x] = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1)) - (p(-1, -1) + 2.0 * p(0, -1) + p(1, -1));
        }
    }

    // Minimum eigenvalue of the 3x3 structure tensor.
    let mut strength = vec![0.0f32; rw * rh];
    let mut max_strength = 0.0f32;
    for y in 0..rh {
        for x in 0..rw {
            let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
            for ny in y.saturating_sub(1)..=(y + 1).min(rh - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(rw - 1) {
                    let (ix, iy) = (gx[ny * rw + nx], gy[ny * rw + nx]);
                    a += ix * ix;
                    b += ix * iy;
                    c += iy * iy;
                }
            }
            let lambda = ((a + c) - ((a - c) * (a - c) + 4.0 * b * b).sqrt()) / 2.0;
            strength[y * rw + x] = lambda;
            max_strength = max_strength.max(lambda);
        }
    }
    if max_strength <= 0.0 {
        return Vec::new();
    }

    // Threshold and keep local maxima only.
    let threshold = quality * max_strength;
    let mut candidates: Vec<(f32, usize, usize)> = Vec::new();
    for y in 0..rh {
        for x in 0..rw {
            let s = strength[y * rw + x];
            if s <= threshold {
                continue;
            }
            let mut is_max = true;
            'neighbours: for ny in y.saturating_sub(1)..=(y + 1).min(rh - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(rw - 1) {
                    if strength[ny * rw + nx] > s {
                        is_max = false;
                        break 'neighbours;
                    }
                }
            }
            if is_max {
                candidates.push((s, x, y));
            }
        }
    }
    candidates.sort_by(|l, r| r.0.total_cmp(&l.0));

    let min_sq = min_distance * min_distance;
    let mut corners: Vec<(f32, f32)> = Vec::new();
    for (_, x, y) in candidates {
        let (fx, fy) = ((rx + x as i64) as f32, (ry + y as i64) as f32);
        let far_enough = corners
            .iter()
            .all(|&(cx, cy)| (cx - fx) * (cx - fx) + (cy - fy) * (cy - fy) >= min_sq);
        if far_enough {
            corners.push((fx, fy));
            if corners.len() >= max_corners {
                break;
            }
        }
    }
    corners
}

/// Follow one point from `prev` to `curr`. `None` when the window has no
/// gradient structure at full resolution or the point leaves the frame.
pub fn track_point(prev: &Pyramid, curr: &Pyramid, point: (f32, f32)) -> Option<(f32, f32)> {
    let levels = prev.num_levels().min(curr.num_levels());
    let samples = ((2 * WINDOW_HALF + 1) * (2 * WINDOW_HALF + 1)) as f32;
    let (mut guess_x, mut guess_y) = (0.0f32, 0.0f32);

    for level in (0..levels).rev() {
        let prev_img = &prev.levels[level];
        let curr_img = &curr.levels[level];
        let scale = 1.0 / (1u32 << level) as f32;
        let (px, py) = (point.0 * scale, point.1 * scale);

        // Template values and gradients from the previous frame; the
        // gradient matrix is constant across iterations.
        let mut patch = Vec::with_capacity(samples as usize);
        let (mut g00, mut g01, mut g11) = (0.0f32, 0.0f32, 0.0f32);
        for wy in -WINDOW_HALF..=WINDOW_HALF {
            for wx in -WINDOW_HALF..=WINDOW_HALF {
                let (tx, ty) = (px + wx as f32, py + wy as f32);
                let ix = 0.5 * (prev_img.sample(tx + 1.0, ty) - prev_img.sample(tx - 1.0, ty));
                let iy = 0.5 * (prev_img.sample(tx, ty + 1.0) - prev_img.sample(tx, ty - 1.0));
                g00 += ix * ix;
                g01 += ix * iy;
                g11 += iy * iy;
                patch.push((wx as f32, wy as f32, prev_img.sample(tx, ty), ix, iy));
            }
        }
        let (g00, g01, g11) = (g00 / samples, g01 / samples, g11 / samples);
        let det = g00 * g11 - g01 * g01;
        if det < MIN_DETERMINANT {
            if level == 0 {
                return None;
            }
            guess_x *= 2.0;
            guess_y *= 2.0;
            continue;
        }

        let (mut vx, mut vy) = (0.0f32, 0.0f32);
        for _ in 0..MAX_ITERATIONS {
            let (mut b0, mut b1) = (0.0f32, 0.0f32);
            for &(wx, wy, t, ix, iy) in &patch {
                let i = curr_img.sample(px + guess_x + vx + wx, py + guess_y + vy + wy);
                let e = t - i;
                b0 += ix * e;
                b1 += iy * e;
            }
            let (b0, b1) = (b0 / samples, b1 / samples);
            let ex = (g11 * b0 - g01 * b1) / det;
            let ey = (g00 * b1 - g01 * b0) / det;
            vx += ex;
            vy += ey;
            if ex * ex + ey * ey < EPSILON * EPSILON {
                break;
            }
        }

        guess_x += vx;
        guess_y += vy;
        if level > 0 {
            guess_x *= 2.0;
            guess_y *= 2.0;
        }
    }

    let (nx, ny) = (point.0 + guess_x, point.1 + guess_y);
    let base = curr.base();
    let inside = nx.is_finite()
        && ny.is_finite()
        && nx >= 0.0
        && ny >= 0.0
        && nx <= (base.width - 1) as f32
        && ny <= (base.height - 1) as f32;
    inside.then_some((nx, ny))
}

/// Median of a list; 0 when empty.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Outcome of propagating the feature set by one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlowStep {
    Tracked { x: f64, y: f64, confidence: f64 },
    Lost { x: f64, y: f64, inlier_ratio: f64 },
}

/// Combine the surviving feature positions out of `total` into one step.
pub fn aggregate(total: usize, survivors: &[(f32, f32)]) -> FlowStep {
    let xs: Vec<f64> = survivors.iter().map(|p| f64::from(p.0)).collect();
    let ys: Vec<f64> = survivors.iter().map(|p| f64::from(p.1)).collect();
    let ratio = if total > 0 {
        survivors.len() as f64 / total as f64
    } else {
        0.0
    };
    if survivors.is_empty() || ratio < MIN_INLIER_RATIO {
        FlowStep::Lost {
            x: median(&xs),
            y: median(&ys),
            inlier_ratio: ratio,
        }
    } else {
        FlowStep::Tracked {
            x: median(&xs),
            y: median(&ys),
            confidence: ratio,
        }
    }
}

/// Frame-to-frame optical-flow tracker state.
pub struct FlowTracker {
    previous: Pyramid,
    points: Vec<(f32, f32)>,
}

impl FlowTracker {
    /// Seed features from the ROI of the first frame. Falls back to the
    /// ROI centre when no corner is found.
    pub fn new(seed: &GrayImage, roi: &Roi) -> Result<Self, TrackingError> {
        let rect = roi
            .to_pixel_rect(seed.width(), seed.height())
            .ok_or(TrackingError::InvalidRoi(*roi))?;
        let mut points = good_features_to_track(seed, rect, MAX_FEATURES, FEATURE_QUALITY, FEATURE_MIN_DISTANCE);
        if points.is_empty() {
            let center = roi.center();
            log::debug!("No corners in ROI, tracking its centre");
            points.push((center.x as f32, center.y as f32));
        }
        log::debug!("Seeded {} optical-flow features", points.len());
        Ok(Self::with_points(seed, points))
    }

    /// Track an explicit feature set.
    pub fn with_points(seed: &GrayImage, points: Vec<(f32, f32)>) -> Self {
        Self {
            previous: Pyramid::build(seed, MAX_LEVEL),
            points,
        }
    }

    pub fn points(&self) -> &[(f32, f32)] {
        &self.points
    }

    /// Propagate every feature into `frame`. On success the survivors
    /// replace the feature set and `frame` becomes the reference.
    pub fn step(&mut self, frame: &GrayImage) -> FlowStep {
        let current = Pyramid::build(frame, MAX_LEVEL);
        let survivors: Vec<(f32, f32)> = self
            .points
            .iter()
            .filter_map(|&p| track_point(&self.previous, &current, p))
            .collect();
        let step = aggregate(self.points.len(), &survivors);
        if let FlowStep::Tracked { .. } = step {
            self.points = survivors;
            self.previous = current;
        }
        step
    }
}
