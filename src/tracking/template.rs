// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Template-matching tracker.
//!
//! Matching uses zero-mean normalized cross-correlation (the same score as
//! OpenCV's `TM_CCOEFF_NORMED`), restricted to a search window around the
//! previous match. Window sums come from integral images so each candidate
//! position costs one pass over the template.

use image::{imageops, GrayImage};

use super::{PixelRect, Roi, TrackingError};

/// Minimum confidence before the template is refreshed.
pub const TEMPLATE_UPDATE_CONFIDENCE: f64 = 0.8;

/// Best match of a template inside an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchLocation {
    /// Top-left corner of the match.
    pub x: u32,
    pub y: u32,
    pub score: f64,
}

/// Summed-area tables for pixel values and their squares.
struct Integral {
    width: usize,
    sum: Vec<f64>,
    sq_sum: Vec<f64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sq_sum = vec![0.0; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = f64::from(image.get_pixel(x as u32, y as u32)[0]);
                row += v;
                row_sq += v * v;
                let i = (y + 1) * stride + x + 1;
                sum[i] = sum[i - stride] + row;
                sq_sum[i] = sq_sum[i - stride] + row_sq;
            }
        }
        Self {
            width: stride,
            sum,
            sq_sum,
        }
    }

    fn rect(table: &[f64], stride: usize, x: usize, y: usize, w: usize, h: usize) -> f64 {
        table[(y + h) * stride + x + w] - table[y * stride + x + w] - table[(y + h) * stride + x]
            + table[y * stride + x]
    }

    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        (
            Self::rect(&self.sum, self.width, x, y, w, h),
            Self::rect(&self.sq_sum, self.width, x, y, w, h),
        )
    }
}

/// Find the best normalized cross-correlation match of `template` inside
/// `image`. `None` when the template is larger than the image.
pub fn match_template(image: &GrayImage, template: &GrayImage) -> Option<MatchLocation> {
    let (iw, ih) = (image.width() as usize, image.height() as usize);
    let (tw, th) = (template.width() as usize, template.height() as usize);
    if tw == 0 || th == 0 || tw > iw || th > ih {
        return None;
    }

    let n = (tw * th) as f64;
    let t_mean = template.pixels().map(|p| f64::from(p[0])).sum::<f64>() / n;
    let centered: Vec<f64> = template.pixels().map(|p| f64::from(p[0]) - t_mean).collect();
    let t_norm = centered.iter().map(|v| v * v).sum::<f64>().sqrt();
    let integral = Integral::new(image);
    let raw = image.as_raw();

    let mut best = MatchLocation {
        x: 0,
        y: 0,
        score: f64::NEG_INFINITY,
    };
    for y in 0..=(ih - th) {
        for x in 0..=(iw - tw) {
            let (sum, sq_sum) = integral.window(x, y, tw, th);
            let variance = (sq_sum - sum * sum / n).max(0.0);
            let denom = variance.sqrt() * t_norm;

            let score = if denom <= 1e-9 {
                0.0
            } else {
                let mut cross = 0.0;
                for ty in 0..th {
                    let row = &raw[(y + ty) * iw + x..(y + ty) * iw + x + tw];
                    let trow = &centered[ty * tw..(ty + 1) * tw];
                    cross += row
                        .iter()
                        .zip(trow)
                        .map(|(&p, &t)| f64::from(p) * t)
                        .sum::<f64>();
                }
                (cross / denom).clamp(-1.0, 1.0)
            };

            if score > best.score {
                best = MatchLocation {
                    x: x as u32,
                    y: y as u32,
                    score,
                };
            }
        }
    }
    Some(best)
}

/// Outcome of matching one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemplateStep {
    Found { x: f64, y: f64, confidence: f64 },
    /// The template no longer fits in the search window or nothing in it
    /// correlates with the template.
    Lost { x: f64, y: f64 },
}

/// Frame-to-frame template tracker state.
pub struct TemplateTracker {
    template: GrayImage,
    center_x: f64,
    center_y: f64,
    search_margin: u32,
    update_interval: u32,
    frames_since_update: u32,
}

fn crop(image: &GrayImage, rect: PixelRect) -> GrayImage {
    imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image()
}

fn clamp_round(value: f64, min: f64, max: f64) -> f64 {
    value.round().max(min).min(max)
}

impl TemplateTracker {
    /// Cut the initial template out of the seed frame.
    pub fn new(seed: &GrayImage, roi: &Roi, search_margin: u32, update_interval: u32) -> Result<Self, TrackingError> {
        let rect = roi
            .to_pixel_rect(seed.width(), seed.height())
            .ok_or(TrackingError::InvalidRoi(*roi))?;
        let center = rect.center();
        Ok(Self {
            template: crop(seed, rect),
            center_x: center.x,
            center_y: center.y,
            search_margin,
            update_interval,
            frames_since_update: 0,
        })
    }

    pub fn template(&self) -> &GrayImage {
        &self.template
    }

    pub fn center(&self) -> (f64, f64) {
        (self.center_x, self.center_y)
    }

    /// Search window for the next frame, clipped to the frame.
    fn search_window(&self, frame_width: u32, frame_height: u32) -> (u32, u32, u32, u32) {
        let (fw, fh) = (f64::from(frame_width), f64::from(frame_height));
        let (tw, th) = (f64::from(self.template.width()), f64::from(self.template.height()));
        let margin = f64::from(self.search_margin);
        let sx = clamp_round(self.center_x - tw / 2.0 - margin, 0.0, fw - 1.0);
        let sy = clamp_round(self.center_y - th / 2.0 - margin, 0.0, fh - 1.0);
        let sw = (tw + 2.0 * margin).round().min(fw - sx);
        let sh = (th + 2.0 * margin).round().min(fh - sy);
        (sx as u32, sy as u32, sw as u32, sh as u32)
    }

    /// Match the template in `frame` and update the tracked position.
    pub fn step(&mut self, frame: &GrayImage) -> TemplateStep {
        let (tw, th) = (self.template.width(), self.template.height());
        let (sx, sy, sw, sh) = self.search_window(frame.width(), frame.height());
        if sw < tw || sh < th {
            return TemplateStep::Lost {
                x: self.center_x,
                y: self.center_y,
            };
        }

        let window = crop(
            frame,
            PixelRect {
                x: sx,
                y: sy,
                width: sw,
                height: sh,
            },
        );
        let Some(found) = match_template(&window, &self.template) else {
            return TemplateStep::Lost {
                x: self.center_x,
                y: self.center_y,
            };
        };
        if found.score <= 0.0 {
            return TemplateStep::Lost {
                x: self.center_x,
                y: self.center_y,
            };
        }

        self.center_x = f64::from(sx + found.x) + f64::from(tw) / 2.0;
        self.center_y = f64::from(sy + found.y) + f64::from(th) / 2.0;
        let confidence = found.score;

        self.frames_since_update += 1;
        if self.update_interval > 0
            && self.frames_since_update >= self.update_interval
            && confidence >= TEMPLATE_UPDATE_CONFIDENCE
        {
            let (fw, fh) = (f64::from(frame.width()), f64::from(frame.height()));
            let ux = clamp_round(self.center_x - f64::from(tw) / 2.0, 0.0, fw - f64::from(tw));
            let uy = clamp_round(self.center_y - f64::from(th) / 2.0, 0.0, fh - f64::from(th));
            self.template = crop(
                frame,
                PixelRect {
                    x: ux as u32,
                    y: uy as u32,
                    width: tw,
                    height: th,
                },
            );
            self.frames_since_update = 0;
            log::debug!("Template refreshed at ({}, {})", ux, uy);
        }

        TemplateStep::Found {
            x: self.center_x,
            y: self.center_y,
            confidence,
        }
    }
}
