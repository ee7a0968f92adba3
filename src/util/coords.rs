// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Mapping between video-pixel space and canvas display space.
//!
//! The display transform is `display = (pixel / size) * (size * background
//! * zoom) + pan`. All overlay positions are derived through one
//! [`CoordinateMapper`] so a zoom or pan change moves every overlay together.

use serde::{Deserialize, Serialize};

use super::geometry::{round_to, Coordinate};

/// Zoom, pan and background scale of the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub zoom: f64,
    pub pan: Coordinate,
    /// Scale that fits the video into the canvas at zoom 1.
    pub background_scale: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan: Coordinate::default(),
            background_scale: 1.0,
        }
    }
}

impl Viewport {
    pub const MIN_ZOOM: f64 = 0.05;
    pub const MAX_ZOOM: f64 = 40.0;

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = round_to(zoom.clamp(Self::MIN_ZOOM, Self::MAX_ZOOM), 5);
    }

    pub fn set_pan(&mut self, x: f64, y: f64) {
        self.pan = Coordinate::new(round_to(x, 5), round_to(y, 5));
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        let pan = self.pan;
        self.set_pan(pan.x + dx, pan.y + dy);
    }

    /// Total display pixels per video pixel.
    pub fn effective_scale(&self) -> f64 {
        self.background_scale * self.zoom
    }
}

/// Bidirectional transform for a video of fixed dimensions.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateMapper {
    width: f64,
    height: f64,
    viewport: Viewport,
}

impl CoordinateMapper {
    pub fn new(width: f64, height: f64, viewport: Viewport) -> Self {
        Self {
            width: width.max(1.0),
            height: height.max(1.0),
            viewport,
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Video pixel to display position.
    pub fn to_display(&self, pixel: Coordinate) -> Coordinate {
        let scale = self.viewport.effective_scale();
        Coordinate::new(
            (pixel.x / self.width) * (self.width * scale) + self.viewport.pan.x,
            (pixel.y / self.height) * (self.height * scale) + self.viewport.pan.y,
        )
    }

    /// Display position to video pixel.
    pub fn to_pixel(&self, display: Coordinate) -> Coordinate {
        let scale = self.viewport.effective_scale();
        Coordinate::new(
            (display.x - self.viewport.pan.x) / (self.width * scale) * self.width,
            (display.y - self.viewport.pan.y) / (self.height * scale) * self.height,
        )
    }

    /// Display size of the whole video frame.
    pub fn display_size(&self) -> (f64, f64) {
        let scale = self.viewport.effective_scale();
        (self.width * scale, self.height * scale)
    }
}
