// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Automatic point tracking.
//!
//! A [`engine::TrackingRun`] follows an object from a region of interest
//! through a frame range, using either template matching
//! ([`template`]) or multi-feature optical flow ([`flow`]). The run is an
//! explicit state machine stepped with `next().await`; [`session`] holds the
//! consumer-side policy (confidence threshold, resume after loss).

pub mod engine;
pub mod flow;
pub mod session;
pub mod template;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::io::media::SourceError;
use crate::models::frame::FrameIndex;
use crate::models::timeline::Timeline;
use crate::util::geometry::{round_to, Coordinate};

/// Rectangular region of interest in video-pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A region snapped to whole pixels and clipped to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a region from two opposite corners in any order.
    pub fn from_corners(a: Coordinate, b: Coordinate) -> Self {
        Self::new(
            a.x.min(b.x),
            a.y.min(b.y),
            (a.x - b.x).abs(),
            (a.y - b.y).abs(),
        )
    }

    /// A region of the given size centred on `center`.
    pub fn centered_on(center: Coordinate, width: f64, height: f64) -> Self {
        Self::new(center.x - width / 2.0, center.y - height / 2.0, width, height)
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Snap to pixels and clip to a `frame_width` x `frame_height` frame.
    /// `None` when the region lies entirely outside the frame or the frame
    /// is empty.
    pub fn to_pixel_rect(&self, frame_width: u32, frame_height: u32) -> Option<PixelRect> {
        if frame_width == 0 || frame_height == 0 {
            return None;
        }
        if !(self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()) {
            return None;
        }
        let (fw, fh) = (f64::from(frame_width), f64::from(frame_height));
        if self.x >= fw || self.y >= fh || self.x + self.width <= 0.0 || self.y + self.height <= 0.0 {
            return None;
        }
        let x = self.x.round().clamp(0.0, fw - 1.0);
        let y = self.y.round().clamp(0.0, fh - 1.0);
        let width = self.width.round().clamp(1.0, fw).min(fw - x);
        let height = self.height.round().clamp(1.0, fh).min(fh - y);
        Some(PixelRect {
            x: x as u32,
            y: y as u32,
            width: width as u32,
            height: height as u32,
        })
    }
}

impl PixelRect {
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            f64::from(self.x) + f64::from(self.width) / 2.0,
            f64::from(self.y) + f64::from(self.height) / 2.0,
        )
    }
}

/// Tracking algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    #[default]
    Template,
    OpticalFlow,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Template => f.write_str("template"),
            Algorithm::OpticalFlow => f.write_str("optical-flow"),
        }
    }
}

impl FromStr for Algorithm {
    type Err = TrackingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "template" => Ok(Algorithm::Template),
            "optical-flow" => Ok(Algorithm::OpticalFlow),
            other => Err(TrackingError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Parameters for one tracking run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingConfig {
    pub roi: Roi,
    pub start_frame: FrameIndex,
    pub end_frame: FrameIndex,
    pub algorithm: Algorithm,
    /// Padding around the previous match, in pixels.
    pub search_margin: u32,
    /// Frames between template refreshes; 0 disables refreshing.
    pub template_update_interval: u32,
    pub seek_timeout: Duration,
    /// Seconds per frame, as used by the timeline's frame grid.
    pub frame_time: f64,
}

impl TrackingConfig {
    pub const DEFAULT_SEARCH_MARGIN: u32 = 20;
    pub const DEFAULT_TEMPLATE_UPDATE_INTERVAL: u32 = 10;
    pub const DEFAULT_SEEK_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(roi: Roi, start_frame: FrameIndex, end_frame: FrameIndex, algorithm: Algorithm, frame_time: f64) -> Self {
        Self {
            roi,
            start_frame,
            end_frame,
            algorithm,
            search_margin: Self::DEFAULT_SEARCH_MARGIN,
            template_update_interval: Self::DEFAULT_TEMPLATE_UPDATE_INTERVAL,
            seek_timeout: Self::DEFAULT_SEEK_TIMEOUT,
            frame_time,
        }
    }

    /// Config using the frame grid of `timeline`.
    pub fn for_timeline(timeline: &Timeline, roi: Roi, start_frame: FrameIndex, end_frame: FrameIndex, algorithm: Algorithm) -> Self {
        Self::new(roi, start_frame, end_frame, algorithm, timeline.frame_time())
    }

    /// Start time of `frame`, matching [`Timeline::frame_start`].
    pub fn frame_start(&self, frame: FrameIndex) -> f64 {
        round_to(self.frame_time * frame.0 as f64, 3)
    }

    /// Number of frames processed after the seed frame.
    pub fn total_frames(&self) -> usize {
        self.end_frame.0.saturating_sub(self.start_frame.0)
    }

    pub fn validate(&self) -> Result<(), TrackingError> {
        if self.end_frame <= self.start_frame {
            return Err(TrackingError::InvalidRange {
                start: self.start_frame,
                end: self.end_frame,
            });
        }
        if !(self.frame_time.is_finite() && self.frame_time > 0.0) {
            return Err(TrackingError::InvalidConfig(format!(
                "frame time must be positive, got {}",
                self.frame_time
            )));
        }
        if !(self.roi.width > 0.0 && self.roi.height > 0.0) {
            return Err(TrackingError::InvalidRoi(self.roi));
        }
        Ok(())
    }
}

/// Position reported for one processed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingResult {
    pub frame: FrameIndex,
    pub x: f64,
    pub y: f64,
    /// Match quality in `[0, 1]`.
    pub confidence: f64,
}

impl TrackingResult {
    pub fn position(&self) -> Coordinate {
        Coordinate::new(self.x, self.y)
    }
}

/// Item produced by a running engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackingEvent {
    Progress { processed: usize, total: usize },
    Result(TrackingResult),
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every frame in the range was processed.
    Completed,
    /// Confidence collapsed; the last result reported confidence 0.
    Lost {
        frame: FrameIndex,
        inlier_ratio: Option<f64>,
    },
    Cancelled,
    /// The frame source did not become ready in time.
    TimedOut { frame: FrameIndex },
    Failed(String),
}

/// Shared cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    #[error("frame source error: {0}")]
    Source(#[from] SourceError),
    #[error("invalid frame range {start}..{end}")]
    InvalidRange { start: FrameIndex, end: FrameIndex },
    #[error("region of interest {0:?} does not overlap the frame")]
    InvalidRoi(Roi),
    #[error("invalid tracking configuration: {0}")]
    InvalidConfig(String),
    #[error("unknown tracking algorithm '{0}'")]
    UnknownAlgorithm(String),
    #[error("frame is empty")]
    EmptyFrame,
}

/// Luma conversion used by both trackers.
pub fn to_gray(frame: &RgbaImage) -> Result<GrayImage, TrackingError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(TrackingError::EmptyFrame);
    }
    Ok(image::DynamicImage::ImageRgba8(frame.clone()).to_luma8())
}
