// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Typed parsing of submitted dialog fields.
//!
//! Dialogs hand back a flat map of field name to raw text. Nothing in it is
//! trusted: every value is parsed and range-checked here before it reaches
//! the project.

use std::collections::BTreeMap;
use std::str::FromStr;

use thiserror::Error;

use crate::models::frame::FrameIndex;
use crate::models::timeline::Timeline;
use crate::tracking::{Algorithm, Roi, TrackingConfig};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormError {
    #[error("field '{0}' is required")]
    Missing(String),
    #[error("field '{field}' is not a number: '{value}'")]
    NotANumber { field: String, value: String },
    #[error("field '{field}' is out of range: {value}")]
    OutOfRange { field: String, value: String },
    #[error("start frame {start} must be before end frame {end}")]
    InvalidRange { start: usize, end: usize },
    #[error("field '{field}' is not a color: '{value}'")]
    InvalidColor { field: String, value: String },
    #[error("field '{field}' has an unknown value: '{value}'")]
    UnknownChoice { field: String, value: String },
}

/// Raw field values keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData(BTreeMap<String, String>);

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<String>) {
        self.0.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Trimmed, non-empty text.
    pub fn text(&self, field: &str) -> Result<String, FormError> {
        match self.get(field).map(str::trim) {
            Some(value) if !value.is_empty() => Ok(value.to_string()),
            _ => Err(FormError::Missing(field.to_string())),
        }
    }

    fn parse<T: FromStr>(&self, field: &str) -> Result<T, FormError> {
        let value = self.text(field)?;
        value.parse().map_err(|_| FormError::NotANumber {
            field: field.to_string(),
            value,
        })
    }

    /// A finite number strictly greater than zero.
    pub fn positive(&self, field: &str) -> Result<f64, FormError> {
        let value: f64 = self.parse(field)?;
        if value.is_finite() && value > 0.0 {
            Ok(value)
        } else {
            Err(FormError::OutOfRange {
                field: field.to_string(),
                value: value.to_string(),
            })
        }
    }

    /// A non-negative integer.
    pub fn count(&self, field: &str) -> Result<usize, FormError> {
        self.parse(field)
    }

    /// An integer of at least one.
    pub fn count_at_least_one(&self, field: &str) -> Result<usize, FormError> {
        let value = self.count(field)?;
        if value == 0 {
            return Err(FormError::OutOfRange {
                field: field.to_string(),
                value: value.to_string(),
            });
        }
        Ok(value)
    }

    /// A `#rgb` or `#rrggbb` color, lowercased.
    pub fn color(&self, field: &str) -> Result<String, FormError> {
        let value = self.text(field)?;
        if is_color(&value) {
            Ok(value.to_ascii_lowercase())
        } else {
            Err(FormError::InvalidColor {
                field: field.to_string(),
                value,
            })
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

pub fn is_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Settings chosen when a video is first opened.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProjectForm {
    pub name: String,
    pub framerate: f64,
    pub frame_skip: usize,
    pub video_speed: f64,
    pub axes_color: String,
    pub points_forward: usize,
    pub points_backward: usize,
}

impl NewProjectForm {
    pub fn parse(data: &FormData) -> Result<Self, FormError> {
        Ok(Self {
            name: data.text("name")?,
            framerate: data.positive("framerate")?,
            frame_skip: data.count_at_least_one("frameskip")?,
            video_speed: data.positive("videospeed")?,
            axes_color: data.color("axesColor")?,
            points_forward: data.count("pointsForward")?,
            points_backward: data.count("pointsBackward")?,
        })
    }
}

/// Project settings that can change after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct EditProjectForm {
    pub name: String,
    pub frame_skip: usize,
    pub axes_color: String,
    pub points_forward: usize,
    pub points_backward: usize,
}

impl EditProjectForm {
    pub fn parse(data: &FormData) -> Result<Self, FormError> {
        Ok(Self {
            name: data.text("name")?,
            frame_skip: data.count_at_least_one("frameskip")?,
            axes_color: data.color("axesColor")?,
            points_forward: data.count("pointsForward")?,
            points_backward: data.count("pointsBackward")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackForm {
    pub name: String,
    pub color: String,
}

impl TrackForm {
    pub fn parse(data: &FormData) -> Result<Self, FormError> {
        Ok(Self {
            name: data.text("name")?,
            color: data.color("color")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleForm {
    pub color: String,
}

impl ScaleForm {
    pub fn parse(data: &FormData) -> Result<Self, FormError> {
        Ok(Self {
            color: data.color("color")?,
        })
    }
}

/// Auto-tracking parameters. Margin and refresh interval fall back to the
/// tracker defaults when left blank.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoTrackForm {
    pub algorithm: Algorithm,
    pub start_frame: FrameIndex,
    pub end_frame: FrameIndex,
    pub search_margin: u32,
    pub template_update_interval: u32,
}

impl AutoTrackForm {
    /// Parse against a timeline of `frame_count` frames.
    pub fn parse(data: &FormData, frame_count: usize) -> Result<Self, FormError> {
        let algorithm = match data.get("algorithm").map(str::trim) {
            None | Some("") => Algorithm::default(),
            Some(value) => value.parse().map_err(|_| FormError::UnknownChoice {
                field: "algorithm".to_string(),
                value: value.to_string(),
            })?,
        };
        let start = data.count("startFrame")?;
        let end = data.count("endFrame")?;
        if end >= frame_count {
            return Err(FormError::OutOfRange {
                field: "endFrame".to_string(),
                value: end.to_string(),
            });
        }
        if end <= start {
            return Err(FormError::InvalidRange { start, end });
        }
        Ok(Self {
            algorithm,
            start_frame: FrameIndex(start),
            end_frame: FrameIndex(end),
            search_margin: optional_u32(data, "searchMargin", TrackingConfig::DEFAULT_SEARCH_MARGIN)?,
            template_update_interval: optional_u32(
                data,
                "templateUpdateInterval",
                TrackingConfig::DEFAULT_TEMPLATE_UPDATE_INTERVAL,
            )?,
        })
    }

    pub fn to_config(&self, timeline: &Timeline, roi: Roi) -> TrackingConfig {
        TrackingConfig {
            search_margin: self.search_margin,
            template_update_interval: self.template_update_interval,
            ..TrackingConfig::for_timeline(timeline, roi, self.start_frame, self.end_frame, self.algorithm)
        }
    }
}

fn optional_u32(data: &FormData, field: &str, default: u32) -> Result<u32, FormError> {
    match data.get(field).map(str::trim) {
        None | Some("") => Ok(default),
        Some(_) => data.parse(field),
    }
}
