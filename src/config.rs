// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Application settings.
//!
//! Every field has a default, so a settings file only needs the keys it
//! changes. Files are YAML or JSON, chosen by extension.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::io::form::is_color;
use crate::models::project::{ViewPoints, DEFAULT_AXES_COLOR, DEFAULT_SCALE_COLOR};
use crate::tracking::session::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::tracking::{Algorithm, TrackingConfig};

/// Environment variable naming a settings file.
pub const CONFIG_ENV: &str = "VIDTRACK_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TrackingSettings {
    pub algorithm: Algorithm,
    pub search_margin: u32,
    pub template_update_interval: u32,
    /// Results below this confidence stop the run.
    pub confidence_threshold: f64,
    pub seek_timeout_ms: u64,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            search_margin: TrackingConfig::DEFAULT_SEARCH_MARGIN,
            template_update_interval: TrackingConfig::DEFAULT_TEMPLATE_UPDATE_INTERVAL,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            seek_timeout_ms: TrackingConfig::DEFAULT_SEEK_TIMEOUT.as_millis() as u64,
        }
    }
}

impl TrackingSettings {
    pub fn seek_timeout(&self) -> Duration {
        Duration::from_millis(self.seek_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tracking: TrackingSettings,
    pub play_interval_ms: u64,
    pub points_forward: usize,
    pub points_backward: usize,
    pub axes_color: String,
    pub scale_color: String,
    /// Colors handed out to new tracks, in order.
    pub track_palette: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let view = ViewPoints::default();
        Self {
            tracking: TrackingSettings::default(),
            play_interval_ms: 200,
            points_forward: view.forward,
            points_backward: view.backward,
            axes_color: DEFAULT_AXES_COLOR.to_string(),
            scale_color: DEFAULT_SCALE_COLOR.to_string(),
            track_palette: ["#ff0000", "#ffa500", "#ffff00", "#00ffff", "#ff00ff", "#ffffff"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

impl Settings {
    pub fn play_interval(&self) -> Duration {
        Duration::from_millis(self.play_interval_ms)
    }

    pub fn view_points(&self) -> ViewPoints {
        ViewPoints {
            forward: self.points_forward,
            backward: self.points_backward,
        }
    }

    /// Palette color for the `index`-th track.
    pub fn track_color(&self, index: usize) -> &str {
        if self.track_palette.is_empty() {
            return "#ff0000";
        }
        &self.track_palette[index % self.track_palette.len()]
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.tracking.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            bail!("confidence_threshold must be within [0, 1], got {}", threshold);
        }
        if self.tracking.seek_timeout_ms == 0 {
            bail!("seek_timeout_ms must be positive");
        }
        if self.play_interval_ms == 0 {
            bail!("play_interval_ms must be positive");
        }
        for color in [&self.axes_color, &self.scale_color].into_iter().chain(&self.track_palette) {
            if !is_color(color) {
                bail!("'{}' is not a #rgb or #rrggbb color", color);
            }
        }
        Ok(())
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(text).context("Invalid YAML settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(text).context("Invalid JSON settings")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from a file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&text),
            Some("json") => Self::from_json(&text),
            _ => bail!("Unsupported settings file: {}", path.display()),
        }
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Load from the file named by `VIDTRACK_CONFIG`, or the defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.tracking.search_margin, 20);
        assert_eq!(settings.tracking.template_update_interval, 10);
        assert_eq!(settings.tracking.confidence_threshold, 0.5);
        assert_eq!(settings.tracking.seek_timeout(), Duration::from_secs(5));
        assert_eq!(settings.play_interval(), Duration::from_millis(200));
        assert_eq!(settings.view_points(), ViewPoints { forward: 0, backward: 7 });
        assert_eq!(settings.axes_color, "#4169e1");
    }

    #[test]
    fn test_partial_yaml() {
        let settings = Settings::from_yaml(
            "tracking:\n  algorithm: optical-flow\n  search_margin: 32\npoints_backward: 3\n",
        )
        .unwrap();
        assert_eq!(settings.tracking.algorithm, Algorithm::OpticalFlow);
        assert_eq!(settings.tracking.search_margin, 32);
        assert_eq!(settings.tracking.template_update_interval, 10);
        assert_eq!(settings.points_backward, 3);
        assert_eq!(settings.scale_color, "#39ff14");
    }

    #[test]
    fn test_json_and_validation() {
        let settings = Settings::from_json(r##"{"track_palette": ["#123", "#abcdef"]}"##).unwrap();
        assert_eq!(settings.track_color(3), "#abcdef");

        assert!(Settings::from_json(r#"{"tracking": {"confidence_threshold": 1.5}}"#).is_err());
        assert!(Settings::from_json(r#"{"play_interval_ms": 0}"#).is_err());
        assert!(Settings::from_json(r#"{"axes_color": "blue"}"#).is_err());
        assert!(Settings::from_yaml("tracking: [1, 2]").is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let settings = Settings::load(Path::new("/nonexistent/vidtrack.yaml")).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
