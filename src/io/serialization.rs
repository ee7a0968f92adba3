// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Project file serialization and deserialization.
//!
//! Projects are saved in JSON (`.json`, `.jstrack`) or YAML (`.yaml`,
//! `.yml`) inside a `meta`/`project` envelope. Legacy files (version 0) have
//! no envelope and no persisted axes rotation. Track hidden flags are only
//! honoured from version 0.3 on.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::axes::Axes;
use crate::models::frame::FrameIndex;
use crate::models::project::{Project, ProjectError, VideoInfo};
use crate::models::scale::{Scale, ScaleRecord};
use crate::models::track::{Track, TrackId};
use crate::util::geometry::Coordinate;

pub const APP_VERSION: f64 = 0.1;
pub const FILE_VERSION: f64 = 0.3;
pub const CREATED_WITH: &str = concat!("Created with vidtrack ", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("malformed project file: {0}")]
    Malformed(String),
    #[error("project file has no frame rate")]
    MissingFrameRate,
    #[error("unsupported file version {0}")]
    UnsupportedVersion(f64),
    #[error(transparent)]
    Project(#[from] ProjectError),
}

/// On-disk encoding, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") | Some("jstrack") => Some(Format::Json),
            Some("yaml") | Some("yml") => Some(Format::Yaml),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaInfo {
    pub date: String,
    pub created_with: String,
    pub app_version: f64,
    pub file_version: f64,
}

impl MetaInfo {
    pub fn current() -> Self {
        Self {
            date: Local::now().to_rfc2822(),
            created_with: CREATED_WITH.to_string(),
            app_version: APP_VERSION,
            file_version: FILE_VERSION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub meta: MetaInfo,
    pub project: ProjectRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxesPosition {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub rotation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxesRecord {
    pub position: AxesPosition,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub points: BTreeMap<usize, Coordinate>,
    #[serde(default)]
    pub hidden: bool,
}

fn default_speed() -> f64 {
    1.0
}

/// Persisted project state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(default)]
    pub current_frame: usize,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub start_frame: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_frame: Option<usize>,
    #[serde(default)]
    pub video_name: String,
    #[serde(default = "default_speed")]
    pub video_speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<ScaleRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axes: Option<AxesRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_track: Option<TrackId>,
    #[serde(default)]
    pub tracks: BTreeMap<TrackId, TrackRecord>,
}

impl From<&Project> for ProjectRecord {
    fn from(project: &Project) -> Self {
        let tracks = project
            .tracks()
            .map(|track| {
                let record = TrackRecord {
                    name: track.name.clone(),
                    color: track.color.clone(),
                    points: track.points().map(|p| (p.frame.0, p.position())).collect(),
                    hidden: track.is_hidden(),
                };
                (track.uid.clone(), record)
            })
            .collect();
        Self {
            name: project.name.clone(),
            duration: project.timeline.duration(),
            fps: Some(project.timeline.fps()),
            current_frame: project.timeline.current_frame().0,
            uid: project.uid.clone(),
            start_frame: project.timeline.start_frame().0,
            end_frame: Some(project.timeline.end_frame().0),
            video_name: project.video.name.clone(),
            video_speed: project.video_speed,
            scale: project.scale().map(ScaleRecord::from),
            axes: project.axes().map(|axes| AxesRecord {
                position: AxesPosition {
                    x: axes.origin.x,
                    y: axes.origin.y,
                    rotation: axes.rotation(),
                },
                color: axes.color.clone(),
            }),
            active_track: project.active_track_id().cloned(),
            tracks,
        }
    }
}

impl ProjectFile {
    pub fn new(project: &Project) -> Self {
        Self {
            meta: MetaInfo::current(),
            project: ProjectRecord::from(project),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionProbe {
    #[serde(default)]
    file_version: f64,
}

#[derive(Deserialize)]
struct DocumentHeader {
    #[serde(default)]
    meta: Option<VersionProbe>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    project: Option<ProjectRecord>,
}

fn parse<T: DeserializeOwned>(text: &str, format: Format) -> Result<T, LoadError> {
    match format {
        Format::Json => serde_json::from_str(text).map_err(|e| LoadError::Malformed(e.to_string())),
        Format::Yaml => serde_yaml::from_str(text).map_err(|e| LoadError::Malformed(e.to_string())),
    }
}

/// Read the record and file version out of a document. Versioned files
/// keep the record under `project`; legacy files are the record itself.
fn read_document(text: &str, format: Format) -> Result<(ProjectRecord, f64), LoadError> {
    let header: DocumentHeader = parse(text, format)?;
    let version = header.meta.map(|m| m.file_version).unwrap_or(0.0);
    if version > FILE_VERSION {
        return Err(LoadError::UnsupportedVersion(version));
    }
    if version > 0.0 {
        let envelope: Envelope = parse(text, format)?;
        if let Some(record) = envelope.project {
            return Ok((record, version));
        }
    }
    Ok((parse(text, format)?, version))
}

/// Build a project from a record. `video` describes the media the project
/// is opened against; its duration wins over the stored one when known.
pub fn project_from_record(record: ProjectRecord, version: f64, mut video: VideoInfo) -> Result<Project, LoadError> {
    let fps = record.fps.ok_or(LoadError::MissingFrameRate)?;
    if video.duration.is_nan() || video.duration <= 0.0 {
        video.duration = record.duration;
    }
    if video.name.is_empty() {
        video.name = record.video_name.clone();
    }

    let mut project = Project::new(record.name, video, fps)?;
    if !record.uid.is_empty() {
        project.uid = record.uid;
    }
    project.video_speed = record.video_speed;
    let last = project.timeline.frame_count() - 1;
    project.timeline.set_range(
        FrameIndex(record.start_frame),
        FrameIndex(record.end_frame.unwrap_or(last)),
    );

    if let Some(scale) = record.scale {
        let [a, b] = scale.nodes;
        project.set_scale(Some(Scale::new(Some(&scale.size), a, b, scale.color)));
    }
    if let Some(axes) = record.axes {
        let rotation = if version > 0.0 { axes.position.rotation } else { 0.0 };
        project.axes_color = axes.color.clone();
        project.set_axes(Axes::new(
            Coordinate::new(axes.position.x, axes.position.y),
            rotation,
            axes.color,
        ));
    }

    let frame_count = project.timeline.frame_count();
    for (uid, info) in record.tracks {
        let mut track = Track::new(uid, info.name, info.color);
        for (frame, position) in info.points.into_iter().filter(|(f, _)| *f < frame_count) {
            track.insert_point(FrameIndex(frame), position.x, position.y);
        }
        if version > 0.2 && info.hidden {
            track.set_hidden(true);
        }
        project.insert_track(track);
    }

    project.timeline.seek(FrameIndex(record.current_frame));
    project.update();
    if let Some(active) = record.active_track {
        if !project.switch_track(&active) {
            log::warn!("Active track '{}' not found in project file", active);
        }
    }

    project.clear_history();
    project.mark_saved();
    Ok(project)
}

pub fn to_string(project: &Project, format: Format) -> Result<String> {
    let file = ProjectFile::new(project);
    let text = match format {
        Format::Json => serde_json::to_string_pretty(&file)?,
        Format::Yaml => serde_yaml::to_string(&file)?,
    };
    Ok(text)
}

pub fn from_str(text: &str, format: Format, video: VideoInfo) -> Result<Project, LoadError> {
    let (record, version) = read_document(text, format)?;
    project_from_record(record, version, video)
}

/// Save the project and mark it saved.
pub fn save(project: &mut Project, path: &Path) -> Result<()> {
    let format = Format::from_path(path)
        .with_context(|| format!("Unsupported project file extension: {}", path.display()))?;
    let text = to_string(project, format)?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    project.mark_saved();
    log::info!("Saved project to {}", path.display());
    Ok(())
}

pub fn load(path: &Path, video: VideoInfo) -> Result<Project> {
    let format = Format::from_path(path)
        .with_context(|| format!("Unsupported project file extension: {}", path.display()))?;
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let project = from_str(&text, format, video).with_context(|| format!("Failed to load {}", path.display()))?;
    log::info!("Loaded project '{}' from {}", project.name, path.display());
    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video() -> VideoInfo {
        VideoInfo {
            name: "clip.mp4".to_string(),
            width: 320,
            height: 240,
            duration: 4.0,
        }
    }

    fn sample() -> Project {
        let mut p = Project::new("Pendulum", video(), 25.0).unwrap();
        p.new_scale(Some("50 cm"), Coordinate::new(0.0, 0.0), Coordinate::new(100.0, 0.0), "#39ff14");
        p.new_axes(40.0, 60.0, "#4169e1", true);
        p.rotate_axes(0.25).unwrap();
        let bob = p.new_track("Bob", "#ff0000", true);
        for f in 0..10 {
            p.add_point(FrameIndex(f), 40.0 + f as f64, 60.5).unwrap();
        }
        let pivot = p.new_track("Pivot", "#00ff00", false);
        p.add_point_to(&pivot, FrameIndex(3), 1.0, 2.0).unwrap();
        p.set_track_hidden(&pivot, true).unwrap();
        p.select_track(&bob);
        p.timeline.set_range(FrameIndex(2), FrameIndex(80));
        p.timeline.seek(FrameIndex(5));
        p.update();
        p
    }

    #[test]
    fn test_round_trip_json_and_yaml() {
        let original = sample();
        let expected = ProjectRecord::from(&original);
        for format in [Format::Json, Format::Yaml] {
            let text = to_string(&original, format).unwrap();
            let loaded = from_str(&text, format, video()).unwrap();
            assert_eq!(ProjectRecord::from(&loaded), expected);
            assert!(loaded.is_saved());
            assert!(!loaded.history().can_undo());
        }
    }

    #[test]
    fn test_envelope_fields() {
        let text = to_string(&sample(), Format::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["meta"]["fileVersion"], 0.3);
        assert_eq!(value["project"]["videoName"], "clip.mp4");
        assert_eq!(value["project"]["axes"]["position"]["rotation"], 0.25);
        assert_eq!(value["project"]["scale"]["size"], "50 cm");
        assert!(value["project"]["tracks"].as_object().unwrap().len() == 2);
    }

    #[test]
    fn test_legacy_version_ignores_rotation_and_hidden() {
        let text = r##"{
            "name": "Old",
            "fps": 10,
            "uid": "abc",
            "axes": {"position": {"x": 5, "y": 6, "rotation": 1.0}, "color": "#ffffff"},
            "tracks": {"t1": {"name": "A", "color": "#f00", "points": {"0": {"x": 1, "y": 2}, "999": {"x": 0, "y": 0}}, "hidden": true}},
            "activeTrack": "t1"
        }"##;
        let p = from_str(text, Format::Json, video()).unwrap();
        assert_eq!(p.uid, "abc");
        assert_eq!(p.axes().unwrap().rotation(), 0.0);
        let track = p.track(&TrackId::from("t1")).unwrap();
        assert!(!track.is_hidden());
        assert_eq!(track.len(), 1);
        assert_eq!(p.active_track_id(), Some(&TrackId::from("t1")));
    }

    #[test]
    fn test_version_02_ignores_hidden() {
        let text = r##"{
            "meta": {"date": "", "createdWith": "", "appVersion": 0.1, "fileVersion": 0.2},
            "project": {
                "fps": 10,
                "axes": {"position": {"x": 5, "y": 6, "rotation": 1.0}, "color": "#ffffff"},
                "tracks": {"t1": {"name": "A", "color": "#f00", "points": {}, "hidden": true}}
            }
        }"##;
        let p = from_str(text, Format::Json, video()).unwrap();
        assert_eq!(p.axes().unwrap().rotation(), 1.0);
        assert!(!p.track(&TrackId::from("t1")).unwrap().is_hidden());
    }

    #[test]
    fn test_load_failures() {
        assert_eq!(
            from_str(r#"{"name": "x"}"#, Format::Json, video()).err(),
            Some(LoadError::MissingFrameRate)
        );
        assert!(matches!(
            from_str("{not json", Format::Json, video()),
            Err(LoadError::Malformed(_))
        ));
        assert!(matches!(
            from_str(r#"{"fps": 10, "tracks": {"t": {"name": 4}}}"#, Format::Json, video()),
            Err(LoadError::Malformed(_))
        ));
        assert_eq!(
            from_str(r#"{"meta": {"fileVersion": 9}, "project": {"fps": 10}}"#, Format::Json, video()).err(),
            Some(LoadError::UnsupportedVersion(9.0))
        );
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = std::env::temp_dir().join(format!("vidtrack-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("project.yaml");

        let mut project = sample();
        assert!(!project.is_saved());
        save(&mut project, &path).unwrap();
        assert!(project.is_saved());

        let loaded = load(&path, video()).unwrap();
        assert_eq!(ProjectRecord::from(&loaded), ProjectRecord::from(&project));
        assert!(load(&dir.join("project.txt"), video()).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
