// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Project state management.
//!
//! [`Project`] is the single aggregate that owns the timeline, tracks, axes,
//! scale, viewport and undo log. Every user-level mutation goes through it
//! so that each one records exactly one undo entry and fires its events.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, Utc};
use thiserror::Error;

use super::axes::Axes;
use super::events::{EventBus, ProjectEvent};
use super::frame::FrameIndex;
use super::history::{Action, Command, UndoLog};
use super::scale::{Scale, ScaleSize};
use super::timeline::{Timeline, TimelineError};
use super::track::{Point, PointId, Track, TrackId};
use crate::io::form::{EditProjectForm, NewProjectForm, ScaleForm, TrackForm};
use crate::tracking::TrackingResult;
use crate::util::coords::{CoordinateMapper, Viewport};
use crate::util::geometry::{round_sig, round_to, Coordinate};
use crate::util::units::UnitError;

pub const DEFAULT_AXES_COLOR: &str = "#4169e1";
pub const DEFAULT_SCALE_COLOR: &str = "#39ff14";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectError {
    #[error("no track is active")]
    NoActiveTrack,
    #[error("unknown track '{0}'")]
    UnknownTrack(TrackId),
    #[error("frame {0} is not on the timeline")]
    FrameOutOfRange(FrameIndex),
    #[error("the project has no axes")]
    NoAxes,
    #[error("the project has no scale")]
    NoScale,
    #[error(transparent)]
    Unit(#[from] UnitError),
    #[error(transparent)]
    Timeline(#[from] TimelineError),
}

/// The loaded video.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VideoInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Seconds.
    pub duration: f64,
}

/// How many frame-skip steps of points are shown around the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewPoints {
    pub forward: usize,
    pub backward: usize,
}

impl Default for ViewPoints {
    fn default() -> Self {
        Self {
            forward: 0,
            backward: 7,
        }
    }
}

/// What [`Project::add_point`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointEdit {
    Created,
    Moved { from: Coordinate },
}

/// A point that should be drawn at the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VisiblePoint {
    pub track: TrackId,
    pub color: String,
    pub point: Point,
    /// Whether the point belongs to the active track.
    pub active: bool,
}

/// Display-space positions of every overlay, computed in one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLayout {
    pub axes: Option<AxesOverlay>,
    pub scale: Option<ScaleOverlay>,
    pub points: Vec<PointOverlay>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxesOverlay {
    pub origin: Coordinate,
    pub rotation: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleOverlay {
    pub endpoints: [Coordinate; 2],
    pub text: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointOverlay {
    pub track: TrackId,
    pub frame: FrameIndex,
    pub position: Coordinate,
    pub color: String,
    pub selected: bool,
    pub emphasized: bool,
    pub active: bool,
}

/// One exported sample of a track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportRow {
    pub frame: FrameIndex,
    /// Seconds since the start of the trim range, scaled by video speed.
    pub t: f64,
    /// Position in the axes frame, in pixels.
    pub pixels: Coordinate,
    /// Position in the axes frame, in the scale's unit.
    pub scaled: Coordinate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackExport {
    pub name: String,
    /// Unit of the scaled columns.
    pub unit: String,
    pub rows: Vec<ExportRow>,
}

pub struct Project {
    pub name: String,
    pub uid: String,
    pub video: VideoInfo,
    pub timeline: Timeline,
    /// Multiplier applied to exported times (slow-motion footage).
    pub video_speed: f64,
    pub view_points: ViewPoints,
    pub axes_color: String,
    pub events: EventBus<ProjectEvent>,
    tracks: BTreeMap<TrackId, Track>,
    deleted_tracks: BTreeMap<TrackId, Track>,
    active_track: Option<TrackId>,
    axes_list: Vec<Axes>,
    active_axes: Option<usize>,
    scale: Option<Scale>,
    viewport: Viewport,
    history: UndoLog<Project>,
    unsaved_untracked: bool,
    unbacked_untracked: bool,
    backup_date: Option<DateTime<Local>>,
    next_track: u64,
}

fn generate_uid() -> String {
    format!("{:x}", Utc::now().timestamp_micros())
}

/// Drop a tombstoned point once the only command able to restore it is gone.
fn forget_point(uid: TrackId, frame: FrameIndex, id: PointId) -> impl Fn(&mut Project) + 'static {
    move |p: &mut Project| {
        if let Some(track) = p.any_track_mut(&uid) {
            track.forget(frame, id);
        }
    }
}

impl Project {
    pub fn new(name: impl Into<String>, video: VideoInfo, fps: f64) -> Result<Self, ProjectError> {
        let timeline = Timeline::new(video.duration, fps)?;
        log::info!(
            "New project: {}x{}, {:.3}s, {} frames",
            video.width,
            video.height,
            timeline.duration(),
            timeline.frame_count()
        );
        Ok(Self {
            name: name.into(),
            uid: generate_uid(),
            video,
            timeline,
            video_speed: 1.0,
            view_points: ViewPoints::default(),
            axes_color: DEFAULT_AXES_COLOR.to_string(),
            events: EventBus::new(),
            tracks: BTreeMap::new(),
            deleted_tracks: BTreeMap::new(),
            active_track: None,
            axes_list: Vec::new(),
            active_axes: None,
            scale: None,
            viewport: Viewport::default(),
            history: UndoLog::new(),
            unsaved_untracked: false,
            unbacked_untracked: false,
            backup_date: None,
            next_track: 0,
        })
    }

    // ----- history -----

    /// Push a command whose effect has already been applied.
    fn record(&mut self, command: Command<Project>) {
        if self.history.is_replaying() {
            return;
        }
        log::debug!("Recorded '{}'", command.label);
        let discarded = self.history.push(command);
        if !discarded.is_empty() {
            log::debug!("Dropped {} redo entries", discarded.len());
        }
        for discard in discarded.iter().filter_map(Command::discard_action) {
            discard(self);
        }
        self.events.emit(&ProjectEvent::Change);
    }

    fn replay(&mut self, action: Action<Project>) {
        self.history.set_replaying(true);
        action(self);
        self.history.set_replaying(false);
    }

    pub fn undo(&mut self) -> bool {
        let Some(command) = self.history.step_back() else {
            return false;
        };
        log::info!("Undo {}", command.label);
        self.replay(command.undo_action());
        self.emphasize_current();
        if !self.is_saved() || !self.is_backed_up() {
            self.events.emit(&ProjectEvent::Change);
        }
        self.events.emit(&ProjectEvent::Undo);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(command) = self.history.step_forward() else {
            return false;
        };
        log::info!("Redo {}", command.label);
        self.replay(command.redo_action());
        self.emphasize_current();
        if !self.is_saved() || !self.is_backed_up() {
            self.events.emit(&ProjectEvent::Change);
        }
        self.events.emit(&ProjectEvent::Redo);
        true
    }

    pub fn history(&self) -> &UndoLog<Project> {
        &self.history
    }

    /// Forget every recorded command, e.g. after loading.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Mark a change that has no undo entry.
    pub fn changed(&mut self) {
        self.unsaved_untracked = true;
        self.unbacked_untracked = true;
        self.events.emit(&ProjectEvent::Change);
    }

    pub fn mark_saved(&mut self) {
        self.history.mark_saved();
        self.unsaved_untracked = false;
        self.events.emit(&ProjectEvent::Saved);
    }

    pub fn backup(&mut self) {
        self.history.mark_backed_up();
        self.unbacked_untracked = false;
        self.backup_date = Some(Local::now());
        self.events.emit(&ProjectEvent::BackedUp);
    }

    pub fn is_saved(&self) -> bool {
        self.history.at_save_point() && !self.unsaved_untracked
    }

    pub fn is_backed_up(&self) -> bool {
        self.history.at_backup_point() && !self.unbacked_untracked
    }

    pub fn backup_date(&self) -> Option<DateTime<Local>> {
        self.backup_date
    }

    // ----- tracks -----

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn track(&self, uid: &TrackId) -> Option<&Track> {
        self.tracks.get(uid)
    }

    /// Live or deleted track.
    fn any_track_mut(&mut self, uid: &TrackId) -> Option<&mut Track> {
        match self.tracks.get_mut(uid) {
            Some(track) => Some(track),
            None => self.deleted_tracks.get_mut(uid),
        }
    }

    pub fn active_track_id(&self) -> Option<&TrackId> {
        self.active_track.as_ref()
    }

    pub fn active_track(&self) -> Option<&Track> {
        self.active_track.as_ref().and_then(|uid| self.tracks.get(uid))
    }

    fn unused_track_uid(&mut self) -> TrackId {
        loop {
            self.next_track += 1;
            let uid = TrackId(format!("{}-{}", self.uid, self.next_track));
            if !self.tracks.contains_key(&uid) && !self.deleted_tracks.contains_key(&uid) {
                return uid;
            }
        }
    }

    /// Create a track. Undo deletes it again.
    pub fn new_track(&mut self, name: impl Into<String>, color: impl Into<String>, make_default: bool) -> TrackId {
        let uid = self.unused_track_uid();
        let mut track = Track::new(uid.clone(), name, color);
        if self.scale.is_some() {
            track.unit = self.scale_unit();
        }
        self.tracks.insert(uid.clone(), track);

        let previous = self.active_track.clone();
        let (undo_uid, redo_uid) = (uid.clone(), uid.clone());
        self.record(Command::new(
            "new track",
            move |p: &mut Project| {
                p.detach_track(&undo_uid);
                if make_default {
                    p.restore_active(previous.as_ref());
                }
            },
            move |p: &mut Project| {
                p.attach_track(&redo_uid);
                if make_default {
                    p.switch_track(&redo_uid);
                }
            },
        ));
        if make_default {
            self.switch_track(&uid);
        }
        log::info!("Created track {}", uid);
        self.events.emit(&ProjectEvent::NewTrack(uid.clone()));
        uid
    }

    /// Insert a fully built track without recording history (loading).
    pub fn insert_track(&mut self, mut track: Track) {
        track.unit = self.scale_unit();
        let uid = track.uid.clone();
        self.deleted_tracks.remove(&uid);
        self.tracks.insert(uid.clone(), track);
        self.events.emit(&ProjectEvent::NewTrack(uid));
    }

    fn detach_track(&mut self, uid: &TrackId) -> bool {
        let Some(mut track) = self.tracks.remove(uid) else {
            return false;
        };
        track.unselect_all();
        track.unemphasize_all();
        if self.active_track.as_ref() == Some(uid) {
            self.active_track = None;
        }
        self.deleted_tracks.insert(uid.clone(), track);
        self.events.emit(&ProjectEvent::DeleteTrack(uid.clone()));
        true
    }

    /// Delete a track. Its points stay with it so undo can bring it back.
    pub fn delete_track(&mut self, uid: &TrackId) -> bool {
        let previous = self.active_track.clone();
        if !self.detach_track(uid) {
            return false;
        }
        let (undo_uid, redo_uid) = (uid.clone(), uid.clone());
        self.record(Command::new(
            "delete track",
            move |p: &mut Project| {
                p.attach_track(&undo_uid);
                p.restore_active(previous.as_ref());
            },
            move |p: &mut Project| {
                p.detach_track(&redo_uid);
            },
        ));
        true
    }

    fn attach_track(&mut self, uid: &TrackId) -> bool {
        let Some(track) = self.deleted_tracks.remove(uid) else {
            return false;
        };
        self.tracks.insert(uid.clone(), track);
        self.events.emit(&ProjectEvent::UndeleteTrack(uid.clone()));
        true
    }

    /// Restore a deleted track and make it active.
    pub fn undelete_track(&mut self, uid: &TrackId) -> bool {
        self.attach_track(uid) && self.switch_track(uid)
    }

    fn restore_active(&mut self, previous: Option<&TrackId>) {
        match previous {
            Some(uid) => {
                self.switch_track(uid);
            }
            None => {
                if let Some(current) = self.active_track.take() {
                    if let Some(track) = self.tracks.get_mut(&current) {
                        track.unselect_all();
                        track.unemphasize_all();
                    }
                }
            }
        }
    }

    /// Make `uid` the active track without recording history.
    pub fn switch_track(&mut self, uid: &TrackId) -> bool {
        if !self.tracks.contains_key(uid) {
            return false;
        }
        if let Some(old) = self.active_track.take() {
            if let Some(track) = self.tracks.get_mut(&old) {
                track.unselect_all();
                track.unemphasize_all();
            }
        }
        let current = self.timeline.current_frame();
        if let Some(track) = self.tracks.get_mut(uid) {
            track.emphasize(current);
        }
        self.active_track = Some(uid.clone());
        self.events.emit(&ProjectEvent::SwitchTrack(uid.clone()));
        true
    }

    /// Switch the active track as an undoable user action.
    pub fn select_track(&mut self, uid: &TrackId) -> bool {
        let previous = self.active_track.clone();
        if previous.as_ref() == Some(uid) || !self.switch_track(uid) {
            return false;
        }
        let next = uid.clone();
        self.record(Command::new(
            "switch track",
            move |p: &mut Project| p.restore_active(previous.as_ref()),
            move |p: &mut Project| {
                p.switch_track(&next);
            },
        ));
        true
    }

    fn apply_hidden(&mut self, uid: &TrackId, hidden: bool) {
        if let Some(track) = self.any_track_mut(uid) {
            track.set_hidden(hidden);
            self.events.emit(&ProjectEvent::TrackHidden {
                track: uid.clone(),
                hidden,
            });
        }
    }

    pub fn set_track_hidden(&mut self, uid: &TrackId, hidden: bool) -> Result<(), ProjectError> {
        let track = self
            .tracks
            .get(uid)
            .ok_or_else(|| ProjectError::UnknownTrack(uid.clone()))?;
        if track.is_hidden() == hidden {
            return Ok(());
        }
        self.apply_hidden(uid, hidden);
        let (undo_uid, redo_uid) = (uid.clone(), uid.clone());
        self.record(Command::new(
            if hidden { "hide track" } else { "show track" },
            move |p: &mut Project| p.apply_hidden(&undo_uid, !hidden),
            move |p: &mut Project| p.apply_hidden(&redo_uid, hidden),
        ));
        Ok(())
    }

    fn apply_track_details(&mut self, uid: &TrackId, name: &str, color: &str) {
        if let Some(track) = self.any_track_mut(uid) {
            track.name = name.to_string();
            track.color = color.to_string();
            self.events.emit(&ProjectEvent::TrackEdited(uid.clone()));
        }
    }

    /// Rename and recolor a track from submitted form data.
    pub fn edit_track(&mut self, uid: &TrackId, form: &TrackForm) -> Result<(), ProjectError> {
        let track = self
            .tracks
            .get(uid)
            .ok_or_else(|| ProjectError::UnknownTrack(uid.clone()))?;
        let (old_name, old_color) = (track.name.clone(), track.color.clone());
        if old_name == form.name && old_color == form.color {
            return Ok(());
        }
        self.apply_track_details(uid, &form.name, &form.color);
        let (undo_uid, redo_uid) = (uid.clone(), uid.clone());
        let (new_name, new_color) = (form.name.clone(), form.color.clone());
        self.record(Command::new(
            "edit track",
            move |p: &mut Project| p.apply_track_details(&undo_uid, &old_name, &old_color),
            move |p: &mut Project| p.apply_track_details(&redo_uid, &new_name, &new_color),
        ));
        Ok(())
    }

    // ----- points -----

    /// Place a point on the active track at `frame`. When the track already
    /// has a point there it is moved instead, so a track never holds two
    /// points for one frame. Either branch records one undo entry.
    pub fn add_point(&mut self, frame: FrameIndex, x: f64, y: f64) -> Result<PointEdit, ProjectError> {
        let uid = self.active_track.clone().ok_or(ProjectError::NoActiveTrack)?;
        self.add_point_to(&uid, frame, x, y)
    }

    pub fn add_point_to(&mut self, uid: &TrackId, frame: FrameIndex, x: f64, y: f64) -> Result<PointEdit, ProjectError> {
        if self.timeline.frame(frame).is_none() {
            return Err(ProjectError::FrameOutOfRange(frame));
        }
        let emphasize = frame == self.timeline.current_frame() && self.active_track.as_ref() == Some(uid);
        let track = self
            .tracks
            .get_mut(uid)
            .ok_or_else(|| ProjectError::UnknownTrack(uid.clone()))?;

        if let Some(from) = track.move_point(frame, x, y) {
            track.select(frame);
            let to = Coordinate::new(x, y);
            let (undo_uid, redo_uid) = (uid.clone(), uid.clone());
            self.record(Command::new(
                "move point",
                move |p: &mut Project| p.apply_move(&undo_uid, frame, from),
                move |p: &mut Project| p.apply_move(&redo_uid, frame, to),
            ));
            log::debug!("Moved point of {} at frame {} to ({:.2}, {:.2})", uid, frame, x, y);
            self.events.emit(&ProjectEvent::PointMoved {
                track: uid.clone(),
                frame,
            });
            return Ok(PointEdit::Moved { from });
        }

        let id = track.insert_point(frame, x, y);
        track.select(frame);
        if emphasize {
            track.emphasize(frame);
        }
        let (undo_uid, redo_uid) = (uid.clone(), uid.clone());
        self.record(Command::new(
            "add point",
            move |p: &mut Project| {
                if let Some(track) = p.any_track_mut(&undo_uid) {
                    track.remove_point(frame);
                }
                p.events.emit(&ProjectEvent::PointRemoved {
                    track: undo_uid.clone(),
                    frame,
                });
            },
            move |p: &mut Project| {
                if let Some(track) = p.any_track_mut(&redo_uid) {
                    track.unremove(frame, id);
                }
                p.events.emit(&ProjectEvent::PointRestored {
                    track: redo_uid.clone(),
                    frame,
                });
            },
        ).on_discard(forget_point(uid.clone(), frame, id)));
        log::info!("Added point to {} at frame {}", uid, frame);
        self.events.emit(&ProjectEvent::NewPoint {
            track: uid.clone(),
            frame,
        });
        Ok(PointEdit::Created)
    }

    fn apply_move(&mut self, uid: &TrackId, frame: FrameIndex, to: Coordinate) {
        if let Some(track) = self.any_track_mut(uid) {
            track.move_point(frame, to.x, to.y);
        }
        self.events.emit(&ProjectEvent::PointMoved {
            track: uid.clone(),
            frame,
        });
    }

    /// Soft-delete the active track's point at `frame`.
    pub fn remove_point(&mut self, frame: FrameIndex) -> Result<bool, ProjectError> {
        let uid = self.active_track.clone().ok_or(ProjectError::NoActiveTrack)?;
        let track = self
            .tracks
            .get_mut(&uid)
            .ok_or_else(|| ProjectError::UnknownTrack(uid.clone()))?;
        let Some(id) = track.remove_point(frame) else {
            return Ok(false);
        };
        let (undo_uid, redo_uid) = (uid.clone(), uid.clone());
        self.record(Command::new(
            "remove point",
            move |p: &mut Project| {
                if let Some(track) = p.any_track_mut(&undo_uid) {
                    track.unremove(frame, id);
                }
                p.events.emit(&ProjectEvent::PointRestored {
                    track: undo_uid.clone(),
                    frame,
                });
            },
            move |p: &mut Project| {
                if let Some(track) = p.any_track_mut(&redo_uid) {
                    track.remove_point(frame);
                }
                p.events.emit(&ProjectEvent::PointRemoved {
                    track: redo_uid.clone(),
                    frame,
                });
            },
        ));
        self.events.emit(&ProjectEvent::PointRemoved { track: uid, frame });
        Ok(true)
    }

    /// Select a point of the active track (deselects the others).
    pub fn select_point(&mut self, frame: FrameIndex) -> bool {
        let Some(uid) = self.active_track.clone() else {
            return false;
        };
        self.tracks.get_mut(&uid).is_some_and(|t| t.select(frame))
    }

    // ----- axes -----

    pub fn axes(&self) -> Option<&Axes> {
        self.active_axes.and_then(|i| self.axes_list.get(i))
    }

    fn axes_mut(&mut self) -> Option<&mut Axes> {
        self.active_axes.and_then(|i| self.axes_list.get_mut(i))
    }

    pub fn axes_list(&self) -> &[Axes] {
        &self.axes_list
    }

    /// Add axes at a pixel position. With `make_default` they become the
    /// active axes.
    pub fn new_axes(&mut self, x: f64, y: f64, color: impl Into<String>, make_default: bool) -> usize {
        self.axes_list.push(Axes::new(Coordinate::new(x, y), 0.0, color));
        let index = self.axes_list.len() - 1;
        if make_default {
            let previous = self.active_axes;
            self.active_axes = Some(index);
            self.record(Command::new(
                "new axes",
                move |p: &mut Project| p.active_axes = previous,
                move |p: &mut Project| p.active_axes = Some(index),
            ));
        }
        self.events.emit(&ProjectEvent::AxesCreated);
        index
    }

    /// Replace the active axes without recording history (loading).
    pub fn set_axes(&mut self, axes: Axes) {
        self.axes_list.push(axes);
        self.active_axes = Some(self.axes_list.len() - 1);
        self.events.emit(&ProjectEvent::AxesCreated);
    }

    /// Move the axes origin without recording history (live drag).
    pub fn set_axes_origin(&mut self, to: Coordinate) -> bool {
        let Some(axes) = self.axes_mut() else {
            return false;
        };
        axes.origin = to;
        self.events.emit(&ProjectEvent::AxesMoved);
        true
    }

    /// Rotate the axes without recording history (live drag).
    pub fn set_axes_rotation(&mut self, theta: f64) -> bool {
        let Some(axes) = self.axes_mut() else {
            return false;
        };
        axes.set_rotation(theta);
        self.events.emit(&ProjectEvent::AxesRotated);
        true
    }

    pub fn move_axes(&mut self, to: Coordinate) -> Result<(), ProjectError> {
        let from = self.axes().ok_or(ProjectError::NoAxes)?.origin;
        if from == to {
            return Ok(());
        }
        self.set_axes_origin(to);
        self.record(Command::new(
            "move axes",
            move |p: &mut Project| {
                p.set_axes_origin(from);
            },
            move |p: &mut Project| {
                p.set_axes_origin(to);
            },
        ));
        Ok(())
    }

    pub fn rotate_axes(&mut self, theta: f64) -> Result<(), ProjectError> {
        let from = self.axes().ok_or(ProjectError::NoAxes)?.rotation();
        self.set_axes_rotation(theta);
        let to = self.axes().map(|a| a.rotation()).unwrap_or(from);
        if from == to {
            return Ok(());
        }
        self.record(Command::new(
            "rotate axes",
            move |p: &mut Project| {
                p.set_axes_rotation(from);
            },
            move |p: &mut Project| {
                p.set_axes_rotation(to);
            },
        ));
        Ok(())
    }

    pub fn set_axes_color(&mut self, color: &str) {
        if let Some(axes) = self.axes_mut() {
            axes.color = color.to_string();
        }
        self.axes_color = color.to_string();
        self.changed();
    }

    // ----- scale -----

    pub fn scale(&self) -> Option<&Scale> {
        self.scale.as_ref()
    }

    fn scale_unit(&self) -> String {
        self.scale
            .as_ref()
            .map(|s| s.unit().abbr().to_string())
            .unwrap_or_else(|| "px".to_string())
    }

    fn apply_scale(&mut self, scale: Option<Scale>) {
        let created = scale.is_some();
        self.scale = scale;
        self.refresh_units();
        self.events.emit(&if created {
            ProjectEvent::ScaleCreated
        } else {
            ProjectEvent::ScaleDeleted
        });
    }

    /// Create the scale. Missing or invalid text falls back to `1 m`.
    pub fn new_scale(&mut self, text: Option<&str>, a: Coordinate, b: Coordinate, color: impl Into<String>) {
        let scale = Scale::new(text, a, b, color);
        let previous = self.scale.clone();
        let created = scale.clone();
        self.apply_scale(Some(scale));
        self.record(Command::new(
            "new scale",
            move |p: &mut Project| p.apply_scale(previous.clone()),
            move |p: &mut Project| p.apply_scale(Some(created.clone())),
        ));
    }

    /// Install a scale without recording history (loading).
    pub fn set_scale(&mut self, scale: Option<Scale>) {
        self.apply_scale(scale);
    }

    pub fn delete_scale(&mut self) -> bool {
        let Some(previous) = self.scale.clone() else {
            return false;
        };
        self.apply_scale(None);
        self.record(Command::new(
            "delete scale",
            move |p: &mut Project| p.apply_scale(Some(previous.clone())),
            move |p: &mut Project| p.apply_scale(None),
        ));
        true
    }

    /// Re-parse the scale text. Records history only when the value
    /// changes. Invalid text leaves the scale as it was, so the caller can
    /// redisplay [`Scale::text`].
    pub fn set_scale_text(&mut self, text: &str) -> Result<bool, ProjectError> {
        let scale = self.scale.as_mut().ok_or(ProjectError::NoScale)?;
        let previous = match scale.set_text(text) {
            Ok(Some(previous)) => previous,
            Ok(None) => return Ok(false),
            Err(e) => {
                log::warn!("Rejected scale text '{}': {}", text, e);
                return Err(e.into());
            }
        };
        let current = scale.current_size();
        self.refresh_units();
        self.events.emit(&ProjectEvent::ScaleChanged);
        self.record(Command::new(
            "scale size",
            move |p: &mut Project| p.apply_scale_size(previous.clone()),
            move |p: &mut Project| p.apply_scale_size(current.clone()),
        ));
        Ok(true)
    }

    fn apply_scale_size(&mut self, size: ScaleSize) {
        if let Some(scale) = self.scale.as_mut() {
            scale.apply_size(size);
        }
        self.refresh_units();
        self.events.emit(&ProjectEvent::ScaleChanged);
    }

    /// Move one scale endpoint without recording history (live drag).
    pub fn set_scale_endpoint(&mut self, index: usize, to: Coordinate) -> bool {
        let Some(endpoint) = self.scale.as_mut().and_then(|s| s.endpoints.get_mut(index)) else {
            return false;
        };
        *endpoint = to;
        self.events.emit(&ProjectEvent::ScaleChanged);
        true
    }

    pub fn move_scale_endpoint(&mut self, index: usize, to: Coordinate) -> Result<(), ProjectError> {
        let from = self
            .scale
            .as_ref()
            .and_then(|s| s.endpoints.get(index).copied())
            .ok_or(ProjectError::NoScale)?;
        if from == to {
            return Ok(());
        }
        self.set_scale_endpoint(index, to);
        self.record(Command::new(
            "move scale",
            move |p: &mut Project| {
                p.set_scale_endpoint(index, from);
            },
            move |p: &mut Project| {
                p.set_scale_endpoint(index, to);
            },
        ));
        Ok(())
    }

    pub fn edit_scale(&mut self, form: &ScaleForm) -> Result<(), ProjectError> {
        let scale = self.scale.as_mut().ok_or(ProjectError::NoScale)?;
        scale.color = form.color.clone();
        self.events.emit(&ProjectEvent::ScaleChanged);
        self.changed();
        Ok(())
    }

    fn refresh_units(&mut self) {
        let unit = self.scale_unit();
        for track in self.tracks.values_mut().chain(self.deleted_tracks.values_mut()) {
            track.unit = unit.clone();
        }
    }

    // ----- timeline and view -----

    /// Apply pending timeline seeks. After a seek the active track's point
    /// at the new frame is emphasized.
    pub fn update(&mut self) -> Option<FrameIndex> {
        let frame = self.timeline.update()?;
        self.emphasize_current();
        Some(frame)
    }

    fn emphasize_current(&mut self) {
        let current = self.timeline.current_frame();
        if let Some(uid) = self.active_track.clone() {
            if let Some(track) = self.tracks.get_mut(&uid) {
                track.unemphasize_all();
                track.emphasize(current);
            }
        }
    }

    /// Advance playback. Call once per UI frame.
    pub fn tick(&mut self, now: std::time::Instant) -> Option<FrameIndex> {
        let frame = self.timeline.tick(now)?;
        self.emphasize_current();
        Some(frame)
    }

    /// Whether a point at `frame` falls inside the visible window around
    /// the current frame and inside the trim range.
    pub fn is_frame_visible(&self, frame: FrameIndex) -> bool {
        if !self.timeline.in_range(frame) {
            return false;
        }
        let skip = self.timeline.frame_skip.max(1);
        let current = self.timeline.current_frame().0;
        let low = current.saturating_sub(self.view_points.backward * skip);
        let high = current + self.view_points.forward * skip;
        frame.0 >= low && frame.0 <= high
    }

    pub fn visible_points(&self) -> Vec<VisiblePoint> {
        let mut visible = Vec::new();
        for track in self.tracks.values().filter(|t| !t.is_hidden()) {
            let active = self.active_track.as_ref() == Some(&track.uid);
            for point in track.points().filter(|p| self.is_frame_visible(p.frame)) {
                visible.push(VisiblePoint {
                    track: track.uid.clone(),
                    color: track.color.clone(),
                    point: point.clone(),
                    active,
                });
            }
        }
        visible
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn mapper(&self) -> CoordinateMapper {
        CoordinateMapper::new(f64::from(self.video.width), f64::from(self.video.height), self.viewport)
    }

    /// Display positions of every overlay under the current viewport.
    pub fn overlay_layout(&self) -> OverlayLayout {
        let mapper = self.mapper();
        let axes = self.axes().map(|axes| AxesOverlay {
            origin: mapper.to_display(axes.origin),
            rotation: axes.rotation(),
            color: axes.color.clone(),
        });
        let scale = self.scale.as_ref().map(|scale| ScaleOverlay {
            endpoints: [
                mapper.to_display(scale.endpoints[0]),
                mapper.to_display(scale.endpoints[1]),
            ],
            text: scale.text().to_string(),
            color: scale.color.clone(),
        });
        let points = self
            .visible_points()
            .into_iter()
            .map(|v| PointOverlay {
                position: mapper.to_display(v.point.position()),
                frame: v.point.frame,
                selected: v.point.selected,
                emphasized: v.point.emphasized,
                track: v.track,
                color: v.color,
                active: v.active,
            })
            .collect();
        OverlayLayout { axes, scale, points }
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.viewport.set_zoom(zoom);
        self.events.emit(&ProjectEvent::ViewportChanged);
    }

    /// Multiply the zoom, keeping the video pixel under `anchor` (a display
    /// position) where it is.
    pub fn zoom_at(&mut self, anchor: Coordinate, factor: f64) {
        let pixel = self.mapper().to_pixel(anchor);
        self.viewport.set_zoom(self.viewport.zoom * factor);
        let scale = self.viewport.effective_scale();
        self.viewport
            .set_pan(anchor.x - pixel.x * scale, anchor.y - pixel.y * scale);
        self.events.emit(&ProjectEvent::ViewportChanged);
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.viewport.pan_by(dx, dy);
        self.events.emit(&ProjectEvent::ViewportChanged);
    }

    /// Fit the whole video into a canvas of the given size and centre it.
    pub fn fit_to(&mut self, canvas_width: f64, canvas_height: f64) {
        let (w, h) = (f64::from(self.video.width.max(1)), f64::from(self.video.height.max(1)));
        let background = (canvas_width / w).min(canvas_height / h);
        if !(background.is_finite() && background > 0.0) {
            return;
        }
        self.viewport.background_scale = background;
        self.viewport.set_zoom(1.0);
        self.viewport
            .set_pan((canvas_width - w * background) / 2.0, (canvas_height - h * background) / 2.0);
        self.events.emit(&ProjectEvent::ViewportChanged);
    }

    // ----- forms -----

    /// Apply the new-project dialog.
    pub fn apply_new_project(&mut self, form: &NewProjectForm) -> Result<(), ProjectError> {
        self.timeline.update_timing(self.video.duration, form.framerate)?;
        self.name = form.name.clone();
        self.timeline.frame_skip = form.frame_skip;
        self.video_speed = form.video_speed;
        self.axes_color = form.axes_color.clone();
        self.view_points = ViewPoints {
            forward: form.points_forward,
            backward: form.points_backward,
        };
        self.changed();
        Ok(())
    }

    /// Apply the project settings dialog.
    pub fn apply_edit_project(&mut self, form: &EditProjectForm) {
        self.name = form.name.clone();
        self.timeline.frame_skip = form.frame_skip;
        self.view_points = ViewPoints {
            forward: form.points_forward,
            backward: form.points_backward,
        };
        if form.axes_color != self.axes_color {
            self.set_axes_color(&form.axes_color);
        } else {
            self.changed();
        }
    }

    // ----- export -----

    /// Rows for a track's points inside the trim range. Empty without axes.
    pub fn export_track(&self, uid: &TrackId) -> Option<TrackExport> {
        let track = self.tracks.get(uid)?;
        let mut rows = Vec::new();
        if let Some(axes) = self.axes() {
            let start_time = self.timeline.frame_start(self.timeline.start_frame());
            for point in track.points().filter(|p| self.timeline.in_range(p.frame)) {
                let Some(frame) = self.timeline.frame(point.frame) else {
                    continue;
                };
                let converted = axes.convert(point.position());
                let pixels = Coordinate::new(round_to(converted.x, 5), round_to(converted.y, 5));
                let scaled = match self.scale.as_ref().and_then(|s| s.convert_point(pixels)) {
                    Some(s) => Coordinate::new(round_to(s.x, 5), round_to(s.y, 5)),
                    None => pixels,
                };
                rows.push(ExportRow {
                    frame: point.frame,
                    t: round_sig(self.video_speed * (frame.time - start_time), 6),
                    pixels,
                    scaled,
                });
            }
        }
        Some(TrackExport {
            name: track.name.clone(),
            unit: self.scale_unit(),
            rows,
        })
    }

    // ----- auto-tracking -----

    /// Live points a tracking run over `(start, end]` would overwrite.
    pub fn count_existing_points(&self, uid: &TrackId, start: FrameIndex, end: FrameIndex) -> usize {
        self.tracks
            .get(uid)
            .map(|t| t.count_in_range(FrameIndex(start.0 + 1), end))
            .unwrap_or(0)
    }

    /// Write a run's results to a track as one undo entry. Points already
    /// at those frames are tombstoned and come back on undo. Returns the
    /// number of points written.
    pub fn commit_tracking(&mut self, uid: &TrackId, results: &[TrackingResult]) -> Result<usize, ProjectError> {
        let frame_count = self.timeline.frame_count();
        let track = self
            .tracks
            .get_mut(uid)
            .ok_or_else(|| ProjectError::UnknownTrack(uid.clone()))?;

        let mut parts = Vec::with_capacity(results.len());
        for result in results.iter().filter(|r| r.frame.0 < frame_count) {
            let frame = result.frame;
            let replaced = track.point(frame).map(|p| p.id);
            let added = track.insert_point(frame, result.x, result.y);
            let (undo_uid, redo_uid) = (uid.clone(), uid.clone());
            parts.push(Command::new(
                "tracked point",
                move |p: &mut Project| {
                    if let Some(track) = p.any_track_mut(&undo_uid) {
                        track.remove_point(frame);
                        if let Some(old) = replaced {
                            track.unremove(frame, old);
                        }
                    }
                },
                move |p: &mut Project| {
                    if let Some(track) = p.any_track_mut(&redo_uid) {
                        track.unremove(frame, added);
                    }
                },
            ).on_discard(forget_point(uid.clone(), frame, added)));
        }
        let count = parts.len();
        if count == 0 {
            return Ok(0);
        }
        track.unselect_all();

        let (undo_uid, redo_uid) = (uid.clone(), uid.clone());
        parts.push(Command::new(
            "tracking notice",
            move |p: &mut Project| {
                p.events.emit(&ProjectEvent::TrackingCommitted {
                    track: undo_uid.clone(),
                    points: 0,
                });
            },
            move |p: &mut Project| {
                p.events.emit(&ProjectEvent::TrackingCommitted {
                    track: redo_uid.clone(),
                    points: count,
                });
            },
        ));
        self.record(Command::compound("auto-track", parts));
        self.emphasize_current();
        log::info!("Committed {} tracked points to {}", count, uid);
        self.events.emit(&ProjectEvent::TrackingCommitted {
            track: uid.clone(),
            points: count,
        });
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::serialization::ProjectRecord;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn video() -> VideoInfo {
        VideoInfo {
            name: "clip.mp4".to_string(),
            width: 640,
            height: 480,
            duration: 10.0,
        }
    }

    fn project() -> Project {
        Project::new("Test", video(), 30.0).unwrap()
    }

    fn snapshot(project: &Project) -> String {
        serde_json::to_string(&ProjectRecord::from(project)).unwrap()
    }

    #[test]
    fn test_add_point_creates_then_moves() {
        let mut p = project();
        let uid = p.new_track("Track 1", "#ff0000", true);
        let base = p.history().undo_len();

        assert_eq!(p.add_point(FrameIndex(3), 10.0, 20.0).unwrap(), PointEdit::Created);
        assert_eq!(
            p.add_point(FrameIndex(3), 11.0, 21.0).unwrap(),
            PointEdit::Moved {
                from: Coordinate::new(10.0, 20.0)
            }
        );
        p.add_point(FrameIndex(3), 12.0, 22.0).unwrap();

        let track = p.track(&uid).unwrap();
        assert_eq!(track.len(), 1);
        assert_eq!(track.point(FrameIndex(3)).unwrap().position(), Coordinate::new(12.0, 22.0));
        assert_eq!(p.history().undo_len(), base + 3);
        assert_eq!(p.history().next_undo_label(), Some("move point"));

        p.undo();
        assert_eq!(
            p.track(&uid).unwrap().point(FrameIndex(3)).unwrap().position(),
            Coordinate::new(11.0, 21.0)
        );
    }

    #[test]
    fn test_add_point_requires_track_and_frame() {
        let mut p = project();
        assert_eq!(p.add_point(FrameIndex(0), 1.0, 1.0), Err(ProjectError::NoActiveTrack));
        p.new_track("T", "#fff", true);
        let past_end = FrameIndex(p.timeline.frame_count());
        assert_eq!(
            p.add_point(past_end, 1.0, 1.0),
            Err(ProjectError::FrameOutOfRange(past_end))
        );
    }

    #[test]
    fn test_undo_redo_round_trip_serialized() {
        let mut p = project();
        let before = snapshot(&p);

        let t1 = p.new_track("Ball", "#ff0000", true);
        p.new_axes(100.0, 100.0, "#4169e1", true);
        p.rotate_axes(0.5).unwrap();
        p.move_axes(Coordinate::new(120.0, 90.0)).unwrap();
        p.new_scale(Some("2 m"), Coordinate::new(0.0, 100.0), Coordinate::new(200.0, 100.0), "#39ff14");
        p.set_scale_text("3 ft").unwrap();
        p.move_scale_endpoint(1, Coordinate::new(250.0, 100.0)).unwrap();
        p.add_point(FrameIndex(0), 150.0, 100.0).unwrap();
        p.add_point(FrameIndex(1), 155.0, 101.0).unwrap();
        p.add_point(FrameIndex(1), 156.0, 102.0).unwrap();
        p.remove_point(FrameIndex(0)).unwrap();
        let t2 = p.new_track("Cart", "#00ff00", true);
        p.add_point(FrameIndex(2), 1.0, 2.0).unwrap();
        p.set_track_hidden(&t1, true).unwrap();
        p.select_track(&t1);
        p.delete_track(&t2);
        let after = snapshot(&p);

        let steps = p.history().undo_len();
        for _ in 0..steps {
            assert!(p.undo());
        }
        assert!(!p.undo());
        assert_eq!(snapshot(&p), before);

        for _ in 0..steps {
            assert!(p.redo());
        }
        assert!(!p.redo());
        assert_eq!(snapshot(&p), after);
    }

    #[test]
    fn test_save_and_backup_status() {
        let mut p = project();
        p.mark_saved();
        p.backup();
        assert!(p.is_saved() && p.is_backed_up());
        assert!(p.backup_date().is_some());

        p.new_track("T", "#fff", true);
        assert!(!p.is_saved() && !p.is_backed_up());
        p.undo();
        assert!(p.is_saved() && p.is_backed_up());

        p.changed();
        assert!(!p.is_saved());
        p.mark_saved();
        assert!(p.is_saved());
        assert!(!p.is_backed_up());
    }

    #[test]
    fn test_events_fired() {
        let mut p = project();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        p.events.subscribe(move |e| sink.borrow_mut().push(e.clone()));

        let uid = p.new_track("T", "#fff", true);
        p.add_point(FrameIndex(0), 1.0, 1.0).unwrap();
        p.undo();
        let events = seen.borrow();
        assert!(events.contains(&ProjectEvent::NewTrack(uid.clone())));
        assert!(events.contains(&ProjectEvent::NewPoint {
            track: uid.clone(),
            frame: FrameIndex(0)
        }));
        assert!(events.contains(&ProjectEvent::PointRemoved {
            track: uid,
            frame: FrameIndex(0)
        }));
        assert_eq!(events.last(), Some(&ProjectEvent::Undo));
    }

    #[test]
    fn test_abandoned_redo_releases_tombstones() {
        let mut p = project();
        let uid = p.new_track("A", "#ff0000", true);
        for i in 0..20 {
            p.add_point(FrameIndex(4), f64::from(i), 1.0).unwrap();
            assert!(p.undo());
            assert_eq!(p.track(&uid).unwrap().tombstones_at(FrameIndex(4)).len(), 1);
        }
        p.add_point(FrameIndex(4), 50.0, 1.0).unwrap();
        assert!(p.track(&uid).unwrap().tombstones_at(FrameIndex(4)).is_empty());

        // A removal still on the undo stack keeps its tombstone.
        p.remove_point(FrameIndex(4)).unwrap();
        p.add_point(FrameIndex(4), 60.0, 1.0).unwrap();
        assert!(p.undo());
        assert_eq!(p.track(&uid).unwrap().tombstones_at(FrameIndex(4)).len(), 2);
        p.new_track("B", "#00ff00", false);
        let stones = p.track(&uid).unwrap().tombstones_at(FrameIndex(4));
        assert_eq!(stones.len(), 1);
        assert_eq!(stones[0].position(), Coordinate::new(50.0, 1.0));
        assert!(p.undo());
        assert!(p.undo());
        assert_eq!(
            p.track(&uid).unwrap().point(FrameIndex(4)).unwrap().position(),
            Coordinate::new(50.0, 1.0)
        );

        // Auto-track batches release their points the same way.
        let results = vec![TrackingResult {
            frame: FrameIndex(9),
            x: 1.0,
            y: 2.0,
            confidence: 0.9,
        }];
        p.commit_tracking(&uid, &results).unwrap();
        assert!(p.undo());
        assert_eq!(p.track(&uid).unwrap().tombstones_at(FrameIndex(9)).len(), 1);
        p.add_point(FrameIndex(2), 0.0, 0.0).unwrap();
        assert!(p.track(&uid).unwrap().tombstones_at(FrameIndex(9)).is_empty());
    }

    #[test]
    fn test_delete_and_undelete_track() {
        let mut p = project();
        let uid = p.new_track("T", "#fff", true);
        p.add_point(FrameIndex(4), 5.0, 5.0).unwrap();
        assert!(p.delete_track(&uid));
        assert!(p.track(&uid).is_none());
        assert!(p.active_track().is_none());

        p.undo();
        let track = p.track(&uid).unwrap();
        assert_eq!(track.len(), 1);
        assert_eq!(p.active_track_id(), Some(&uid));

        p.redo();
        assert!(p.track(&uid).is_none());
        assert!(p.undelete_track(&uid));
        assert_eq!(p.active_track().unwrap().len(), 1);
        assert!(!p.undelete_track(&uid));
    }

    #[test]
    fn test_switch_track_emphasis() {
        let mut p = project();
        let a = p.new_track("A", "#f00", true);
        p.add_point(FrameIndex(0), 1.0, 1.0).unwrap();
        assert!(p.track(&a).unwrap().point(FrameIndex(0)).unwrap().emphasized);

        let b = p.new_track("B", "#0f0", true);
        assert!(!p.track(&a).unwrap().point(FrameIndex(0)).unwrap().emphasized);
        assert_eq!(p.active_track_id(), Some(&b));

        p.timeline.seek(FrameIndex(5));
        p.add_point(FrameIndex(5), 2.0, 2.0).unwrap();
        assert_eq!(p.update(), Some(FrameIndex(5)));
        assert!(p.track(&b).unwrap().point(FrameIndex(5)).unwrap().emphasized);
    }

    #[test]
    fn test_scale_text_rejected_and_unchanged() {
        let mut p = project();
        assert_eq!(p.set_scale_text("2 m"), Err(ProjectError::NoScale));
        p.new_scale(None, Coordinate::new(0.0, 0.0), Coordinate::new(100.0, 0.0), DEFAULT_SCALE_COLOR);
        assert_eq!(p.scale().unwrap().text(), "1 m");

        let depth = p.history().undo_len();
        assert!(p.set_scale_text("2 parsecs").is_err());
        assert_eq!(p.scale().unwrap().text(), "1 m");
        assert!(!p.set_scale_text("1").unwrap());
        assert_eq!(p.history().undo_len(), depth);

        assert!(p.set_scale_text("5").unwrap());
        assert_eq!(p.scale().unwrap().text(), "5 m");
        assert_eq!(p.history().undo_len(), depth + 1);
    }

    #[test]
    fn test_track_units_follow_scale() {
        let mut p = project();
        let uid = p.new_track("T", "#fff", true);
        assert_eq!(p.track(&uid).unwrap().unit, "px");
        p.new_scale(Some("3 ft"), Coordinate::new(0.0, 0.0), Coordinate::new(10.0, 0.0), "#0f0");
        assert_eq!(p.track(&uid).unwrap().unit, "ft");
        p.undo();
        assert_eq!(p.track(&uid).unwrap().unit, "px");
    }

    #[test]
    fn test_visible_points_window() {
        let mut p = project();
        let uid = p.new_track("T", "#fff", true);
        for f in 0..20 {
            p.add_point(FrameIndex(f), f as f64, 0.0).unwrap();
        }
        p.timeline.seek(FrameIndex(10));
        p.update();
        let frames: Vec<usize> = p.visible_points().iter().map(|v| v.point.frame.0).collect();
        assert_eq!(frames, (3..=10).collect::<Vec<_>>());

        p.timeline.frame_skip = 2;
        p.view_points.forward = 1;
        let frames: Vec<usize> = p.visible_points().iter().map(|v| v.point.frame.0).collect();
        assert_eq!(frames.first(), Some(&0));
        assert_eq!(frames.last(), Some(&12));

        p.set_track_hidden(&uid, true).unwrap();
        assert!(p.visible_points().is_empty());
    }

    #[test]
    fn test_overlay_layout_follows_viewport() {
        let mut p = project();
        p.new_track("T", "#fff", true);
        p.add_point(FrameIndex(0), 100.0, 50.0).unwrap();
        p.new_axes(10.0, 20.0, DEFAULT_AXES_COLOR, true);
        p.new_scale(None, Coordinate::new(0.0, 0.0), Coordinate::new(64.0, 48.0), DEFAULT_SCALE_COLOR);

        p.set_zoom(2.0);
        p.pan_by(5.0, -5.0);
        let layout = p.overlay_layout();
        assert_eq!(layout.axes.unwrap().origin, Coordinate::new(25.0, 35.0));
        assert_eq!(layout.scale.unwrap().endpoints[1], Coordinate::new(133.0, 91.0));
        assert_eq!(layout.points[0].position, Coordinate::new(205.0, 95.0));
    }

    #[test]
    fn test_zoom_at_keeps_anchor() {
        let mut p = project();
        p.fit_to(1280.0, 960.0);
        assert_eq!(p.viewport().background_scale, 2.0);
        let anchor = Coordinate::new(300.0, 200.0);
        let before = p.mapper().to_pixel(anchor);
        p.zoom_at(anchor, 1.5);
        let after = p.mapper().to_pixel(anchor);
        assert!((before.x - after.x).abs() < 1e-3 && (before.y - after.y).abs() < 1e-3);
        assert_eq!(p.viewport().zoom, 1.5);
    }

    #[test]
    fn test_export_track_rows() {
        let mut p = project();
        let uid = p.new_track("T", "#fff", true);
        p.add_point(FrameIndex(0), 150.0, 100.0).unwrap();
        p.add_point(FrameIndex(3), 200.0, 50.0).unwrap();
        assert!(p.export_track(&uid).unwrap().rows.is_empty());

        p.new_axes(100.0, 100.0, DEFAULT_AXES_COLOR, true);
        p.new_scale(Some("2 m"), Coordinate::new(0.0, 100.0), Coordinate::new(200.0, 100.0), "#0f0");
        p.video_speed = 2.0;
        let export = p.export_track(&uid).unwrap();
        assert_eq!(export.unit, "m");
        assert_eq!(export.rows.len(), 2);
        assert_eq!(export.rows[0].pixels, Coordinate::new(50.0, 0.0));
        assert_eq!(export.rows[0].scaled, Coordinate::new(0.5, 0.0));
        assert_eq!(export.rows[1].t, 0.198);
        assert_eq!(export.rows[1].scaled, Coordinate::new(1.0, 0.5));

        p.timeline.set_range(FrameIndex(1), FrameIndex(10));
        let export = p.export_track(&uid).unwrap();
        assert_eq!(export.rows.len(), 1);
        assert_eq!(export.rows[0].t, 0.132);
    }

    #[test]
    fn test_commit_tracking_single_undo() {
        let mut p = project();
        let uid = p.new_track("T", "#fff", true);
        p.add_point(FrameIndex(2), 1.0, 1.0).unwrap();
        assert_eq!(p.count_existing_points(&uid, FrameIndex(0), FrameIndex(5)), 1);
        assert_eq!(p.count_existing_points(&uid, FrameIndex(2), FrameIndex(5)), 0);

        let results: Vec<TrackingResult> = (1..=5)
            .map(|f| TrackingResult {
                frame: FrameIndex(f),
                x: 10.0 * f as f64,
                y: 3.0,
                confidence: 0.9,
            })
            .collect();
        let depth = p.history().undo_len();
        assert_eq!(p.commit_tracking(&uid, &results).unwrap(), 5);
        assert_eq!(p.history().undo_len(), depth + 1);
        assert_eq!(p.track(&uid).unwrap().len(), 5);
        assert_eq!(p.track(&uid).unwrap().point(FrameIndex(2)).unwrap().x, 20.0);

        p.undo();
        let track = p.track(&uid).unwrap();
        assert_eq!(track.len(), 1);
        assert_eq!(track.point(FrameIndex(2)).unwrap().position(), Coordinate::new(1.0, 1.0));

        p.redo();
        assert_eq!(p.track(&uid).unwrap().len(), 5);
        assert_eq!(p.track(&uid).unwrap().point(FrameIndex(2)).unwrap().x, 20.0);
    }

    #[test]
    fn test_edit_track_and_forms() {
        let mut p = project();
        let uid = p.new_track("T", "#fff", true);
        let form = TrackForm {
            name: "Ball".to_string(),
            color: "#123456".to_string(),
        };
        p.edit_track(&uid, &form).unwrap();
        assert_eq!(p.track(&uid).unwrap().name, "Ball");
        p.undo();
        assert_eq!(p.track(&uid).unwrap().name, "T");

        let settings = NewProjectForm {
            name: "Drop".to_string(),
            framerate: 60.0,
            frame_skip: 2,
            video_speed: 0.5,
            axes_color: "#abc".to_string(),
            points_forward: 1,
            points_backward: 3,
        };
        p.apply_new_project(&settings).unwrap();
        assert_eq!(p.timeline.frame_time(), 0.017);
        assert_eq!(p.timeline.frame_skip, 2);
        assert_eq!(p.view_points, ViewPoints { forward: 1, backward: 3 });
        assert!(!p.is_saved());

        p.mark_saved();
        let edit = EditProjectForm {
            name: "Drop 2".to_string(),
            frame_skip: 1,
            axes_color: "#abc".to_string(),
            points_forward: 0,
            points_backward: 7,
        };
        p.apply_edit_project(&edit);
        assert_eq!(p.name, "Drop 2");
        assert_eq!(p.timeline.frame_skip, 1);
        assert_eq!(p.view_points, ViewPoints::default());
        assert!(!p.is_saved());
    }
}
