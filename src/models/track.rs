// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Tracks and their points.
//!
//! A track is a sparse map from frame index to a single live point. Removed
//! points are not destroyed: they move into a tombstone map keyed by the
//! same frame index, so undo can reinstate the exact point.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::frame::FrameIndex;
use crate::util::geometry::Coordinate;

/// Stable identifier of a track (the key in persisted project files).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub String);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identity of a point within its track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointId(u64);

/// A marked position (video-pixel space) at one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: PointId,
    pub frame: FrameIndex,
    pub x: f64,
    pub y: f64,
    pub selected: bool,
    pub emphasized: bool,
}

impl Point {
    pub fn position(&self) -> Coordinate {
        Coordinate::new(self.x, self.y)
    }
}

#[derive(Debug, Clone)]
pub struct Track {
    pub uid: TrackId,
    pub name: String,
    pub color: String,
    /// Unit label for exported columns.
    pub unit: String,
    hidden: bool,
    points: BTreeMap<FrameIndex, Point>,
    tombstones: BTreeMap<FrameIndex, Vec<Point>>,
    next_point: u64,
}

impl Track {
    pub fn new(uid: TrackId, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            uid,
            name: name.into(),
            color: color.into(),
            unit: "px".to_string(),
            hidden: false,
            points: BTreeMap::new(),
            tombstones: BTreeMap::new(),
            next_point: 0,
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Hide or show the track. Hidden tracks keep their points but clear
    /// selection and emphasis.
    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
        if hidden {
            self.unselect_all();
            self.unemphasize_all();
        }
    }

    pub fn point(&self, frame: FrameIndex) -> Option<&Point> {
        self.points.get(&frame)
    }

    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.points.values()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of live points with frame in `[start, end]`.
    pub fn count_in_range(&self, start: FrameIndex, end: FrameIndex) -> usize {
        if start > end {
            return 0;
        }
        self.points.range(start..=end).count()
    }

    pub fn tombstones_at(&self, frame: FrameIndex) -> &[Point] {
        self.tombstones.get(&frame).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Create a new live point. Any point already live at `frame` is moved
    /// to the tombstones first so the one-point-per-frame invariant holds.
    pub fn insert_point(&mut self, frame: FrameIndex, x: f64, y: f64) -> PointId {
        self.remove_point(frame);
        let id = PointId(self.next_point);
        self.next_point += 1;
        self.points.insert(
            frame,
            Point {
                id,
                frame,
                x,
                y,
                selected: false,
                emphasized: false,
            },
        );
        id
    }

    /// Move the live point at `frame`, returning its previous position.
    pub fn move_point(&mut self, frame: FrameIndex, x: f64, y: f64) -> Option<Coordinate> {
        let point = self.points.get_mut(&frame)?;
        let previous = point.position();
        point.x = x;
        point.y = y;
        Some(previous)
    }

    /// Soft-delete the live point at `frame`.
    pub fn remove_point(&mut self, frame: FrameIndex) -> Option<PointId> {
        let mut point = self.points.remove(&frame)?;
        point.selected = false;
        point.emphasized = false;
        let id = point.id;
        self.tombstones.entry(frame).or_default().push(point);
        Some(id)
    }

    /// Reinstate a tombstoned point. Whatever is live at that frame is
    /// tombstoned in its place.
    pub fn unremove(&mut self, frame: FrameIndex, id: PointId) -> bool {
        let Some(stones) = self.tombstones.get_mut(&frame) else {
            return false;
        };
        let Some(pos) = stones.iter().position(|p| p.id == id) else {
            return false;
        };
        let point = stones.remove(pos);
        if stones.is_empty() {
            self.tombstones.remove(&frame);
        }
        self.remove_point(frame);
        self.points.insert(frame, point);
        true
    }

    /// Permanently drop a tombstoned point. Live points are never touched.
    pub fn forget(&mut self, frame: FrameIndex, id: PointId) -> bool {
        let Some(stones) = self.tombstones.get_mut(&frame) else {
            return false;
        };
        let before = stones.len();
        stones.retain(|p| p.id != id);
        let forgotten = stones.len() < before;
        if stones.is_empty() {
            self.tombstones.remove(&frame);
        }
        forgotten
    }

    /// Select one point, deselecting every other point of this track.
    pub fn select(&mut self, frame: FrameIndex) -> bool {
        if !self.points.contains_key(&frame) {
            return false;
        }
        for (f, point) in self.points.iter_mut() {
            point.selected = *f == frame;
        }
        true
    }

    pub fn unselect_all(&mut self) {
        self.points.values_mut().for_each(|p| p.selected = false);
    }

    pub fn selected(&self) -> Option<&Point> {
        self.points.values().find(|p| p.selected)
    }

    pub fn emphasize(&mut self, frame: FrameIndex) -> bool {
        match self.points.get_mut(&frame) {
            Some(point) => {
                point.emphasized = true;
                true
            }
            None => false,
        }
    }

    pub fn unemphasize_all(&mut self) {
        self.points.values_mut().for_each(|p| p.emphasized = false);
    }

    /// Live positions keyed by frame, as persisted.
    pub fn positions(&self) -> BTreeMap<FrameIndex, Coordinate> {
        self.points
            .iter()
            .map(|(frame, point)| (*frame, point.position()))
            .collect()
    }
}
