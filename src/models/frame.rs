// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Discrete video frames.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a frame within a timeline.
///
/// Keys every per-frame map (live points and tombstones) so frame numbers
/// cannot be confused with other integer keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameIndex(pub usize);

impl FrameIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for FrameIndex {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

/// A frame of the timeline: its index and start time in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub index: FrameIndex,
    pub time: f64,
}
