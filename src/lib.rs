// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! vidtrack - video motion tracking.
//!
//! Mark the pixel position of a moving object across video frames, define a
//! physical coordinate frame (axes) and a length scale, and convert the
//! resulting trajectories into physical-unit motion data. An automatic
//! tracking engine (template matching or optical flow) can fill in frame
//! ranges with minimal manual marking.

pub mod config;
pub mod io;
pub mod models;
pub mod tracking;
pub mod util;

pub use models::project::{Project, VideoInfo};
