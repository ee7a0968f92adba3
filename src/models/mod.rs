// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Data models for projects, tracks, axes, scales and the timeline.

pub mod axes;
pub mod events;
pub mod frame;
pub mod history;
pub mod project;
pub mod scale;
pub mod timeline;
pub mod track;
