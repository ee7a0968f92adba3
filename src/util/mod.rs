// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Pure helpers: numeric geometry, length units and the display mapper.

pub mod coords;
pub mod geometry;
pub mod units;
