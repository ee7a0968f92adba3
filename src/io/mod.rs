// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! I/O: frame sources, project files and dialog input.

pub mod form;
pub mod media;
pub mod serialization;
