// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Geometric and numeric utility functions.
//!
//! Angle conversion, decimal rounding and significant-figure
//! helpers shared by the axes, scale, timeline and export code.

use serde::{Deserialize, Serialize};

/// A 2D coordinate. Depending on context this is video-pixel space,
/// display space or the physical axes frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another coordinate.
    pub fn distance(&self, other: &Coordinate) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

pub fn to_degrees(radians: f64) -> f64 {
    radians * (180.0 / std::f64::consts::PI)
}

pub fn to_radians(degrees: f64) -> f64 {
    degrees * (std::f64::consts::PI / 180.0)
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, decimals: usize) -> f64 {
    if !value.is_finite() {
        return value;
    }
    format!("{:.*}", decimals, value).parse().unwrap_or(value)
}

/// Round to a number of significant figures.
pub fn round_sig(value: f64, figures: usize) -> f64 {
    if !value.is_finite() || value == 0.0 {
        return value;
    }
    let figures = figures.max(1);
    format!("{:.*e}", figures - 1, value).parse().unwrap_or(value)
}

/// Count the significant figures in the shortest decimal representation of
/// `value`. Trailing zeros of integers are not significant.
pub fn sig_figs(value: f64) -> usize {
    if !value.is_finite() {
        return 0;
    }
    let text = format!("{}", value.abs());
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    let trimmed = digits.trim_start_matches('0').trim_end_matches('0');
    trimmed.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_angle_roundtrip() {
        assert!((to_degrees(PI) - 180.0).abs() < 1e-12);
        assert!((to_radians(90.0) - PI / 2.0).abs() < 1e-12);
        assert!((to_radians(to_degrees(1.234)) - 1.234).abs() < 1e-12);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.0 / 30.0, 3), 0.033);
        assert_eq!(round_to(2.5, 0), 2.0);
        assert_eq!(round_to(-1.23456, 2), -1.23);
    }

    #[test]
    fn test_round_sig() {
        assert_eq!(round_sig(123456.0, 3), 123000.0);
        assert_eq!(round_sig(0.000123456, 2), 0.00012);
        assert_eq!(round_sig(0.0, 4), 0.0);
    }

    #[test]
    fn test_sig_figs() {
        assert_eq!(sig_figs(1200.0), 2);
        assert_eq!(sig_figs(0.05), 1);
        assert_eq!(sig_figs(12.5), 3);
        assert_eq!(sig_figs(0.0), 0);
    }

    #[test]
    fn test_distance() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(3.0, 4.0);
        assert_eq!(a.distance(&b), 5.0);
    }
}
