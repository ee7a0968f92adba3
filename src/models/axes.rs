// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! The user-defined physical coordinate frame.
//!
//! An [`Axes`] has an origin in video-pixel space and a rotation. Screen Y
//! grows downward, so coordinates are flipped before projecting onto the
//! rotated X and Y axes.

use std::f64::consts::{FRAC_PI_2, TAU};

use serde::{Deserialize, Serialize};

use crate::util::geometry::Coordinate;

/// Tolerance used to detect the axis-aligned rotations.
const ANGLE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axes {
    pub origin: Coordinate,
    rotation: f64,
    pub color: String,
}

/// Normalize an angle into `[0, 2π)`.
pub fn normalize_angle(theta: f64) -> f64 {
    let wrapped = theta.rem_euclid(TAU);
    if wrapped >= TAU - ANGLE_EPSILON {
        0.0
    } else {
        wrapped
    }
}

impl Axes {
    pub fn new(origin: Coordinate, rotation: f64, color: impl Into<String>) -> Self {
        Self {
            origin,
            rotation: normalize_angle(rotation),
            color: color.into(),
        }
    }

    /// Rotation in radians, always within `[0, 2π)`.
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn set_rotation(&mut self, theta: f64) {
        self.rotation = normalize_angle(theta);
    }

    /// Rotation that points the X axis from the origin towards `pixel`.
    pub fn rotation_towards(&self, pixel: Coordinate) -> f64 {
        let dx = pixel.x - self.origin.x;
        let dy = self.origin.y - pixel.y;
        if dx == 0.0 && dy == 0.0 {
            return self.rotation;
        }
        normalize_angle(dy.atan2(dx))
    }

    /// Which axis-aligned rotation (0, π/2, π, 3π/2) this is, if any.
    fn quadrant(&self) -> Option<u8> {
        (0u8..4).find(|&k| (self.rotation - f64::from(k) * FRAC_PI_2).abs() < ANGLE_EPSILON)
    }

    /// Convert a video-pixel position into the axes frame.
    pub fn convert(&self, pixel: Coordinate) -> Coordinate {
        let c = Coordinate::new(pixel.x, -pixel.y);
        let o = Coordinate::new(self.origin.x, -self.origin.y);

        match self.quadrant() {
            Some(0) => return Coordinate::new(c.x - o.x, c.y - o.y),
            Some(1) => return Coordinate::new(c.y - o.y, o.x - c.x),
            Some(2) => return Coordinate::new(o.x - c.x, o.y - c.y),
            Some(3) => return Coordinate::new(o.y - c.y, c.x - o.x),
            _ => {}
        }

        // Signed distances along the rotated X and Y axes.
        let (sin, cos) = self.rotation.sin_cos();
        let (dx, dy) = (c.x - o.x, c.y - o.y);
        Coordinate::new(dx * cos + dy * sin, dy * cos - dx * sin)
    }

    /// Inverse of [`Axes::convert`]: axes-frame position back to video pixels.
    pub fn unconvert(&self, point: Coordinate) -> Coordinate {
        let (sin, cos) = self.rotation.sin_cos();
        let o = Coordinate::new(self.origin.x, -self.origin.y);
        let x = o.x + point.x * cos - point.y * sin;
        let y = o.y + point.x * sin + point.y * cos;
        Coordinate::new(x, -y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn close(a: Coordinate, b: Coordinate) -> bool {
        (a.x - b.x).abs() < 1e-6 && (a.y - b.y).abs() < 1e-6
    }

    #[test]
    fn test_rotation_normalized() {
        let axes = Axes::new(Coordinate::default(), -FRAC_PI_2, "#4169e1");
        assert!((axes.rotation() - 1.5 * PI).abs() < 1e-12);
        let axes = Axes::new(Coordinate::default(), TAU, "#4169e1");
        assert_eq!(axes.rotation(), 0.0);
        let axes = Axes::new(Coordinate::default(), 5.0 * PI, "#4169e1");
        assert!((axes.rotation() - PI).abs() < 1e-9);
    }

    #[test]
    fn test_special_cases() {
        let origin = Coordinate::new(100.0, 100.0);
        let p = Coordinate::new(150.0, 80.0);

        let axes = Axes::new(origin, 0.0, "");
        assert!(close(axes.convert(p), Coordinate::new(50.0, 20.0)));

        let axes = Axes::new(origin, FRAC_PI_2, "");
        assert!(close(axes.convert(p), Coordinate::new(20.0, -50.0)));

        let axes = Axes::new(origin, PI, "");
        assert!(close(axes.convert(p), Coordinate::new(-50.0, -20.0)));

        let axes = Axes::new(origin, 1.5 * PI, "");
        assert!(close(axes.convert(p), Coordinate::new(-20.0, 50.0)));

        let axes = Axes::new(origin, 2.0 * PI, "");
        assert!(close(axes.convert(p), Coordinate::new(50.0, 20.0)));
    }

    #[test]
    fn test_general_rotation() {
        // X axis pointing up-right at 45 degrees.
        let axes = Axes::new(Coordinate::new(0.0, 0.0), PI / 4.0, "");
        let p = Coordinate::new(10.0, -10.0);
        let q = axes.convert(p);
        assert!((q.x - 200f64.sqrt()).abs() < 1e-9);
        assert!(q.y.abs() < 1e-9);

        let p = Coordinate::new(-10.0, -10.0);
        let q = axes.convert(p);
        assert!(q.x.abs() < 1e-9);
        assert!((q.y - 200f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip() {
        let points = [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(320.5, 17.0),
            Coordinate::new(-40.0, 600.25),
            Coordinate::new(99.0, 101.0),
        ];
        for step in 0..36 {
            let theta = f64::from(step) * TAU / 36.0 + 0.013;
            let axes = Axes::new(Coordinate::new(100.0, 120.0), theta, "");
            for p in points {
                let back = axes.unconvert(axes.convert(p));
                assert!(close(back, p), "theta {theta} point {p:?} back {back:?}");
            }
        }
        for k in 0..4 {
            let axes = Axes::new(Coordinate::new(7.0, 9.0), f64::from(k) * FRAC_PI_2, "");
            for p in points {
                assert!(close(axes.unconvert(axes.convert(p)), p));
            }
        }
    }

    #[test]
    fn test_near_axis_aligned_rotation() {
        let origin = Coordinate::new(640.0, 360.0);
        let p = Coordinate::new(900.0, 100.0);
        for base in [FRAC_PI_2, PI, 1.5 * PI] {
            for offset in [-1e-8, 1e-8] {
                let axes = Axes::new(origin, base + offset, "");
                let back = axes.unconvert(axes.convert(p));
                assert!((back.x - p.x).abs() < 1e-9, "theta {} back {back:?}", base + offset);
                assert!((back.y - p.y).abs() < 1e-9, "theta {} back {back:?}", base + offset);
            }
        }

        let axes = Axes::new(origin, 1.5 * PI - 1e-8, "");
        let exact = Axes::new(origin, 1.5 * PI, "");
        let (q, r) = (axes.convert(p), exact.convert(p));
        assert!((q.x - r.x).abs() < 1e-5 && (q.y - r.y).abs() < 1e-5);
    }

    #[test]
    fn test_rotation_towards() {
        let axes = Axes::new(Coordinate::new(100.0, 100.0), 0.0, "");
        assert!((axes.rotation_towards(Coordinate::new(100.0, 50.0)) - FRAC_PI_2).abs() < 1e-12);
        assert!((axes.rotation_towards(Coordinate::new(50.0, 100.0)) - PI).abs() < 1e-12);
        assert!(axes.rotation_towards(Coordinate::new(150.0, 100.0)).abs() < 1e-12);
    }
}
