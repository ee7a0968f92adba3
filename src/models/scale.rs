// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Pixel-to-physical length scale.

use serde::{Deserialize, Serialize};

use crate::util::geometry::Coordinate;
use crate::util::units::{Quantity, Unit, UnitError};

/// Significant digits kept in the displayed scale text.
const TEXT_PRECISION: usize = 6;

/// Two endpoints in video-pixel space and the physical length between them.
#[derive(Debug, Clone, PartialEq)]
pub struct Scale {
    pub endpoints: [Coordinate; 2],
    size: Quantity,
    text: String,
    pub color: String,
}

/// Snapshot of the editable size, used to build undo pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleSize {
    pub size: Quantity,
    pub text: String,
}

/// Parse scale text. A bare number is read as meters.
pub fn process_text(text: &str) -> Result<ScaleSize, UnitError> {
    let parsed = match Quantity::parse(text) {
        Ok(q) => q,
        Err(first) => match Quantity::parse(&format!("{} m", text.trim())) {
            Ok(q) => q,
            Err(_) => return Err(first),
        },
    };
    Ok(ScaleSize {
        size: parsed,
        text: parsed.to_text(TEXT_PRECISION),
    })
}

impl Scale {
    /// Create a scale. Missing or unparseable text falls back to `1 m`.
    pub fn new(text: Option<&str>, a: Coordinate, b: Coordinate, color: impl Into<String>) -> Self {
        let processed = text
            .and_then(|t| process_text(t).ok())
            .unwrap_or_else(|| ScaleSize {
                size: Quantity::meters(1.0),
                text: Quantity::meters(1.0).to_text(TEXT_PRECISION),
            });
        Self {
            endpoints: [a, b],
            size: processed.size,
            text: processed.text,
            color: color.into(),
        }
    }

    pub fn size(&self) -> Quantity {
        self.size
    }

    /// The last valid display text.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn unit(&self) -> Unit {
        self.size.unit
    }

    pub fn current_size(&self) -> ScaleSize {
        ScaleSize {
            size: self.size,
            text: self.text.clone(),
        }
    }

    pub fn apply_size(&mut self, size: ScaleSize) {
        self.size = size.size;
        self.text = size.text;
    }

    /// Re-parse user text. Returns the previous size when the value
    /// changed, `None` when it parsed to the same quantity. Invalid text
    /// leaves the scale untouched.
    pub fn set_text(&mut self, text: &str) -> Result<Option<ScaleSize>, UnitError> {
        let processed = process_text(text)?;
        if processed.size == self.size {
            self.text = processed.text;
            return Ok(None);
        }
        let previous = self.current_size();
        self.apply_size(processed);
        Ok(Some(previous))
    }

    /// Pixel distance between the endpoints.
    pub fn pixel_length(&self) -> f64 {
        self.endpoints[0].distance(&self.endpoints[1])
    }

    /// Physical length per pixel, in the scale's unit. `None` when the
    /// endpoints coincide.
    pub fn ratio(&self) -> Option<f64> {
        let length = self.pixel_length();
        if length <= f64::EPSILON {
            None
        } else {
            Some(self.size.value / length)
        }
    }

    /// Convert a pixel distance to a physical quantity in the scale's unit.
    pub fn convert(&self, pixels: f64) -> Option<Quantity> {
        self.ratio().map(|r| Quantity::new(pixels * r, self.size.unit))
    }

    /// Convert a pixel distance to a number in `target` units.
    pub fn convert_to(&self, pixels: f64, target: Unit) -> Option<f64> {
        self.convert(pixels).map(|q| q.value_in(target))
    }

    /// Scale both components of an axes-frame position.
    pub fn convert_point(&self, point: Coordinate) -> Option<Coordinate> {
        self.ratio().map(|r| Coordinate::new(point.x * r, point.y * r))
    }
}

/// Persisted form of a scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleRecord {
    pub size: String,
    pub color: String,
    pub nodes: [Coordinate; 2],
}

impl From<&Scale> for ScaleRecord {
    fn from(scale: &Scale) -> Self {
        Self {
            size: scale.size.to_string(),
            color: scale.color.clone(),
            nodes: scale.endpoints,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale(text: &str) -> Scale {
        Scale::new(
            Some(text),
            Coordinate::new(0.0, 100.0),
            Coordinate::new(200.0, 100.0),
            "#39ff14",
        )
    }

    #[test]
    fn test_ratio_and_convert() {
        let s = scale("2 m");
        assert_eq!(s.pixel_length(), 200.0);
        assert_eq!(s.ratio(), Some(0.01));
        let q = s.convert(50.0).unwrap();
        assert!((q.value - 0.5).abs() < 1e-12);
        assert_eq!(q.unit.abbr(), "m");
        let cm = s.convert_to(50.0, Unit::lookup("cm").unwrap()).unwrap();
        assert!((cm - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_defaults_and_fallback() {
        let s = Scale::new(None, Coordinate::default(), Coordinate::new(1.0, 0.0), "");
        assert_eq!(s.text(), "1 m");
        let s = scale("not a length");
        assert_eq!(s.text(), "1 m");
        let s = scale("3.5");
        assert_eq!(s.text(), "3.5 m");
    }

    #[test]
    fn test_set_text() {
        let mut s = scale("2 m");
        let previous = s.set_text("200 cm").unwrap().unwrap();
        assert_eq!(previous.text, "2 m");
        assert_eq!(s.text(), "200 cm");

        // Same quantity again: no change to record.
        assert_eq!(s.set_text("200cm").unwrap(), None);

        // Invalid text is rejected and the last valid value kept.
        assert!(s.set_text("two meters").is_err());
        assert_eq!(s.text(), "200 cm");

        let previous = s.set_text("1 ft > in").unwrap().unwrap();
        assert_eq!(previous.text, "200 cm");
        assert_eq!(s.text(), "12 in");
    }

    #[test]
    fn test_degenerate_scale() {
        let s = Scale::new(Some("1 m"), Coordinate::new(5.0, 5.0), Coordinate::new(5.0, 5.0), "");
        assert_eq!(s.ratio(), None);
        assert_eq!(s.convert(10.0), None);
    }
}
