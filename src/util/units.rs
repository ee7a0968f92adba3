// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Length quantities and unit conversion.
//!
//! Every conversion pivots through meters. Input accepts abbreviations and
//! full-word spellings (`"5 m"`, `"12.5 feet"`, `"1e-3 kilometers"`), the
//! conversion form `"3 m > cm"` and bare unit names (value 1). Display always
//! uses the canonical abbreviation.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::geometry::round_sig;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnitError {
    #[error("empty quantity")]
    Empty,
    #[error("invalid number in '{0}'")]
    InvalidNumber(String),
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),
}

/// A length unit: canonical abbreviation plus its size in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unit {
    abbr: &'static str,
    meters: f64,
}

/// (abbreviation, full word, meters). Full words also accept a plural `s`.
const UNITS: &[(&str, &str, f64)] = &[
    ("m", "meter", 1.0),
    ("Ym", "yottameter", 1e24),
    ("Zm", "zettameter", 1e21),
    ("Em", "exameter", 1e18),
    ("Pm", "petameter", 1e15),
    ("Tm", "terameter", 1e12),
    ("Gm", "gigameter", 1e9),
    ("Mm", "megameter", 1e6),
    ("km", "kilometer", 1e3),
    ("hm", "hectometer", 1e2),
    ("dam", "decameter", 1e1),
    ("dm", "decimeter", 1e-1),
    ("cm", "centimeter", 1e-2),
    ("mm", "millimeter", 1e-3),
    ("um", "micrometer", 1e-6),
    ("nm", "nanometer", 1e-9),
    ("pm", "picometer", 1e-12),
    ("fm", "femtometer", 1e-15),
    ("am", "attometer", 1e-18),
    ("zm", "zeptometer", 1e-21),
    ("ym", "yoctometer", 1e-24),
    ("in", "inch", 0.0254),
    ("ft", "foot", 0.3048),
    ("yd", "yard", 0.9144),
    ("mi", "mile", 1609.344),
    ("li", "link", 0.201168),
    ("rd", "rod", 5.0292),
    ("ch", "chain", 20.1168),
    ("angstrom", "angstrom", 1e-10),
    ("mil", "mil", 2.54e-5),
];

impl Unit {
    pub const METER: Unit = Unit {
        abbr: "m",
        meters: 1.0,
    };

    /// Resolve a unit name. Names are case-sensitive (`Mm` is not `mm`).
    pub fn lookup(name: &str) -> Result<Unit, UnitError> {
        let name = name.trim();
        let irregular = match name {
            "inches" => Some("inch"),
            "feet" => Some("foot"),
            _ => None,
        };
        let singular = irregular.unwrap_or(name);

        for &(abbr, word, meters) in UNITS {
            let plural_word = word.len() > 2 && singular.strip_suffix('s') == Some(word);
            if singular == abbr || singular == word || plural_word {
                return Ok(Unit { abbr, meters });
            }
        }
        Err(UnitError::UnknownUnit(name.to_string()))
    }

    pub fn abbr(&self) -> &'static str {
        self.abbr
    }

    pub fn meters(&self) -> f64 {
        self.meters
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbr)
    }
}

/// A numeric length with its unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    pub fn meters(value: f64) -> Self {
        Self::new(value, Unit::METER)
    }

    /// Parse `"<number> <unit>"`, `"<quantity> > <unit>"` or a bare unit.
    pub fn parse(text: &str) -> Result<Quantity, UnitError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(UnitError::Empty);
        }
        if let Some((source, target)) = text.split_once('>') {
            let quantity = Self::parse_simple(source.trim())?;
            let target = Unit::lookup(target)?;
            return Ok(quantity.to(target));
        }
        Self::parse_simple(text)
    }

    fn parse_simple(text: &str) -> Result<Quantity, UnitError> {
        if text.is_empty() {
            return Err(UnitError::Empty);
        }
        match split_number(text) {
            Some((number, rest)) => {
                let value: f64 = number
                    .parse()
                    .map_err(|_| UnitError::InvalidNumber(text.to_string()))?;
                let rest = rest.trim();
                if rest.is_empty() {
                    // A number with no unit is not a length.
                    return Err(UnitError::UnknownUnit(String::new()));
                }
                Ok(Quantity::new(value, Unit::lookup(rest)?))
            }
            None => Ok(Quantity::new(1.0, Unit::lookup(text)?)),
        }
    }

    /// Convert to another unit, pivoting through meters.
    pub fn to(&self, target: Unit) -> Quantity {
        Quantity::new(self.value * self.unit.meters / target.meters, target)
    }

    /// Numeric value expressed in `target`.
    pub fn value_in(&self, target: Unit) -> f64 {
        self.to(target).value
    }

    /// Display text limited to `figures` significant digits.
    pub fn to_text(&self, figures: usize) -> String {
        format!("{} {}", format_significant(self.value, figures), self.unit)
    }
}

impl FromStr for Quantity {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quantity::parse(s)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", format_number(self.value), self.unit)
    }
}

/// Format with 14 significant digits, switching to exponent notation for
/// very large or very small magnitudes.
pub fn format_number(value: f64) -> String {
    format_significant(value, 14)
}

/// Format with at most `figures` significant digits.
pub fn format_significant(value: f64, figures: usize) -> String {
    let value = round_sig(value, figures);
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-6..1e21).contains(&magnitude) {
        format!("{:e}", value)
    } else {
        format!("{}", value)
    }
}

/// Split a leading `[+-]digits[.digits][e[+-]digits]` off `text`. The
/// exponent is only consumed when digits follow it, so `"5Em"` is five
/// exameters.
fn split_number(text: &str) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start {
        return None;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    Some(text.split_at(i))
}
