// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! UI components for the vidtrack application.

pub mod canvas;
pub mod properties;
pub mod timeline;
pub mod toolbar;

/// Parse a `#rgb` or `#rrggbb` color. Anything else draws magenta.
pub fn parse_color(text: &str) -> egui::Color32 {
    let fallback = egui::Color32::from_rgb(255, 0, 255);
    let Some(hex) = text.strip_prefix('#') else {
        return fallback;
    };
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    let parsed = match hex.len() {
        3 => {
            let mut rgb = hex.chars().filter_map(|c| channel(&c.to_string())).map(|v| v * 17);
            match (rgb.next(), rgb.next(), rgb.next()) {
                (Some(r), Some(g), Some(b)) => Some((r, g, b)),
                _ => None,
            }
        }
        6 => match (
            hex.get(0..2).and_then(channel),
            hex.get(2..4).and_then(channel),
            hex.get(4..6).and_then(channel),
        ) {
            (Some(r), Some(g), Some(b)) => Some((r, g, b)),
            _ => None,
        },
        _ => None,
    };
    parsed
        .map(|(r, g, b)| egui::Color32::from_rgb(r, g, b))
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#39ff14"), egui::Color32::from_rgb(0x39, 0xff, 0x14));
        assert_eq!(parse_color("#fff"), egui::Color32::WHITE);
        assert_eq!(parse_color("blue"), egui::Color32::from_rgb(255, 0, 255));
        assert_eq!(parse_color("#12"), egui::Color32::from_rgb(255, 0, 255));
    }
}
