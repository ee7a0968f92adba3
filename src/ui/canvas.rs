// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Drawing canvas for frame display and overlays.
//!
//! Everything drawn on top of the frame goes through
//! [`Project::overlay_layout`], so zooming or panning moves the axes, the
//! scale and every point together. Pointer positions are turned back into
//! video pixels with the project's coordinate mapper.

use vidtrack::models::frame::FrameIndex;
use vidtrack::models::project::{OverlayLayout, Project};
use vidtrack::tracking::Roi;
use vidtrack::util::geometry::Coordinate;

use crate::app::Tool;
use crate::ui::parse_color;

/// Pick radius around handles, in display pixels.
const HANDLE_RADIUS: f64 = 8.0;
const AXIS_LENGTH: f32 = 60.0;

/// Drag in progress. Start values are kept so a finished drag can be
/// recorded as one undoable edit.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Drag {
    AxesOrigin { start: Coordinate },
    AxesRotation { start: f64 },
    ScaleEndpoint { index: usize, start: Coordinate },
    NewScale { anchor: Coordinate },
    Roi { anchor: Coordinate },
}

/// Interaction state that survives between frames.
#[derive(Debug, Default)]
pub struct CanvasState {
    drag: Option<Drag>,
    /// Rubber band shown while drawing a scale or ROI, in pixels.
    preview: Option<(Coordinate, Coordinate)>,
    /// Last region drawn for auto-tracking.
    pub roi: Option<Roi>,
    last_size: Option<(f32, f32)>,
}

/// Result of canvas interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasAction {
    AddPoint(Coordinate),
    SelectPoint(FrameIndex),
    PlaceAxes(Coordinate),
    MoveAxesLive(Coordinate),
    MoveAxes { from: Coordinate, to: Coordinate },
    RotateAxesLive(f64),
    RotateAxes { from: f64, to: f64 },
    MoveScaleEndpointLive { index: usize, to: Coordinate },
    MoveScaleEndpoint { index: usize, from: Coordinate, to: Coordinate },
    NewScale(Coordinate, Coordinate),
    RoiDrawn(Roi),
    Zoom { anchor: Coordinate, factor: f64 },
    Pan { dx: f64, dy: f64 },
    Resized { width: f64, height: f64 },
}

fn to_pos(origin: egui::Pos2, c: Coordinate) -> egui::Pos2 {
    egui::pos2(origin.x + c.x as f32, origin.y + c.y as f32)
}

fn to_display(origin: egui::Pos2, pos: egui::Pos2) -> Coordinate {
    Coordinate::new(f64::from(pos.x - origin.x), f64::from(pos.y - origin.y))
}

fn near(a: Coordinate, b: Coordinate) -> bool {
    a.distance(&b) <= HANDLE_RADIUS
}

/// Display the canvas and collect interactions.
pub fn show(
    ui: &mut egui::Ui,
    project: Option<&Project>,
    current_tool: Tool,
    texture: Option<&egui::TextureHandle>,
    state: &mut CanvasState,
) -> Vec<CanvasAction> {
    let mut actions = Vec::new();
    ui.style_mut().visuals.extreme_bg_color = egui::Color32::from_gray(40);

    let Some(project) = project else {
        show_welcome(ui);
        return actions;
    };

    let (response, painter) = ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
    let rect = response.rect;
    let origin = rect.min;
    painter.rect_filled(rect, 0.0, egui::Color32::from_gray(40));

    let size = (rect.width(), rect.height());
    if state.last_size != Some(size) {
        state.last_size = Some(size);
        actions.push(CanvasAction::Resized {
            width: f64::from(size.0),
            height: f64::from(size.1),
        });
    }

    let mapper = project.mapper();
    if let Some(texture) = texture {
        let (w, h) = mapper.display_size();
        let pan = mapper.viewport().pan;
        let image_rect = egui::Rect::from_min_size(
            to_pos(origin, pan),
            egui::vec2(w as f32, h as f32),
        );
        painter.with_clip_rect(rect).image(
            texture.id(),
            image_rect,
            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            egui::Color32::WHITE,
        );
    }

    let layout = project.overlay_layout();
    draw_overlays(&painter.with_clip_rect(rect), origin, &layout);
    if let Some((a, b)) = state.preview {
        let band = egui::Rect::from_two_pos(
            to_pos(origin, mapper.to_display(a)),
            to_pos(origin, mapper.to_display(b)),
        );
        painter.rect_stroke(band, 0.0, egui::Stroke::new(1.5, egui::Color32::LIGHT_BLUE));
    }
    if let Some(roi) = state.roi {
        let band = egui::Rect::from_two_pos(
            to_pos(origin, mapper.to_display(Coordinate::new(roi.x, roi.y))),
            to_pos(origin, mapper.to_display(Coordinate::new(roi.x + roi.width, roi.y + roi.height))),
        );
        painter.rect_stroke(band, 0.0, egui::Stroke::new(2.0, egui::Color32::GOLD));
    }

    // Zoom and pan work with every tool.
    if response.hovered() {
        let scroll = ui.input(|i| i.smooth_scroll_delta.y);
        if scroll != 0.0 {
            if let Some(pos) = response.hover_pos() {
                actions.push(CanvasAction::Zoom {
                    anchor: to_display(origin, pos),
                    factor: f64::from(scroll * 0.002).exp(),
                });
            }
        }
    }
    if response.dragged_by(egui::PointerButton::Secondary) {
        let delta = response.drag_delta();
        actions.push(CanvasAction::Pan {
            dx: f64::from(delta.x),
            dy: f64::from(delta.y),
        });
    }

    let pointer = response.interact_pointer_pos().map(|p| to_display(origin, p));
    let shift = ui.input(|i| i.modifiers.shift);

    if response.clicked() {
        if let Some(display) = pointer {
            let pixel = mapper.to_pixel(display);
            match current_tool {
                Tool::AddPoint => actions.push(CanvasAction::AddPoint(pixel)),
                Tool::Axes if layout.axes.is_none() => actions.push(CanvasAction::PlaceAxes(pixel)),
                Tool::Select => {
                    let hit = layout
                        .points
                        .iter()
                        .filter(|p| p.active)
                        .find(|p| near(p.position, display));
                    if let Some(point) = hit {
                        actions.push(CanvasAction::SelectPoint(point.frame));
                    }
                }
                _ => {}
            }
        }
    }

    if response.drag_started_by(egui::PointerButton::Primary) {
        if let Some(display) = pointer {
            let pixel = mapper.to_pixel(display);
            state.drag = match current_tool {
                Tool::Axes => project.axes().map(|axes| {
                    if shift || !near(layout.axes.as_ref().map(|a| a.origin).unwrap_or(display), display) {
                        Drag::AxesRotation { start: axes.rotation() }
                    } else {
                        Drag::AxesOrigin { start: axes.origin }
                    }
                }),
                Tool::Scale => {
                    let endpoint = layout
                        .scale
                        .as_ref()
                        .and_then(|s| s.endpoints.iter().position(|e| near(*e, display)));
                    match (endpoint, project.scale()) {
                        (Some(index), Some(scale)) => Some(Drag::ScaleEndpoint {
                            index,
                            start: scale.endpoints[index],
                        }),
                        _ => Some(Drag::NewScale { anchor: pixel }),
                    }
                }
                Tool::TrackRoi => Some(Drag::Roi { anchor: pixel }),
                _ => None,
            };
        }
    }

    if response.dragged_by(egui::PointerButton::Primary) {
        if let (Some(drag), Some(display)) = (state.drag, pointer) {
            let pixel = mapper.to_pixel(display);
            match drag {
                Drag::AxesOrigin { .. } => actions.push(CanvasAction::MoveAxesLive(pixel)),
                Drag::AxesRotation { .. } => {
                    if let Some(axes) = project.axes() {
                        actions.push(CanvasAction::RotateAxesLive(axes.rotation_towards(pixel)));
                    }
                }
                Drag::ScaleEndpoint { index, .. } => {
                    actions.push(CanvasAction::MoveScaleEndpointLive { index, to: pixel })
                }
                Drag::NewScale { anchor } | Drag::Roi { anchor } => state.preview = Some((anchor, pixel)),
            }
        }
    }

    if response.drag_stopped() {
        if let Some(drag) = state.drag.take() {
            state.preview = None;
            let pixel = pointer.map(|d| mapper.to_pixel(d));
            match (drag, pixel) {
                (Drag::AxesOrigin { start }, Some(to)) => actions.push(CanvasAction::MoveAxes { from: start, to }),
                (Drag::AxesRotation { start }, _) => {
                    if let Some(axes) = project.axes() {
                        actions.push(CanvasAction::RotateAxes {
                            from: start,
                            to: axes.rotation(),
                        });
                    }
                }
                (Drag::ScaleEndpoint { index, start }, Some(to)) => {
                    actions.push(CanvasAction::MoveScaleEndpoint { index, from: start, to })
                }
                (Drag::NewScale { anchor }, Some(end)) if anchor.distance(&end) > 1.0 => {
                    actions.push(CanvasAction::NewScale(anchor, end))
                }
                (Drag::Roi { anchor }, Some(end)) => {
                    let roi = Roi::from_corners(anchor, end);
                    if roi.width >= 4.0 && roi.height >= 4.0 {
                        state.roi = Some(roi);
                        actions.push(CanvasAction::RoiDrawn(roi));
                    }
                }
                _ => {}
            }
        }
    }

    actions
}

fn draw_overlays(painter: &egui::Painter, origin: egui::Pos2, layout: &OverlayLayout) {
    if let Some(axes) = &layout.axes {
        let color = parse_color(&axes.color);
        let center = to_pos(origin, axes.origin);
        // Screen Y grows downward.
        let (sin, cos) = (axes.rotation as f32).sin_cos();
        let x_dir = egui::vec2(cos, -sin);
        let y_dir = egui::vec2(-sin, -cos);
        painter.arrow(center, x_dir * AXIS_LENGTH, egui::Stroke::new(2.0, color));
        painter.arrow(center, y_dir * AXIS_LENGTH, egui::Stroke::new(2.0, color));
        painter.line_segment(
            [center - x_dir * AXIS_LENGTH, center],
            egui::Stroke::new(1.0, color),
        );
        painter.text(
            center + x_dir * (AXIS_LENGTH + 8.0),
            egui::Align2::CENTER_CENTER,
            "x",
            egui::FontId::monospace(12.0),
            color,
        );
    }

    if let Some(scale) = &layout.scale {
        let color = parse_color(&scale.color);
        let a = to_pos(origin, scale.endpoints[0]);
        let b = to_pos(origin, scale.endpoints[1]);
        painter.line_segment([a, b], egui::Stroke::new(2.0, color));
        for end in [a, b] {
            painter.circle_stroke(end, 5.0, egui::Stroke::new(2.0, color));
        }
        painter.text(
            a + (b - a) / 2.0 + egui::vec2(0.0, -12.0),
            egui::Align2::CENTER_CENTER,
            &scale.text,
            egui::FontId::proportional(14.0),
            color,
        );
    }

    for point in &layout.points {
        let color = parse_color(&point.color);
        let center = to_pos(origin, point.position);
        let radius = if point.emphasized { 6.0 } else { 4.0 };
        if point.active {
            painter.circle_filled(center, radius, color);
        } else {
            painter.circle_stroke(center, radius, egui::Stroke::new(1.5, color));
        }
        if point.selected {
            painter.circle_stroke(center, radius + 3.0, egui::Stroke::new(1.0, egui::Color32::WHITE));
        }
    }
}

fn show_welcome(ui: &mut egui::Ui) {
    ui.centered_and_justified(|ui| {
        ui.vertical_centered(|ui| {
            ui.add_space(20.0);
            ui.heading(
                egui::RichText::new("vidtrack")
                    .size(32.0)
                    .color(egui::Color32::from_gray(200)),
            );
            ui.label(
                egui::RichText::new("Video motion tracking")
                    .size(14.0)
                    .color(egui::Color32::from_gray(150)),
            );
            ui.add_space(20.0);
            ui.label(
                egui::RichText::new("Open an image sequence or a video to begin")
                    .color(egui::Color32::from_gray(180)),
            );
        });
    });
}
