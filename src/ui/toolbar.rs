// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Toolbar and tool selection UI.

use crate::app::Tool;

/// Display the toolbar with tool selection buttons.
pub fn show(ui: &mut egui::Ui, current_tool: &mut Tool, tracking_active: bool) {
    ui.horizontal(|ui| {
        ui.spacing_mut().item_spacing.x = 8.0;

        ui.label("Tools:");

        ui.separator();

        if ui.selectable_label(*current_tool == Tool::Select, "⬆ Select").clicked() {
            *current_tool = Tool::Select;
        }
        if ui.selectable_label(*current_tool == Tool::AddPoint, "✚ Add Point").clicked() {
            *current_tool = Tool::AddPoint;
        }
        if ui.selectable_label(*current_tool == Tool::Axes, "⊥ Axes").clicked() {
            *current_tool = Tool::Axes;
        }
        if ui.selectable_label(*current_tool == Tool::Scale, "⟷ Scale").clicked() {
            *current_tool = Tool::Scale;
        }
        let roi = ui.add_enabled(
            !tracking_active,
            egui::SelectableLabel::new(*current_tool == Tool::TrackRoi, "▭ Auto-track ROI"),
        );
        if roi.clicked() {
            *current_tool = Tool::TrackRoi;
        }

        ui.separator();

        let tool_text = match current_tool {
            Tool::Select => "Click a point to select it, right-drag to pan, scroll to zoom",
            Tool::AddPoint => "Click to mark the active track at this frame (advances one step)",
            Tool::Axes => "Click to place the axes, drag the origin to move, shift-drag to rotate",
            Tool::Scale => "Drag to draw the scale, drag an endpoint to adjust it",
            Tool::TrackRoi => "Drag a box around the object to track",
        };

        ui.label(egui::RichText::new(tool_text).italics().weak());
    });
}
