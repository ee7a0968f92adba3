// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Timeline scrubber control.
//!
//! Frame stepping, playback and the trim range. Nothing is applied here;
//! the caller routes each [`TimelineAction`] to the project's timeline.

use vidtrack::models::frame::FrameIndex;
use vidtrack::models::timeline::Timeline;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimelineAction {
    Seek(FrameIndex),
    Prev,
    Next,
    Play,
    Pause,
    SetRange(FrameIndex, FrameIndex),
}

pub fn show(ui: &mut egui::Ui, timeline: &Timeline, enabled: bool) -> Option<TimelineAction> {
    let mut action = None;
    let last = timeline.frame_count().saturating_sub(1);

    ui.add_enabled_ui(enabled, |ui| {
        ui.horizontal(|ui| {
            if ui.button("⏮").on_hover_text("Previous frame").clicked() {
                action = Some(TimelineAction::Prev);
            }
            if timeline.is_playing() {
                if ui.button("⏸").on_hover_text("Pause").clicked() {
                    action = Some(TimelineAction::Pause);
                }
            } else if ui.button("▶").on_hover_text("Play").clicked() {
                action = Some(TimelineAction::Play);
            }
            if ui.button("⏭").on_hover_text("Next frame").clicked() {
                action = Some(TimelineAction::Next);
            }

            ui.separator();

            let mut frame = timeline.current_frame().0;
            let slider_width = (ui.available_width() - 320.0).max(100.0);
            ui.spacing_mut().slider_width = slider_width;
            if ui.add(egui::Slider::new(&mut frame, 0..=last).show_value(false)).changed() {
                action = Some(TimelineAction::Seek(FrameIndex(frame)));
            }

            ui.label(format!(
                "Frame {} / {}  {:.3}s",
                timeline.current_frame(),
                last,
                timeline.current_time()
            ));

            ui.separator();

            let mut start = timeline.start_frame().0;
            let mut end = timeline.end_frame().0;
            ui.label("Range");
            let start_changed = ui.add(egui::DragValue::new(&mut start).range(0..=last)).changed();
            let end_changed = ui.add(egui::DragValue::new(&mut end).range(0..=last)).changed();
            if start_changed || end_changed {
                action = Some(TimelineAction::SetRange(FrameIndex(start), FrameIndex(end)));
            }
        });
    });

    action
}
