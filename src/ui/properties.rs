// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Properties panel.
//!
//! Project settings, the track list, the scale, auto-tracking and a data
//! preview of the active track. Text fields are parsed through the dialog
//! forms before anything reaches the project.

use vidtrack::config::TrackingSettings;
use vidtrack::io::form::{AutoTrackForm, EditProjectForm, FormData, FormError, NewProjectForm, ScaleForm, TrackForm};
use vidtrack::models::project::Project;
use vidtrack::models::track::TrackId;
use vidtrack::tracking::{Algorithm, Roi};

/// Rows shown in the data preview.
const PREVIEW_ROWS: usize = 12;

/// Raw text of every editable field.
#[derive(Debug, Default)]
pub struct PropertiesState {
    /// A freshly opened source whose timing has not been confirmed yet.
    creating: bool,
    name: String,
    framerate: String,
    frame_skip: String,
    video_speed: String,
    axes_color: String,
    points_forward: String,
    points_backward: String,
    track_name: String,
    track_color: String,
    scale_text: String,
    scale_color: String,
    algorithm: Algorithm,
    start_frame: String,
    end_frame: String,
    search_margin: String,
    template_update_interval: String,
    error: Option<String>,
}

impl PropertiesState {
    /// Empty panel with the auto-track fields seeded from the settings.
    pub fn new(tracking: &TrackingSettings) -> Self {
        Self {
            algorithm: tracking.algorithm,
            search_margin: tracking.search_margin.to_string(),
            template_update_interval: tracking.template_update_interval.to_string(),
            ..Self::default()
        }
    }

    /// Reload the fields for a project that was just created, leaving the
    /// full new-project form open until it is confirmed.
    pub fn begin_project(&mut self, project: &Project) {
        self.sync(project);
        self.creating = true;
    }

    pub fn is_creating(&self) -> bool {
        self.creating
    }

    /// Reload every field from the project. The auto-track tuning fields
    /// keep their values.
    pub fn sync(&mut self, project: &Project) {
        self.creating = false;
        self.name = project.name.clone();
        self.framerate = project.timeline.fps().to_string();
        self.frame_skip = project.timeline.frame_skip.to_string();
        self.video_speed = project.video_speed.to_string();
        self.axes_color = project.axes_color.clone();
        self.points_forward = project.view_points.forward.to_string();
        self.points_backward = project.view_points.backward.to_string();
        self.sync_track(project);
        self.sync_scale(project);
        self.start_frame = project.timeline.current_frame().to_string();
        self.end_frame = project.timeline.end_frame().to_string();
        self.error = None;
    }

    pub fn sync_track(&mut self, project: &Project) {
        if let Some(track) = project.active_track() {
            self.track_name = track.name.clone();
            self.track_color = track.color.clone();
        }
    }

    pub fn sync_scale(&mut self, project: &Project) {
        if let Some(scale) = project.scale() {
            self.scale_text = scale.text().to_string();
            self.scale_color = scale.color.clone();
        }
    }

    /// Prefill the auto-track range.
    pub fn set_tracking_range(&mut self, start: usize, end: usize) {
        self.start_frame = start.to_string();
        self.end_frame = end.to_string();
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    fn project_data(&self) -> FormData {
        FormData::new()
            .with("name", self.name.as_str())
            .with("framerate", self.framerate.as_str())
            .with("frameskip", self.frame_skip.as_str())
            .with("videospeed", self.video_speed.as_str())
            .with("axesColor", self.axes_color.as_str())
            .with("pointsForward", self.points_forward.as_str())
            .with("pointsBackward", self.points_backward.as_str())
    }

    pub fn new_project_form(&self) -> Result<NewProjectForm, FormError> {
        NewProjectForm::parse(&self.project_data())
    }

    pub fn edit_project_form(&self) -> Result<EditProjectForm, FormError> {
        EditProjectForm::parse(&self.project_data())
    }

    pub fn auto_track_form(&self, frame_count: usize) -> Result<AutoTrackForm, FormError> {
        let data = FormData::new()
            .with("algorithm", self.algorithm.to_string())
            .with("startFrame", self.start_frame.as_str())
            .with("endFrame", self.end_frame.as_str())
            .with("searchMargin", self.search_margin.as_str())
            .with("templateUpdateInterval", self.template_update_interval.as_str());
        AutoTrackForm::parse(&data, frame_count)
    }

    /// Record a parse failure, or clear the last one and hand back the form.
    fn checked<T>(&mut self, parsed: Result<T, FormError>) -> Option<T> {
        match parsed {
            Ok(form) => {
                self.error = None;
                Some(form)
            }
            Err(e) => {
                self.error = Some(e.to_string());
                None
            }
        }
    }
}

/// Read-only tracking state shown in the panel.
#[derive(Debug, Clone, Default)]
pub struct TrackingStatus {
    /// (processed, total) of the run in progress.
    pub progress: Option<(usize, usize)>,
    pub message: Option<String>,
    pub can_resume: bool,
    pub roi: Option<Roi>,
    /// Points the configured run would overwrite.
    pub overwrites: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertiesAction {
    CreateProject(NewProjectForm),
    EditProject(EditProjectForm),
    NewTrack,
    SelectTrack(TrackId),
    SetHidden(TrackId, bool),
    DeleteTrack(TrackId),
    EditTrack(TrackId, TrackForm),
    SetScaleText(String),
    EditScale(ScaleForm),
    DeleteScale,
    StartTracking(AutoTrackForm),
    CancelTracking,
    ResumeTracking,
    DismissTracking,
}

pub fn show(
    ui: &mut egui::Ui,
    project: Option<&Project>,
    state: &mut PropertiesState,
    tracking: &TrackingStatus,
) -> Vec<PropertiesAction> {
    let mut actions = Vec::new();

    ui.heading("Properties");
    ui.separator();

    let Some(project) = project else {
        ui.label("No project loaded");
        return actions;
    };

    if let Some(error) = &state.error {
        ui.colored_label(egui::Color32::LIGHT_RED, error);
    }

    egui::ScrollArea::vertical().show(ui, |ui| {
        egui::CollapsingHeader::new("Project").default_open(state.creating).show(ui, |ui| {
            project_settings(ui, state, &mut actions);
        });
        egui::CollapsingHeader::new("Tracks").default_open(true).show(ui, |ui| {
            track_list(ui, project, state, &mut actions);
        });
        egui::CollapsingHeader::new("Scale").default_open(true).show(ui, |ui| {
            scale_settings(ui, project, state, &mut actions);
        });
        egui::CollapsingHeader::new("Auto-track").default_open(true).show(ui, |ui| {
            auto_track(ui, project, state, tracking, &mut actions);
        });
        egui::CollapsingHeader::new("Data").default_open(false).show(ui, |ui| {
            data_preview(ui, project);
        });
    });

    actions
}

fn text_row(ui: &mut egui::Ui, label: &str, value: &mut String) {
    ui.horizontal(|ui| {
        ui.label(label);
        ui.text_edit_singleline(value);
    });
}

fn project_settings(ui: &mut egui::Ui, state: &mut PropertiesState, actions: &mut Vec<PropertiesAction>) {
    text_row(ui, "Name", &mut state.name);
    if state.creating {
        text_row(ui, "Frame rate", &mut state.framerate);
        text_row(ui, "Video speed", &mut state.video_speed);
    } else {
        ui.label(format!("{} fps, speed x{}", state.framerate, state.video_speed));
    }
    text_row(ui, "Frame skip", &mut state.frame_skip);
    text_row(ui, "Axes color", &mut state.axes_color);
    text_row(ui, "Points ahead", &mut state.points_forward);
    text_row(ui, "Points behind", &mut state.points_backward);

    if state.creating {
        if ui.button("Create project").clicked() {
            let parsed = state.new_project_form();
            if let Some(form) = state.checked(parsed) {
                actions.push(PropertiesAction::CreateProject(form));
            }
        }
    } else if ui.button("Apply").clicked() {
        let parsed = state.edit_project_form();
        if let Some(form) = state.checked(parsed) {
            actions.push(PropertiesAction::EditProject(form));
        }
    }
}

fn track_list(ui: &mut egui::Ui, project: &Project, state: &mut PropertiesState, actions: &mut Vec<PropertiesAction>) {
    let active = project.active_track_id();
    for track in project.tracks() {
        ui.horizontal(|ui| {
            let mut visible = !track.is_hidden();
            if ui.checkbox(&mut visible, "").on_hover_text("Show track").changed() {
                actions.push(PropertiesAction::SetHidden(track.uid.clone(), !visible));
            }
            let label = egui::RichText::new(format!("{} ({} points)", track.name, track.len()))
                .color(crate::ui::parse_color(&track.color));
            if ui.selectable_label(active == Some(&track.uid), label).clicked() {
                actions.push(PropertiesAction::SelectTrack(track.uid.clone()));
            }
            if ui.small_button("🗑").on_hover_text("Delete track").clicked() {
                actions.push(PropertiesAction::DeleteTrack(track.uid.clone()));
            }
        });
    }
    if ui.button("➕ New track").clicked() {
        actions.push(PropertiesAction::NewTrack);
    }

    if let Some(uid) = active {
        ui.separator();
        text_row(ui, "Name", &mut state.track_name);
        text_row(ui, "Color", &mut state.track_color);
        if ui.button("Update track").clicked() {
            let data = FormData::new()
                .with("name", state.track_name.as_str())
                .with("color", state.track_color.as_str());
            if let Some(form) = state.checked(TrackForm::parse(&data)) {
                actions.push(PropertiesAction::EditTrack(uid.clone(), form));
            }
        }
    }
}

fn scale_settings(ui: &mut egui::Ui, project: &Project, state: &mut PropertiesState, actions: &mut Vec<PropertiesAction>) {
    let Some(scale) = project.scale() else {
        ui.label("Draw a scale with the Scale tool.");
        return;
    };
    ui.label(format!("{:.1} px", scale.pixel_length()));
    ui.horizontal(|ui| {
        ui.label("Length");
        let response = ui.text_edit_singleline(&mut state.scale_text);
        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            actions.push(PropertiesAction::SetScaleText(state.scale_text.clone()));
        }
    });
    text_row(ui, "Color", &mut state.scale_color);
    ui.horizontal(|ui| {
        if ui.button("Update color").clicked() {
            match ScaleForm::parse(&FormData::new().with("color", state.scale_color.as_str())) {
                Ok(form) => actions.push(PropertiesAction::EditScale(form)),
                Err(e) => state.error = Some(e.to_string()),
            }
        }
        if ui.button("Delete scale").clicked() {
            actions.push(PropertiesAction::DeleteScale);
        }
    });
}

fn auto_track(
    ui: &mut egui::Ui,
    project: &Project,
    state: &mut PropertiesState,
    tracking: &TrackingStatus,
    actions: &mut Vec<PropertiesAction>,
) {
    if let Some((processed, total)) = tracking.progress {
        let fraction = if total == 0 { 0.0 } else { processed as f32 / total as f32 };
        ui.add(egui::ProgressBar::new(fraction).text(format!("{} / {}", processed, total)));
        if ui.button("Cancel").clicked() {
            actions.push(PropertiesAction::CancelTracking);
        }
        return;
    }

    if let Some(message) = &tracking.message {
        ui.label(message);
        ui.horizontal(|ui| {
            if tracking.can_resume && ui.button("Resume from last good frame").clicked() {
                actions.push(PropertiesAction::ResumeTracking);
            }
            if ui.button("OK").clicked() {
                actions.push(PropertiesAction::DismissTracking);
            }
        });
        ui.separator();
    }

    egui::ComboBox::from_label("Algorithm")
        .selected_text(state.algorithm.to_string())
        .show_ui(ui, |ui| {
            ui.selectable_value(&mut state.algorithm, Algorithm::Template, "template");
            ui.selectable_value(&mut state.algorithm, Algorithm::OpticalFlow, "optical-flow");
        });
    text_row(ui, "Start frame", &mut state.start_frame);
    text_row(ui, "End frame", &mut state.end_frame);
    text_row(ui, "Search margin", &mut state.search_margin);
    if state.algorithm == Algorithm::Template {
        text_row(ui, "Template refresh", &mut state.template_update_interval);
    }

    match tracking.roi {
        Some(roi) => ui.label(format!(
            "Region {:.0}x{:.0} at ({:.0}, {:.0})",
            roi.width, roi.height, roi.x, roi.y
        )),
        None => ui.label("Draw a region with the Auto-track ROI tool."),
    };
    if tracking.overwrites > 0 {
        ui.colored_label(
            egui::Color32::YELLOW,
            format!("{} existing points in this range will be replaced.", tracking.overwrites),
        );
    }

    let ready = tracking.roi.is_some() && project.active_track().is_some();
    if ui.add_enabled(ready, egui::Button::new("Start tracking")).clicked() {
        let parsed = state.auto_track_form(project.timeline.frame_count());
        if let Some(form) = state.checked(parsed) {
            actions.push(PropertiesAction::StartTracking(form));
        }
    }
}

fn data_preview(ui: &mut egui::Ui, project: &Project) {
    let Some(export) = project.active_track_id().and_then(|uid| project.export_track(uid)) else {
        ui.label("No active track");
        return;
    };
    if export.rows.is_empty() {
        ui.label("Place axes to see data.");
        return;
    }
    egui::Grid::new("data_preview").striped(true).show(ui, |ui| {
        ui.label("t (s)");
        ui.label(format!("x ({})", export.unit));
        ui.label(format!("y ({})", export.unit));
        ui.end_row();
        for row in export.rows.iter().take(PREVIEW_ROWS) {
            ui.label(row.t.to_string());
            ui.label(row.scaled.x.to_string());
            ui.label(row.scaled.y.to_string());
            ui.end_row();
        }
    });
    if export.rows.len() > PREVIEW_ROWS {
        ui.label(format!("… {} more rows", export.rows.len() - PREVIEW_ROWS));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidtrack::models::frame::FrameIndex;
    use vidtrack::VideoInfo;

    fn project() -> Project {
        let video = VideoInfo {
            name: "clip".to_string(),
            width: 640,
            height: 480,
            duration: 4.0,
        };
        Project::new("clip", video, 25.0).unwrap()
    }

    #[test]
    fn test_settings_reach_auto_track_form() {
        let tracking = TrackingSettings {
            algorithm: Algorithm::OpticalFlow,
            search_margin: 35,
            template_update_interval: 4,
            ..TrackingSettings::default()
        };
        let mut state = PropertiesState::new(&tracking);
        state.begin_project(&project());
        state.set_tracking_range(3, 30);

        let form = state.auto_track_form(100).unwrap();
        assert_eq!(form.algorithm, Algorithm::OpticalFlow);
        assert_eq!(form.search_margin, 35);
        assert_eq!(form.template_update_interval, 4);
        assert_eq!(form.start_frame, FrameIndex(3));
        assert_eq!(form.end_frame, FrameIndex(30));

        // Reloading the project keeps the tuning.
        state.sync(&project());
        assert_eq!(state.auto_track_form(100).unwrap().search_margin, 35);
    }

    #[test]
    fn test_project_forms_follow_creation_state() {
        let mut project = project();
        let mut state = PropertiesState::new(&TrackingSettings::default());
        state.begin_project(&project);
        assert!(state.is_creating());

        state.framerate = "50".to_string();
        let created = state.new_project_form().unwrap();
        assert_eq!(created.framerate, 50.0);
        project.apply_new_project(&created).unwrap();
        state.sync(&project);
        assert!(!state.is_creating());
        assert_eq!(state.framerate, "50");

        state.name = "Renamed".to_string();
        state.frame_skip = "2".to_string();
        state.axes_color = "#00ff00".to_string();
        let edit = state.edit_project_form().unwrap();
        project.apply_edit_project(&edit);
        assert_eq!(project.name, "Renamed");
        assert_eq!(project.timeline.frame_skip, 2);
        assert_eq!(project.axes_color, "#00ff00");

        state.frame_skip = "0".to_string();
        let parsed = state.edit_project_form();
        assert!(state.checked(parsed).is_none());
        assert!(state.error.is_some());
    }
}
