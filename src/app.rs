// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Main application state and egui App implementation.
//!
//! The app owns the project, the frame source and a current-thread tokio
//! runtime. Frame seeks for display are awaited on that runtime, and an
//! auto-tracking run is advanced by one event per repaint so the UI keeps
//! responding while it works.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::RgbaImage;

use vidtrack::config::Settings;
use vidtrack::io::form::AutoTrackForm;
use vidtrack::io::media::{self, FrameSource};
use vidtrack::io::serialization;
use vidtrack::models::frame::FrameIndex;
use vidtrack::models::project::{Project, VideoInfo};
use vidtrack::models::timeline::PlayOptions;
use vidtrack::models::track::TrackId;
use vidtrack::tracking::engine::TrackingRun;
use vidtrack::tracking::session::{RunSummary, SessionCollector};
use vidtrack::tracking::{CancelSignal, TrackingConfig};
use vidtrack::util::geometry::Coordinate;

use crate::ui::canvas::{self, CanvasAction, CanvasState};
use crate::ui::properties::{self, PropertiesAction, PropertiesState, TrackingStatus};
use crate::ui::timeline::{self, TimelineAction};
use crate::ui::toolbar;

/// Nominal rate for image sequences, which carry no timing.
const IMAGE_SEQUENCE_FPS: f64 = 30.0;
const ZOOM_STEP: f64 = 1.25;
const PLAYBACK_REPAINT: Duration = Duration::from_millis(10);

/// Current canvas tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Select,
    AddPoint,
    Axes,
    Scale,
    TrackRoi,
}

/// A tracking run in progress. The run owns the frame source until it
/// finishes.
struct ActiveRun {
    run: TrackingRun<Box<dyn FrameSource>>,
    collector: SessionCollector,
    track: TrackId,
}

/// Main application state.
pub struct VidtrackApp {
    settings: Settings,
    runtime: tokio::runtime::Runtime,
    current_tool: Tool,
    project: Option<Project>,
    /// `None` while a tracking run holds it.
    source: Option<Box<dyn FrameSource>>,
    texture: Option<egui::TextureHandle>,
    shown_frame: Option<FrameIndex>,
    project_path: Option<PathBuf>,
    canvas: CanvasState,
    canvas_size: Option<(f64, f64)>,
    properties: PropertiesState,
    active_run: Option<ActiveRun>,
    /// Last finished run, kept for the resume prompt.
    last_run: Option<(TrackId, RunSummary)>,
    status: Option<String>,
    title: String,
}

impl VidtrackApp {
    pub fn new(settings: Settings) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .context("Failed to start the async runtime")?;
        let properties = PropertiesState::new(&settings.tracking);
        Ok(Self {
            settings,
            runtime,
            current_tool: Tool::Select,
            project: None,
            source: None,
            texture: None,
            shown_frame: None,
            project_path: None,
            canvas: CanvasState::default(),
            canvas_size: None,
            properties,
            active_run: None,
            last_run: None,
            status: None,
            title: String::new(),
        })
    }

    fn report_error(&mut self, context: &str, error: anyhow::Error) {
        log::error!("{}: {:#}", context, error);
        self.status = Some(format!("{}: {:#}", context, error));
    }

    /// Start a fresh project on a newly opened source.
    fn install_source(&mut self, source: Box<dyn FrameSource>, name: &str, fps: f64) -> Result<()> {
        let (width, height) = source.dimensions();
        let video = VideoInfo {
            name: name.to_string(),
            width,
            height,
            duration: source.duration(),
        };
        let mut project = Project::new(name, video, fps)?;
        project.view_points = self.settings.view_points();
        project.axes_color = self.settings.axes_color.clone();
        project.timeline.set_play_interval(self.settings.play_interval());
        project.new_track("Track 1", self.settings.track_color(0), true);
        project.clear_history();
        project.mark_saved();

        self.properties.begin_project(&project);
        self.project = Some(project);
        self.source = Some(source);
        self.shown_frame = None;
        self.project_path = None;
        self.canvas = CanvasState::default();
        self.canvas_size = None;
        self.last_run = None;
        self.status = Some(format!("Opened {}", name));
        Ok(())
    }

    fn open_image_sequence(&mut self, dir: PathBuf) {
        let result = media::load_image_sequence(&dir, IMAGE_SEQUENCE_FPS).and_then(|source| {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "sequence".to_string());
            self.install_source(Box::new(source), &name, IMAGE_SEQUENCE_FPS)
        });
        if let Err(e) = result {
            self.report_error("Failed to open image sequence", e);
        }
    }

    fn open_image(&mut self, path: PathBuf) {
        let result = media::load_image(&path).and_then(|source| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "image".to_string());
            let fps = source.fps();
            self.install_source(Box::new(source), &name, fps)
        });
        if let Err(e) = result {
            self.report_error("Failed to open image", e);
        }
    }

    #[cfg(feature = "video-opencv")]
    fn open_video(&mut self, path: PathBuf) {
        let result = (|| -> Result<()> {
            let path_str = path.to_str().context("Video path is not valid UTF-8")?;
            let mut source = media::OpencvSource::open(path_str)?;
            let mut fps = source.fps();
            let timeout = self.settings.tracking.seek_timeout();
            match self
                .runtime
                .block_on(vidtrack::models::timeline::detect_frame_rate(&mut source, timeout))
            {
                Ok(Some(detected)) if (detected - fps).abs() > 0.5 => {
                    log::warn!("Container reports {} fps, frames change at {} fps", fps, detected);
                    fps = detected;
                }
                Ok(_) => {}
                Err(e) => log::warn!("Frame rate detection failed: {}", e),
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "video".to_string());
            self.install_source(Box::new(source), &name, fps)
        })();
        if let Err(e) = result {
            self.report_error("Failed to open video", e);
        }
    }

    #[cfg(feature = "video-opencv")]
    fn open_video_item(&mut self, ui: &mut egui::Ui, enabled: bool) {
        if ui.add_enabled(enabled, egui::Button::new("Open Video...")).clicked() {
            if let Some(path) = rfd::FileDialog::new()
                .add_filter("Videos", &["mp4", "avi", "mov", "mkv", "webm"])
                .pick_file()
            {
                self.open_video(path);
            }
            ui.close_menu();
        }
    }

    #[cfg(not(feature = "video-opencv"))]
    fn open_video_item(&mut self, _ui: &mut egui::Ui, _enabled: bool) {}

    fn load_project(&mut self, path: PathBuf) {
        let Some(video) = self.project.as_ref().map(|p| p.video.clone()) else {
            self.status = Some("Open the project's video before loading it".to_string());
            return;
        };
        match serialization::load(&path, video) {
            Ok(mut project) => {
                project.timeline.set_play_interval(self.settings.play_interval());
                if let Some((width, height)) = self.canvas_size {
                    project.fit_to(width, height);
                }
                self.properties.sync(&project);
                self.status = Some(format!("Loaded {}", path.display()));
                self.project = Some(project);
                self.project_path = Some(path);
                self.shown_frame = None;
                self.last_run = None;
            }
            Err(e) => self.report_error("Failed to load project", e),
        }
    }

    fn save_project(&mut self, path: PathBuf) {
        let Some(project) = self.project.as_mut() else {
            return;
        };
        match serialization::save(project, &path) {
            Ok(()) => {
                self.status = Some(format!("Saved {}", path.display()));
                self.project_path = Some(path);
            }
            Err(e) => self.report_error("Failed to save project", e),
        }
    }

    fn set_texture(&mut self, ctx: &egui::Context, image: &RgbaImage) {
        let size = [image.width() as usize, image.height() as usize];
        let color_image = egui::ColorImage::from_rgba_unmultiplied(size, image.as_raw());
        match &mut self.texture {
            Some(texture) => texture.set(color_image, egui::TextureOptions::LINEAR),
            None => {
                self.texture = Some(ctx.load_texture("frame", color_image, egui::TextureOptions::LINEAR));
            }
        }
    }

    /// Decode the current frame if it is not the one on screen.
    fn refresh_frame(&mut self, ctx: &egui::Context) {
        let (Some(project), Some(source)) = (self.project.as_ref(), self.source.as_mut()) else {
            return;
        };
        let frame = project.timeline.current_frame();
        if self.shown_frame == Some(frame) {
            return;
        }
        self.shown_frame = Some(frame);
        let time = project.timeline.frame_start(frame);
        let timeout = self.settings.tracking.seek_timeout();
        let seek = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, source.seek(time)).await });
        let image = match seek {
            Ok(Ok(())) => source.current_image(),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                log::warn!("Frame {} did not load within {:?}", frame, timeout);
                return;
            }
        };
        match image {
            Ok(image) => self.set_texture(ctx, &image),
            Err(e) => log::error!("Failed to show frame {}: {}", frame, e),
        }
    }

    fn seek(&mut self, frame: FrameIndex) {
        if let Some(project) = self.project.as_mut() {
            project.timeline.seek(frame);
            project.update();
        }
    }

    fn undo(&mut self) {
        if let Some(project) = self.project.as_mut() {
            if project.undo() {
                self.properties.sync_track(project);
                self.properties.sync_scale(project);
            }
        }
    }

    fn redo(&mut self) {
        if let Some(project) = self.project.as_mut() {
            if project.redo() {
                self.properties.sync_track(project);
                self.properties.sync_scale(project);
            }
        }
    }

    fn zoom_view(&mut self, factor: f64) {
        let (Some(project), Some((w, h))) = (self.project.as_mut(), self.canvas_size) else {
            return;
        };
        project.zoom_at(Coordinate::new(w / 2.0, h / 2.0), factor);
    }

    fn fit_view(&mut self) {
        if let (Some(project), Some((w, h))) = (self.project.as_mut(), self.canvas_size) {
            project.fit_to(w, h);
        }
    }

    // ----- auto-tracking -----

    fn start_tracking(&mut self, mut config: TrackingConfig) {
        if self.active_run.is_some() {
            return;
        }
        let Some(project) = self.project.as_ref() else {
            return;
        };
        let Some(track) = project.active_track_id().cloned() else {
            self.status = Some("Select a track to auto-track into".to_string());
            return;
        };
        let Some(source) = self.source.take() else {
            return;
        };
        config.seek_timeout = self.settings.tracking.seek_timeout();
        log::info!(
            "Auto-tracking {} frames {}..{} with {}",
            track,
            config.start_frame,
            config.end_frame,
            config.algorithm
        );
        let collector = SessionCollector::new(config.clone(), self.settings.tracking.confidence_threshold);
        self.active_run = Some(ActiveRun {
            run: TrackingRun::new(source, config, CancelSignal::new()),
            collector,
            track,
        });
        self.last_run = None;
        self.status = None;
    }

    fn start_tracking_from_form(&mut self, form: &AutoTrackForm) {
        let (Some(project), Some(roi)) = (self.project.as_ref(), self.canvas.roi) else {
            return;
        };
        let config = form.to_config(&project.timeline, roi);
        self.start_tracking(config);
    }

    fn resume_tracking(&mut self) {
        let Some((_, summary)) = self.last_run.take() else {
            return;
        };
        let Some(request) = summary.resume_request() else {
            return;
        };
        self.canvas.roi = Some(request.roi);
        self.properties
            .set_tracking_range(request.start_frame.0, request.end_frame.0);
        self.start_tracking(request.to_config(&summary.config));
    }

    /// Advance the active run by one event.
    fn step_tracking(&mut self, ctx: &egui::Context) {
        let Some(active) = self.active_run.as_mut() else {
            return;
        };
        let finished = match self.runtime.block_on(active.run.next()) {
            None => true,
            Some(event) => active.collector.observe(event).is_break(),
        };
        let image = active.run.source().current_image();
        if let Ok(image) = image {
            self.set_texture(ctx, &image);
        }
        if finished {
            self.finish_tracking();
        }
        ctx.request_repaint();
    }

    fn finish_tracking(&mut self) {
        let Some(active) = self.active_run.take() else {
            return;
        };
        let outcome = active.run.outcome().cloned();
        self.source = Some(active.run.into_source());
        self.shown_frame = None;
        let summary = active.collector.finish(outcome);
        log::info!("{}", summary.message());

        if let Some(project) = self.project.as_mut() {
            match project.commit_tracking(&active.track, &summary.results) {
                Ok(count) => {
                    if let Some(last) = summary.last_good {
                        project.timeline.seek(last.frame);
                        project.update();
                    }
                    log::debug!("Committed {} points", count);
                }
                Err(e) => log::error!("Failed to commit tracking results: {}", e),
            }
        }
        self.last_run = Some((active.track, summary));
    }

    fn tracking_status(&self) -> TrackingStatus {
        let overwrites = match (self.project.as_ref(), self.canvas.roi) {
            (Some(project), Some(_)) => project
                .active_track_id()
                .map(|uid| {
                    project.count_existing_points(uid, project.timeline.current_frame(), project.timeline.end_frame())
                })
                .unwrap_or(0),
            _ => 0,
        };
        TrackingStatus {
            progress: self.active_run.as_ref().map(|a| a.collector.progress()),
            message: self.last_run.as_ref().map(|(_, s)| s.message()),
            can_resume: self
                .last_run
                .as_ref()
                .is_some_and(|(_, s)| s.resume_request().is_some()),
            roi: self.canvas.roi,
            overwrites,
        }
    }

    // ----- action routing -----

    fn handle_canvas_action(&mut self, action: CanvasAction) {
        let tracking = self.active_run.is_some();
        let Some(project) = self.project.as_mut() else {
            return;
        };
        match action {
            CanvasAction::Resized { width, height } => {
                self.canvas_size = Some((width, height));
                project.fit_to(width, height);
            }
            CanvasAction::Zoom { anchor, factor } => project.zoom_at(anchor, factor),
            CanvasAction::Pan { dx, dy } => project.pan_by(dx, dy),
            _ if tracking => {}
            CanvasAction::AddPoint(pixel) => {
                let frame = project.timeline.current_frame();
                match project.add_point(frame, pixel.x, pixel.y) {
                    Ok(_) => {
                        if let Some(next) = project.timeline.next() {
                            project.timeline.seek(next);
                            project.update();
                        }
                    }
                    Err(e) => self.status = Some(e.to_string()),
                }
            }
            CanvasAction::SelectPoint(frame) => {
                project.select_point(frame);
            }
            CanvasAction::PlaceAxes(pixel) => {
                let color = project.axes_color.clone();
                project.new_axes(pixel.x, pixel.y, color, true);
            }
            CanvasAction::MoveAxesLive(to) => {
                project.set_axes_origin(to);
            }
            CanvasAction::MoveAxes { from, to } => {
                project.set_axes_origin(from);
                if let Err(e) = project.move_axes(to) {
                    log::warn!("{}", e);
                }
            }
            CanvasAction::RotateAxesLive(theta) => {
                project.set_axes_rotation(theta);
            }
            CanvasAction::RotateAxes { from, to } => {
                project.set_axes_rotation(from);
                if let Err(e) = project.rotate_axes(to) {
                    log::warn!("{}", e);
                }
            }
            CanvasAction::MoveScaleEndpointLive { index, to } => {
                project.set_scale_endpoint(index, to);
            }
            CanvasAction::MoveScaleEndpoint { index, from, to } => {
                project.set_scale_endpoint(index, from);
                if let Err(e) = project.move_scale_endpoint(index, to) {
                    log::warn!("{}", e);
                }
            }
            CanvasAction::NewScale(a, b) => {
                let text = project.scale().map(|s| s.text().to_string());
                project.new_scale(text.as_deref(), a, b, self.settings.scale_color.clone());
                self.properties.sync_scale(project);
            }
            CanvasAction::RoiDrawn(roi) => {
                log::debug!("Tracking region {:?}", roi);
                let start = project.timeline.current_frame().0;
                let end = project.timeline.end_frame().0;
                self.properties.set_tracking_range(start, end);
            }
        }
    }

    fn handle_properties_action(&mut self, action: PropertiesAction) {
        match action {
            PropertiesAction::CancelTracking => {
                if let Some(active) = &self.active_run {
                    active.run.cancel_signal().cancel();
                }
                return;
            }
            PropertiesAction::StartTracking(form) => {
                self.start_tracking_from_form(&form);
                return;
            }
            PropertiesAction::ResumeTracking => {
                self.resume_tracking();
                return;
            }
            PropertiesAction::DismissTracking => {
                self.last_run = None;
                return;
            }
            _ if self.active_run.is_some() => return,
            _ => {}
        }

        let Some(project) = self.project.as_mut() else {
            return;
        };
        let reload = matches!(action, PropertiesAction::CreateProject(_) | PropertiesAction::EditProject(_));
        let result: Result<(), String> = match action {
            PropertiesAction::CreateProject(form) => project.apply_new_project(&form).map_err(|e| e.to_string()),
            PropertiesAction::EditProject(form) => {
                project.apply_edit_project(&form);
                Ok(())
            }
            PropertiesAction::NewTrack => {
                let index = project.tracks().count();
                let name = format!("Track {}", index + 1);
                project.new_track(name, self.settings.track_color(index), true);
                Ok(())
            }
            PropertiesAction::SelectTrack(uid) => {
                project.select_track(&uid);
                Ok(())
            }
            PropertiesAction::SetHidden(uid, hidden) => project.set_track_hidden(&uid, hidden).map_err(|e| e.to_string()),
            PropertiesAction::DeleteTrack(uid) => {
                project.delete_track(&uid);
                Ok(())
            }
            PropertiesAction::EditTrack(uid, form) => project.edit_track(&uid, &form).map_err(|e| e.to_string()),
            PropertiesAction::SetScaleText(text) => project.set_scale_text(&text).map(|_| ()).map_err(|e| e.to_string()),
            PropertiesAction::EditScale(form) => project.edit_scale(&form).map_err(|e| e.to_string()),
            PropertiesAction::DeleteScale => {
                project.delete_scale();
                Ok(())
            }
            _ => Ok(()),
        };
        match result {
            Ok(()) if reload => self.properties.sync(project),
            Ok(()) => {}
            Err(e) => self.properties.set_error(e),
        }
        self.properties.sync_track(project);
        self.properties.sync_scale(project);
    }

    fn handle_timeline_action(&mut self, action: TimelineAction) {
        let Some(project) = self.project.as_mut() else {
            return;
        };
        match action {
            TimelineAction::Seek(frame) => {
                project.timeline.seek(frame);
                project.update();
            }
            TimelineAction::Prev => {
                if let Some(frame) = project.timeline.prev() {
                    project.timeline.seek(frame);
                    project.update();
                }
            }
            TimelineAction::Next => {
                if let Some(frame) = project.timeline.next() {
                    project.timeline.seek(frame);
                    project.update();
                }
            }
            TimelineAction::Play => {
                project.timeline.play(PlayOptions::default());
            }
            TimelineAction::Pause => project.timeline.pause(),
            TimelineAction::SetRange(start, end) => {
                project.timeline.set_range(start, end);
                project.changed();
            }
        }
    }

    fn handle_keys(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() || self.active_run.is_some() {
            return;
        }
        if ctx.input(|i| i.modifiers.command && i.key_pressed(egui::Key::Z) && !i.modifiers.shift) {
            self.undo();
        }
        if ctx.input(|i| {
            (i.modifiers.command && i.modifiers.shift && i.key_pressed(egui::Key::Z))
                || (i.modifiers.command && i.key_pressed(egui::Key::Y))
        }) {
            self.redo();
        }
        if ctx.input(|i| i.key_pressed(egui::Key::ArrowRight)) {
            self.handle_timeline_action(TimelineAction::Next);
        }
        if ctx.input(|i| i.key_pressed(egui::Key::ArrowLeft)) {
            self.handle_timeline_action(TimelineAction::Prev);
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Space)) {
            let playing = self.project.as_ref().is_some_and(|p| p.timeline.is_playing());
            self.handle_timeline_action(if playing {
                TimelineAction::Pause
            } else {
                TimelineAction::Play
            });
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Delete) || i.key_pressed(egui::Key::Backspace)) {
            if let Some(project) = self.project.as_mut() {
                let frame = project.timeline.current_frame();
                if let Err(e) = project.remove_point(frame) {
                    log::warn!("{}", e);
                }
            }
        }
    }

    fn update_title(&mut self, ctx: &egui::Context) {
        let title = match &self.project {
            Some(project) => format!(
                "{}{} - vidtrack",
                if project.is_saved() { "" } else { "*" },
                project.name
            ),
            None => "vidtrack".to_string(),
        };
        if title != self.title {
            ctx.send_viewport_cmd(egui::ViewportCommand::Title(title.clone()));
            self.title = title;
        }
    }

    fn menu_bar(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        let idle = self.active_run.is_none();
        egui::menu::bar(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.add_enabled(idle, egui::Button::new("Open Image Sequence...")).clicked() {
                    if let Some(dir) = rfd::FileDialog::new().pick_folder() {
                        self.open_image_sequence(dir);
                    }
                    ui.close_menu();
                }
                if ui.add_enabled(idle, egui::Button::new("Open Image...")).clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .add_filter("Images", &["png", "jpg", "jpeg", "bmp", "tif", "tiff"])
                        .pick_file()
                    {
                        self.open_image(path);
                    }
                    ui.close_menu();
                }
                self.open_video_item(ui, idle);
                ui.separator();
                let has_project = self.project.is_some();
                if ui
                    .add_enabled(idle && has_project, egui::Button::new("Load Project..."))
                    .clicked()
                {
                    if let Some(path) = rfd::FileDialog::new()
                        .add_filter("Projects", &["json", "jstrack", "yaml", "yml"])
                        .pick_file()
                    {
                        self.load_project(path);
                    }
                    ui.close_menu();
                }
                if ui.add_enabled(has_project, egui::Button::new("Save Project")).clicked() {
                    let path = self.project_path.clone().or_else(|| save_dialog(None));
                    if let Some(path) = path {
                        self.save_project(path);
                    }
                    ui.close_menu();
                }
                if ui.add_enabled(has_project, egui::Button::new("Save Project As...")).clicked() {
                    if let Some(path) = save_dialog(self.project_path.as_deref()) {
                        self.save_project(path);
                    }
                    ui.close_menu();
                }
                ui.separator();
                if ui.button("Quit").clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            });

            ui.menu_button("Edit", |ui| {
                let (undo_label, redo_label) = match &self.project {
                    Some(p) => (
                        p.history().next_undo_label().map(str::to_string),
                        p.history().next_redo_label().map(str::to_string),
                    ),
                    None => (None, None),
                };
                let undo_text = match &undo_label {
                    Some(label) => format!("Undo {} (Ctrl+Z)", label),
                    None => "Undo (Ctrl+Z)".to_string(),
                };
                if ui
                    .add_enabled(idle && undo_label.is_some(), egui::Button::new(undo_text))
                    .clicked()
                {
                    self.undo();
                    ui.close_menu();
                }
                let redo_text = match &redo_label {
                    Some(label) => format!("Redo {} (Ctrl+Shift+Z)", label),
                    None => "Redo (Ctrl+Shift+Z)".to_string(),
                };
                if ui
                    .add_enabled(idle && redo_label.is_some(), egui::Button::new(redo_text))
                    .clicked()
                {
                    self.redo();
                    ui.close_menu();
                }
            });

            ui.menu_button("View", |ui| {
                if ui.button("Zoom In").clicked() {
                    self.zoom_view(ZOOM_STEP);
                    ui.close_menu();
                }
                if ui.button("Zoom Out").clicked() {
                    self.zoom_view(1.0 / ZOOM_STEP);
                    ui.close_menu();
                }
                if ui.button("Fit").clicked() {
                    self.fit_view();
                    ui.close_menu();
                }
            });
        });
    }
}

fn save_dialog(current: Option<&Path>) -> Option<PathBuf> {
    let name = current
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project.json".to_string());
    rfd::FileDialog::new()
        .add_filter("JSON", &["json", "jstrack"])
        .add_filter("YAML", &["yaml", "yml"])
        .set_file_name(name)
        .save_file()
}

impl eframe::App for VidtrackApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.step_tracking(ctx);

        if let Some(project) = self.project.as_mut() {
            if project.timeline.is_playing() {
                project.tick(Instant::now());
                ctx.request_repaint_after(PLAYBACK_REPAINT);
            }
        }
        if self.active_run.is_none() {
            self.refresh_frame(ctx);
        }
        self.update_title(ctx);

        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            self.menu_bar(ctx, ui);
        });

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            toolbar::show(ui, &mut self.current_tool, self.active_run.is_some());
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(self.status.as_deref().unwrap_or("Ready"));
                if let Some(project) = &self.project {
                    ui.separator();
                    ui.label(if project.is_saved() { "Saved" } else { "Unsaved changes" });
                    ui.separator();
                    ui.label(format!("Zoom {:.0}%", project.viewport().zoom * 100.0));
                }
            });
        });

        let timeline_action = egui::TopBottomPanel::bottom("timeline")
            .show(ctx, |ui| {
                self.project
                    .as_ref()
                    .and_then(|p| timeline::show(ui, &p.timeline, self.active_run.is_none()))
            })
            .inner;
        if let Some(action) = timeline_action {
            self.handle_timeline_action(action);
        }

        let status = self.tracking_status();
        let properties_actions = egui::SidePanel::right("properties")
            .default_width(280.0)
            .show(ctx, |ui| {
                properties::show(ui, self.project.as_ref(), &mut self.properties, &status)
            })
            .inner;
        for action in properties_actions {
            self.handle_properties_action(action);
        }

        self.handle_keys(ctx);

        let canvas_actions = egui::CentralPanel::default()
            .show(ctx, |ui| {
                canvas::show(
                    ui,
                    self.project.as_ref(),
                    self.current_tool,
                    self.texture.as_ref(),
                    &mut self.canvas,
                )
            })
            .inner;
        for action in canvas_actions {
            self.handle_canvas_action(action);
        }
    }
}
