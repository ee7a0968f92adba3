// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

use image::{Rgba, RgbaImage};
use vidtrack::io::media::{FrameSource, ImageSequenceSource};
use vidtrack::io::serialization::{self, Format};
use vidtrack::models::frame::FrameIndex;
use vidtrack::models::project::DEFAULT_AXES_COLOR;
use vidtrack::tracking::engine::TrackingRun;
use vidtrack::tracking::session::{drive_run, DEFAULT_CONFIDENCE_THRESHOLD};
use vidtrack::tracking::{Algorithm, CancelSignal, Roi, RunOutcome, TrackingConfig};
use vidtrack::util::geometry::Coordinate;
use vidtrack::{Project, VideoInfo};

fn video(width: u32, height: u32, duration: f64) -> VideoInfo {
    VideoInfo {
        name: "clip".to_string(),
        width,
        height,
        duration,
    }
}

/// Dark frame with a textured bright square whose top-left is (x, 24).
fn square_frame(x: i64) -> RgbaImage {
    RgbaImage::from_fn(100, 60, |px, py| {
        let (dx, dy) = (i64::from(px) - x, i64::from(py) - 24);
        if (0..12).contains(&dx) && (0..12).contains(&dy) {
            let v = if (dx / 3 + dy / 3) % 2 == 0 { 230 } else { 150 };
            Rgba([v, v, v, 255])
        } else {
            Rgba([20, 20, 20, 255])
        }
    })
}

#[test]
fn test_manual_marking_converts_to_physical_units() {
    let mut project = Project::new("drop", video(640, 480, 10.0), 30.0).unwrap();
    let uid = project.new_track("Ball", "#ff0000", true);
    project.new_axes(100.0, 100.0, DEFAULT_AXES_COLOR, true);
    project.new_scale(
        Some("2 m"),
        Coordinate::new(0.0, 100.0),
        Coordinate::new(200.0, 100.0),
        "#39ff14",
    );

    project.add_point(FrameIndex(0), 150.0, 100.0).unwrap();
    let export = project.export_track(&uid).unwrap();
    assert_eq!(export.unit, "m");
    assert_eq!(export.rows.len(), 1);
    assert_eq!(export.rows[0].pixels, Coordinate::new(50.0, 0.0));
    assert_eq!(export.rows[0].scaled, Coordinate::new(0.5, 0.0));
    assert!(!project.is_saved());

    let marked = project.track(&uid).unwrap().point(FrameIndex(0)).unwrap().position();

    assert!(project.undo());
    assert!(project.export_track(&uid).unwrap().rows.is_empty());
    assert!(project.track(&uid).unwrap().point(FrameIndex(0)).is_none());

    assert!(project.redo());
    let restored = project.track(&uid).unwrap().point(FrameIndex(0)).unwrap();
    assert_eq!(restored.position(), marked);
    assert_eq!(restored.position(), Coordinate::new(150.0, 100.0));
    assert_eq!(project.export_track(&uid).unwrap(), export);
}

#[tokio::test]
async fn test_auto_tracking_commits_as_one_undo_step() {
    let frames: Vec<RgbaImage> = (0..8).map(|i| square_frame(30 + 2 * i)).collect();
    let source = ImageSequenceSource::new(frames, 10.0);
    let (width, height) = source.dimensions();
    let mut project = Project::new("slide", video(width, height, source.duration()), 10.0).unwrap();
    let uid = project.new_track("Puck", "#00ffff", true);
    project.new_axes(0.0, 0.0, DEFAULT_AXES_COLOR, true);
    project.add_point(FrameIndex(0), 36.0, 30.0).unwrap();

    let config = TrackingConfig::for_timeline(
        &project.timeline,
        Roi::centered_on(Coordinate::new(36.0, 30.0), 20.0, 20.0),
        FrameIndex(0),
        FrameIndex(5),
        Algorithm::Template,
    );
    assert_eq!(project.count_existing_points(&uid, config.start_frame, config.end_frame), 0);

    let mut run = TrackingRun::new(source, config, CancelSignal::new());
    let mut last_progress = (0, 0);
    let summary = drive_run(&mut run, DEFAULT_CONFIDENCE_THRESHOLD, |done, total| last_progress = (done, total)).await;
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(last_progress, (5, 5));
    assert_eq!(summary.results.len(), 5);
    for (i, result) in summary.results.iter().enumerate() {
        let expected = 36.0 + 2.0 * (i + 1) as f64;
        assert!((result.x - expected).abs() <= 1.0, "{result:?}");
        assert!((result.y - 30.0).abs() <= 1.0, "{result:?}");
    }

    let depth = project.history().undo_len();
    assert_eq!(project.commit_tracking(&uid, &summary.results).unwrap(), 5);
    assert_eq!(project.history().undo_len(), depth + 1);
    assert_eq!(project.export_track(&uid).unwrap().rows.len(), 6);

    project.undo();
    assert_eq!(project.track(&uid).unwrap().len(), 1);
    project.redo();
    assert_eq!(project.track(&uid).unwrap().len(), 6);
}

#[test]
fn test_saved_project_reloads_with_same_data() {
    let info = video(640, 480, 2.0);
    let mut project = Project::new("swing", info.clone(), 30.0).unwrap();
    let uid = project.new_track("Bob", "#ffa500", true);
    project.new_axes(320.0, 240.0, DEFAULT_AXES_COLOR, true);
    project.rotate_axes(0.25).unwrap();
    project.new_scale(
        Some("50 cm"),
        Coordinate::new(10.0, 10.0),
        Coordinate::new(110.0, 10.0),
        "#39ff14",
    );
    for frame in 0..5 {
        project
            .add_point(FrameIndex(frame), 300.0 + 4.0 * frame as f64, 250.0)
            .unwrap();
    }
    let before = project.export_track(&uid).unwrap();

    for format in [Format::Json, Format::Yaml] {
        let text = serialization::to_string(&project, format).unwrap();
        let loaded = serialization::from_str(&text, format, info.clone()).unwrap();
        assert!(loaded.is_saved());
        assert!(!loaded.history().can_undo());
        let after = loaded.export_track(loaded.active_track_id().unwrap()).unwrap();
        assert_eq!(after, before);
    }
}
