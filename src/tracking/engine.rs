// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Tracking run state machine.
//!
//! A run is seeded at `start_frame`, then for every following frame it
//! reports progress, waits for the source to seek (bounded by the
//! configured timeout), runs the selected tracker, reports the result and
//! yields to the scheduler. Cancellation is checked once per frame, before
//! any work for that frame starts.

use image::GrayImage;

use super::flow::{FlowStep, FlowTracker};
use super::template::{TemplateStep, TemplateTracker};
use super::{to_gray, Algorithm, CancelSignal, RunOutcome, TrackingConfig, TrackingError, TrackingEvent, TrackingResult};
use crate::io::media::FrameSource;
use crate::models::frame::FrameIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Seeded,
    /// Report progress for this frame next.
    Announce(FrameIndex),
    /// Track this frame next.
    Process(FrameIndex),
    Finished,
}

/// Why a frame could not be loaded.
enum Halt {
    TimedOut(FrameIndex),
    Error(TrackingError),
}

enum Tracker {
    Template(TemplateTracker),
    Flow(FlowTracker),
}

/// Result of one tracker step, normalised across algorithms.
struct Step {
    x: f64,
    y: f64,
    confidence: f64,
    lost: bool,
    inlier_ratio: Option<f64>,
}

impl Tracker {
    fn seed(config: &TrackingConfig, frame: &GrayImage) -> Result<Self, TrackingError> {
        Ok(match config.algorithm {
            Algorithm::Template => Tracker::Template(TemplateTracker::new(
                frame,
                &config.roi,
                config.search_margin,
                config.template_update_interval,
            )?),
            Algorithm::OpticalFlow => Tracker::Flow(FlowTracker::new(frame, &config.roi)?),
        })
    }

    fn step(&mut self, frame: &GrayImage) -> Step {
        match self {
            Tracker::Template(tracker) => match tracker.step(frame) {
                TemplateStep::Found { x, y, confidence } => Step {
                    x,
                    y,
                    confidence,
                    lost: false,
                    inlier_ratio: None,
                },
                TemplateStep::Lost { x, y } => Step {
                    x,
                    y,
                    confidence: 0.0,
                    lost: true,
                    inlier_ratio: None,
                },
            },
            Tracker::Flow(tracker) => match tracker.step(frame) {
                FlowStep::Tracked { x, y, confidence } => Step {
                    x,
                    y,
                    confidence,
                    lost: false,
                    inlier_ratio: Some(confidence),
                },
                FlowStep::Lost { x, y, inlier_ratio } => Step {
                    x,
                    y,
                    confidence: 0.0,
                    lost: true,
                    inlier_ratio: Some(inlier_ratio),
                },
            },
        }
    }
}

/// One tracking run over a frame source.
///
/// Drive it with [`TrackingRun::next`] until it returns `None`; the way the
/// run ended is then available from [`TrackingRun::outcome`]. Tracker state
/// is released as soon as the run reaches a terminal state, whichever path
/// got it there.
pub struct TrackingRun<S: FrameSource> {
    source: S,
    config: TrackingConfig,
    cancel: CancelSignal,
    phase: Phase,
    tracker: Option<Tracker>,
    outcome: Option<RunOutcome>,
}

impl<S: FrameSource> TrackingRun<S> {
    pub fn new(source: S, config: TrackingConfig, cancel: CancelSignal) -> Self {
        Self {
            source,
            config,
            cancel,
            phase: Phase::Seeded,
            tracker: None,
            outcome: None,
        }
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// How the run ended, once it has.
    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Produce the next event, or `None` once the run has ended.
    ///
    /// Timeouts, loss and cancellation end the run quietly. Configuration
    /// and decode failures end it with one `Err` item.
    pub async fn next(&mut self) -> Option<Result<TrackingEvent, TrackingError>> {
        loop {
            match self.phase {
                Phase::Finished => return None,
                Phase::Seeded => match self.seed().await {
                    Ok(()) => {
                        self.phase = Phase::Announce(FrameIndex(self.config.start_frame.0 + 1));
                    }
                    Err(halt) => return self.halt(halt),
                },
                Phase::Announce(frame) => {
                    if self.cancel.is_cancelled() {
                        log::info!("Tracking cancelled before frame {}", frame);
                        self.finish(RunOutcome::Cancelled);
                        return None;
                    }
                    self.phase = Phase::Process(frame);
                    return Some(Ok(TrackingEvent::Progress {
                        processed: frame.0 - self.config.start_frame.0,
                        total: self.config.total_frames(),
                    }));
                }
                Phase::Process(frame) => return self.process(frame).await,
            }
        }
    }

    async fn seed(&mut self) -> Result<(), Halt> {
        self.config.validate().map_err(Halt::Error)?;
        let start = self.config.start_frame;
        let image = self.load_frame(start).await?;
        let tracker = Tracker::seed(&self.config, &image).map_err(Halt::Error)?;
        self.tracker = Some(tracker);
        log::debug!(
            "Tracking seeded at frame {} with {} ({} frames to go)",
            start,
            self.config.algorithm,
            self.config.total_frames()
        );
        Ok(())
    }

    async fn process(&mut self, frame: FrameIndex) -> Option<Result<TrackingEvent, TrackingError>> {
        let image = match self.load_frame(frame).await {
            Ok(image) => image,
            Err(halt) => return self.halt(halt),
        };
        let Some(tracker) = self.tracker.as_mut() else {
            let error = TrackingError::InvalidConfig("tracker was not seeded".to_string());
            return self.halt(Halt::Error(error));
        };
        let step = tracker.step(&image);
        let result = TrackingResult {
            frame,
            x: step.x,
            y: step.y,
            confidence: step.confidence,
        };
        log::debug!(
            "Frame {}: ({:.2}, {:.2}) confidence {:.3}",
            frame,
            step.x,
            step.y,
            step.confidence
        );

        if step.lost {
            log::info!("Tracking lost at frame {}", frame);
            self.finish(RunOutcome::Lost {
                frame,
                inlier_ratio: step.inlier_ratio,
            });
        } else if frame >= self.config.end_frame {
            log::info!("Tracking completed at frame {}", frame);
            self.finish(RunOutcome::Completed);
        } else {
            self.phase = Phase::Announce(FrameIndex(frame.0 + 1));
            tokio::task::yield_now().await;
        }
        Some(Ok(TrackingEvent::Result(result)))
    }

    async fn load_frame(&mut self, frame: FrameIndex) -> Result<GrayImage, Halt> {
        let time = self.config.frame_start(frame);
        let timeout = self.config.seek_timeout;
        match tokio::time::timeout(timeout, self.source.seek(time)).await {
            Err(_) => return Err(Halt::TimedOut(frame)),
            Ok(Err(e)) => return Err(Halt::Error(e.into())),
            Ok(Ok(())) => {}
        }
        let image = self
            .source
            .current_image()
            .map_err(|e| Halt::Error(e.into()))?;
        to_gray(&image).map_err(Halt::Error)
    }

    fn halt(&mut self, halt: Halt) -> Option<Result<TrackingEvent, TrackingError>> {
        match halt {
            Halt::TimedOut(frame) => {
                log::error!("Seek to frame {} timed out after {:?}", frame, self.config.seek_timeout);
                self.finish(RunOutcome::TimedOut { frame });
                None
            }
            Halt::Error(error) => {
                log::error!("Tracking failed: {}", error);
                self.finish(RunOutcome::Failed(error.to_string()));
                Some(Err(error))
            }
        }
    }

    fn finish(&mut self, outcome: RunOutcome) {
        self.tracker = None;
        self.phase = Phase::Finished;
        self.outcome = Some(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::media::ImageSequenceSource;
    use crate::tracking::Roi;
    use image::{Rgba, RgbaImage};
    use std::time::Duration;

    const FPS: f64 = 10.0;

    /// Dark frame with a textured bright square whose top-left is (x, y).
    fn square_frame(x: i64, y: i64) -> RgbaImage {
        RgbaImage::from_fn(100, 60, |px, py| {
            let (dx, dy) = (i64::from(px) - x, i64::from(py) - y);
            if (0..12).contains(&dx) && (0..12).contains(&dy) {
                let v = if (dx / 3 + dy / 3) % 2 == 0 { 230 } else { 150 };
                Rgba([v, v, v, 255])
            } else {
                Rgba([20, 20, 20, 255])
            }
        })
    }

    fn textured_frame() -> RgbaImage {
        RgbaImage::from_fn(120, 90, |x, y| {
            let v = 128.0 + 50.0 * (0.1 * f64::from(x)).sin() + 50.0 * (0.08 * f64::from(y)).cos();
            let v = v.round() as u8;
            Rgba([v, v, v, 255])
        })
    }

    fn config(end: usize, algorithm: Algorithm) -> TrackingConfig {
        TrackingConfig::new(
            Roi::new(26.0, 20.0, 20.0, 20.0),
            FrameIndex(0),
            FrameIndex(end),
            algorithm,
            1.0 / FPS,
        )
    }

    async fn collect<S: FrameSource>(run: &mut TrackingRun<S>) -> (Vec<TrackingResult>, usize) {
        let mut results = Vec::new();
        let mut progress = 0;
        while let Some(event) = run.next().await {
            match event.unwrap() {
                TrackingEvent::Progress { .. } => progress += 1,
                TrackingEvent::Result(result) => results.push(result),
            }
        }
        (results, progress)
    }

    #[tokio::test]
    async fn test_static_roi_full_confidence() {
        let frames = vec![square_frame(30, 24); 6];
        let source = ImageSequenceSource::new(frames, FPS);
        let mut run = TrackingRun::new(source, config(5, Algorithm::Template), CancelSignal::new());

        let (results, progress) = collect(&mut run).await;
        assert_eq!(progress, 5);
        assert_eq!(results.len(), 5);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.frame, FrameIndex(i + 1));
            assert!(result.confidence >= 0.999, "{result:?}");
            assert_eq!(result.position(), crate::util::geometry::Coordinate::new(36.0, 30.0));
        }
        assert_eq!(run.outcome(), Some(&RunOutcome::Completed));
        assert!(run.next().await.is_none());
    }

    #[tokio::test]
    async fn test_progress_precedes_result() {
        let frames = vec![square_frame(30, 24); 3];
        let mut run = TrackingRun::new(
            ImageSequenceSource::new(frames, FPS),
            config(2, Algorithm::Template),
            CancelSignal::new(),
        );
        assert_eq!(
            run.next().await,
            Some(Ok(TrackingEvent::Progress { processed: 1, total: 2 }))
        );
        assert!(matches!(run.next().await, Some(Ok(TrackingEvent::Result(r))) if r.frame == FrameIndex(1)));
        assert_eq!(
            run.next().await,
            Some(Ok(TrackingEvent::Progress { processed: 2, total: 2 }))
        );
    }

    #[tokio::test]
    async fn test_roi_leaving_frame_is_lost() {
        // The square moves 8 px right per frame and has fully left the
        // 100 px wide frame by frame 9.
        let frames: Vec<RgbaImage> = (0..12).map(|i| square_frame(30 + 8 * i, 24)).collect();
        let source = ImageSequenceSource::new(frames, FPS);
        let mut cfg = config(11, Algorithm::Template);
        cfg.search_margin = 10;
        let mut run = TrackingRun::new(source, cfg, CancelSignal::new());

        let (results, _) = collect(&mut run).await;
        let last = results.last().unwrap();
        assert_eq!(last.confidence, 0.0);
        assert!(last.frame <= FrameIndex(9));
        match run.outcome() {
            Some(RunOutcome::Lost { frame, inlier_ratio }) => {
                assert_eq!(*frame, last.frame);
                assert!(inlier_ratio.is_none());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        // Results before the loss followed the square exactly.
        assert_eq!(results[0].position().x, 44.0);
    }

    #[tokio::test]
    async fn test_cancel_checked_between_frames() {
        let frames = vec![square_frame(30, 24); 10];
        let cancel = CancelSignal::new();
        let mut run = TrackingRun::new(
            ImageSequenceSource::new(frames, FPS),
            config(9, Algorithm::Template),
            cancel.clone(),
        );

        let mut results = 0;
        while let Some(event) = run.next().await {
            if let TrackingEvent::Result(_) = event.unwrap() {
                results += 1;
                if results == 3 {
                    cancel.cancel();
                }
            }
        }
        assert_eq!(results, 3);
        assert_eq!(run.outcome(), Some(&RunOutcome::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_timeout_ends_run() {
        let frames = vec![square_frame(30, 24); 8];
        let source = ImageSequenceSource::new(frames, FPS).stalling_from(3);
        let mut run = TrackingRun::new(source, config(7, Algorithm::Template), CancelSignal::new());

        let (results, _) = collect(&mut run).await;
        assert_eq!(results.len(), 2);
        assert_eq!(run.outcome(), Some(&RunOutcome::TimedOut { frame: FrameIndex(3) }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_within_timeout() {
        let frames = vec![square_frame(30, 24); 4];
        let source = ImageSequenceSource::new(frames, FPS).with_seek_delay(Duration::from_secs(2));
        let mut run = TrackingRun::new(source, config(3, Algorithm::Template), CancelSignal::new());
        let (results, _) = collect(&mut run).await;
        assert_eq!(results.len(), 3);
        assert_eq!(run.outcome(), Some(&RunOutcome::Completed));
    }

    #[tokio::test]
    async fn test_optical_flow_static_frames() {
        let frames = vec![textured_frame(); 4];
        let mut cfg = config(3, Algorithm::OpticalFlow);
        cfg.roi = Roi::new(40.0, 30.0, 40.0, 30.0);
        let mut run = TrackingRun::new(ImageSequenceSource::new(frames, FPS), cfg, CancelSignal::new());

        let (results, _) = collect(&mut run).await;
        assert_eq!(results.len(), 3);
        for result in &results {
            assert_eq!(result.confidence, 1.0);
            assert!(result.x >= 40.0 && result.x <= 80.0);
        }
        assert_eq!(run.outcome(), Some(&RunOutcome::Completed));
    }

    #[tokio::test]
    async fn test_invalid_range_is_error() {
        let frames = vec![square_frame(30, 24); 4];
        let mut run = TrackingRun::new(
            ImageSequenceSource::new(frames, FPS),
            config(0, Algorithm::Template),
            CancelSignal::new(),
        );
        assert!(matches!(run.next().await, Some(Err(TrackingError::InvalidRange { .. }))));
        assert!(run.next().await.is_none());
        assert!(matches!(run.outcome(), Some(RunOutcome::Failed(_))));
    }

    #[tokio::test]
    async fn test_end_past_source_is_error() {
        let frames = vec![square_frame(30, 24); 3];
        let mut run = TrackingRun::new(
            ImageSequenceSource::new(frames, FPS),
            config(8, Algorithm::Template),
            CancelSignal::new(),
        );
        let mut saw_error = false;
        while let Some(event) = run.next().await {
            if let Err(TrackingError::Source(_)) = event {
                saw_error = true;
            }
        }
        assert!(saw_error);
        assert!(matches!(run.outcome(), Some(RunOutcome::Failed(_))));
    }
}
