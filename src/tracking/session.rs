// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Consumer-side policy on top of a tracking run.
//!
//! The engine only reports confidence. Deciding that a track is lost, what
//! to commit and whether to offer a restart from the last good frame
//! happens here.

use std::ops::ControlFlow;

use super::engine::TrackingRun;
use super::{Algorithm, Roi, RunOutcome, TrackingConfig, TrackingError, TrackingEvent, TrackingResult};
use crate::io::media::FrameSource;
use crate::models::frame::FrameIndex;

/// Confidence below which a result marks the track as lost.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Parameters for a follow-up run after tracking was lost.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeRequest {
    pub roi: Roi,
    pub start_frame: FrameIndex,
    pub end_frame: FrameIndex,
    pub algorithm: Algorithm,
}

impl ResumeRequest {
    /// Config for the new run, keeping the tuning of `previous`.
    pub fn to_config(&self, previous: &TrackingConfig) -> TrackingConfig {
        TrackingConfig {
            roi: self.roi,
            start_frame: self.start_frame,
            end_frame: self.end_frame,
            algorithm: self.algorithm,
            ..previous.clone()
        }
    }
}

/// Accumulates the events of one run.
#[derive(Debug, Clone)]
pub struct SessionCollector {
    config: TrackingConfig,
    threshold: f64,
    results: Vec<TrackingResult>,
    last_good: Option<TrackingResult>,
    lost_at: Option<FrameIndex>,
    progress: (usize, usize),
    error: Option<TrackingError>,
}

impl SessionCollector {
    pub fn new(config: TrackingConfig, threshold: f64) -> Self {
        let total = config.total_frames();
        Self {
            config,
            threshold,
            results: Vec::new(),
            last_good: None,
            lost_at: None,
            progress: (0, total),
            error: None,
        }
    }

    /// Record one event. Breaks once the run should no longer be driven.
    pub fn observe(&mut self, event: Result<TrackingEvent, TrackingError>) -> ControlFlow<()> {
        match event {
            Ok(TrackingEvent::Progress { processed, total }) => {
                self.progress = (processed, total);
                ControlFlow::Continue(())
            }
            Ok(TrackingEvent::Result(result)) => {
                if result.confidence < self.threshold {
                    log::info!(
                        "Confidence {:.3} below {:.2} at frame {}, stopping",
                        result.confidence,
                        self.threshold,
                        result.frame
                    );
                    self.lost_at = Some(result.frame);
                    return ControlFlow::Break(());
                }
                self.results.push(result);
                self.last_good = Some(result);
                ControlFlow::Continue(())
            }
            Err(error) => {
                self.error = Some(error);
                ControlFlow::Break(())
            }
        }
    }

    /// (processed, total) as last reported.
    pub fn progress(&self) -> (usize, usize) {
        self.progress
    }

    pub fn results(&self) -> &[TrackingResult] {
        &self.results
    }

    /// Close the session. `outcome` is the engine's own outcome if the run
    /// was driven to its end.
    pub fn finish(self, outcome: Option<RunOutcome>) -> RunSummary {
        let outcome = match (self.lost_at, outcome) {
            (_, Some(RunOutcome::Lost { frame, inlier_ratio })) => RunOutcome::Lost { frame, inlier_ratio },
            (Some(frame), _) => RunOutcome::Lost {
                frame,
                inlier_ratio: None,
            },
            (None, Some(outcome)) => outcome,
            (None, None) => match &self.error {
                Some(error) => RunOutcome::Failed(error.to_string()),
                None => RunOutcome::Cancelled,
            },
        };
        RunSummary {
            config: self.config,
            results: self.results,
            last_good: self.last_good,
            lost_at: self.lost_at,
            outcome,
            error: self.error,
        }
    }
}

/// What a finished session produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub config: TrackingConfig,
    /// Results at or above the threshold, in frame order.
    pub results: Vec<TrackingResult>,
    pub last_good: Option<TrackingResult>,
    /// First frame whose confidence fell below the threshold.
    pub lost_at: Option<FrameIndex>,
    pub outcome: RunOutcome,
    pub error: Option<TrackingError>,
}

impl RunSummary {
    /// Restart parameters after a loss before the end frame: the original
    /// ROI size re-centred on the last good result, starting at its frame.
    pub fn resume_request(&self) -> Option<ResumeRequest> {
        self.lost_at?;
        let last = self.last_good?;
        if last.frame >= self.config.end_frame {
            return None;
        }
        Some(ResumeRequest {
            roi: Roi::centered_on(last.position(), self.config.roi.width, self.config.roi.height),
            start_frame: last.frame,
            end_frame: self.config.end_frame,
            algorithm: self.config.algorithm,
        })
    }

    /// One-line report for the user.
    pub fn message(&self) -> String {
        let count = self.results.len();
        match (&self.outcome, self.lost_at, self.last_good) {
            (_, Some(lost), Some(last)) => format!(
                "Tracking lost at frame {}. {} points were added for frames {} through {}.",
                lost,
                count,
                self.config.start_frame.0 + 1,
                last.frame
            ),
            (_, Some(lost), None) => format!("Tracking lost at frame {}. No points were added.", lost),
            (RunOutcome::Cancelled, _, _) => {
                format!("Tracking was cancelled. {} points were added before cancellation.", count)
            }
            (RunOutcome::TimedOut { frame }, _, _) => format!(
                "Tracking stopped: frame {} did not load in time. {} points were added.",
                frame, count
            ),
            (RunOutcome::Failed(message), _, _) => format!("Tracking failed: {}", message),
            _ => format!("Successfully tracked {} frames.", count),
        }
    }
}

/// Drive `run` to its end or to the first sub-threshold result.
pub async fn drive_run<S, F>(run: &mut TrackingRun<S>, threshold: f64, mut on_progress: F) -> RunSummary
where
    S: FrameSource,
    F: FnMut(usize, usize),
{
    let mut collector = SessionCollector::new(run.config().clone(), threshold);
    while let Some(event) = run.next().await {
        if let Ok(TrackingEvent::Progress { processed, total }) = &event {
            on_progress(*processed, *total);
        }
        if collector.observe(event).is_break() {
            break;
        }
    }
    collector.finish(run.outcome().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::media::ImageSequenceSource;
    use crate::tracking::CancelSignal;
    use image::{Rgba, RgbaImage};

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

    fn config(end: usize) -> TrackingConfig {
        TrackingConfig::new(
            Roi::new(26.0, 20.0, 20.0, 20.0),
            FrameIndex(0),
            FrameIndex(end),
            Algorithm::Template,
            0.1,
        )
    }

    fn result(frame: usize, confidence: f64) -> TrackingResult {
        TrackingResult {
            frame: FrameIndex(frame),
            x: 10.0 * frame as f64,
            y: 5.0,
            confidence,
        }
    }

    #[test]
    fn test_collector_stops_below_threshold() {
        let mut collector = SessionCollector::new(config(10), 0.5);
        assert!(collector.observe(Ok(TrackingEvent::Result(result(1, 0.9)))).is_continue());
        assert!(collector.observe(Ok(TrackingEvent::Progress { processed: 2, total: 10 })).is_continue());
        assert!(collector.observe(Ok(TrackingEvent::Result(result(2, 0.3)))).is_break());
        assert_eq!(collector.progress(), (2, 10));

        let summary = collector.finish(None);
        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.lost_at, Some(FrameIndex(2)));
        assert_eq!(
            summary.outcome,
            RunOutcome::Lost {
                frame: FrameIndex(2),
                inlier_ratio: None
            }
        );

        let resume = summary.resume_request().unwrap();
        assert_eq!(resume.start_frame, FrameIndex(1));
        assert_eq!(resume.end_frame, FrameIndex(10));
        assert_eq!(resume.roi, Roi::new(0.0, -5.0, 20.0, 20.0));
        assert_eq!(
            summary.message(),
            "Tracking lost at frame 2. 1 points were added for frames 1 through 1."
        );

        let next = resume.to_config(&summary.config);
        assert_eq!(next.start_frame, FrameIndex(1));
        assert_eq!(next.search_margin, TrackingConfig::DEFAULT_SEARCH_MARGIN);
    }

    #[test]
    fn test_no_resume_without_good_result() {
        let mut collector = SessionCollector::new(config(10), 0.5);
        collector.observe(Ok(TrackingEvent::Result(result(1, 0.0))));
        let summary = collector.finish(None);
        assert!(summary.resume_request().is_none());
        assert!(summary.results.is_empty());
    }

    #[test]
    fn test_completed_run_has_no_resume() {
        let mut collector = SessionCollector::new(config(2), 0.5);
        collector.observe(Ok(TrackingEvent::Result(result(1, 0.9))));
        collector.observe(Ok(TrackingEvent::Result(result(2, 0.95))));
        let summary = collector.finish(Some(RunOutcome::Completed));
        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert!(summary.resume_request().is_none());
        assert_eq!(summary.message(), "Successfully tracked 2 frames.");
    }

    #[test]
    fn test_error_recorded() {
        let mut collector = SessionCollector::new(config(2), 0.5);
        assert!(collector.observe(Err(TrackingError::EmptyFrame)).is_break());
        let summary = collector.finish(None);
        assert_eq!(summary.error, Some(TrackingError::EmptyFrame));
        assert!(matches!(summary.outcome, RunOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_drive_run_lost_then_resume() {
        // The square jumps far outside the search window at frame 4.
        let mut frames: Vec<RgbaImage> = (0..4).map(|i| square_frame(30 + 2 * i)).collect();
        frames.extend((4..8).map(|_| square_frame(80)));
        let source = ImageSequenceSource::new(frames, 10.0);
        let mut run = TrackingRun::new(source, config(7), CancelSignal::new());

        let mut reports = Vec::new();
        let summary = drive_run(&mut run, DEFAULT_CONFIDENCE_THRESHOLD, |done, total| reports.push((done, total))).await;
        assert_eq!(reports.first(), Some(&(1, 7)));
        assert_eq!(summary.results.len(), 3);
        assert_eq!(summary.lost_at, Some(FrameIndex(4)));

        let resume = summary.resume_request().unwrap();
        assert_eq!(resume.start_frame, FrameIndex(3));
        assert_eq!(resume.roi.center(), summary.last_good.unwrap().position());
        assert_eq!(resume.roi.width, 20.0);
    }

    #[tokio::test]
    async fn test_drive_run_cancelled() {
        let frames = vec![square_frame(30); 5];
        let cancel = CancelSignal::new();
        cancel.cancel();
        let mut run = TrackingRun::new(ImageSequenceSource::new(frames, 10.0), config(4), cancel);
        let summary = drive_run(&mut run, 0.5, |_, _| {}).await;
        assert_eq!(summary.outcome, RunOutcome::Cancelled);
        assert!(summary.results.is_empty());
        assert!(summary.resume_request().is_none());
    }
}
