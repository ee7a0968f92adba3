// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Discrete frame timeline with seeking and playback.
//!
//! Continuous video time is cut into frames of `round(1/fps, 3)` seconds.
//! Seeks requested through [`Timeline::seek`] are deferred and applied by
//! the next [`Timeline::update`], so several seeks within one UI tick
//! coalesce. Playback is driven by [`Timeline::tick`] on a fixed interval.

use std::time::{Duration, Instant};

use thiserror::Error;

use super::events::{EventBus, TimelineEvent};
use super::frame::{Frame, FrameIndex};
use crate::io::media::{FrameSource, SourceError};
use crate::util::geometry::round_to;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimelineError {
    #[error("frame rate must be positive, got {0}")]
    InvalidFrameRate(f64),
    #[error("duration must be positive, got {0}")]
    InvalidDuration(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Options for [`Timeline::play`]. Frame overrides outside the timeline are
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayOptions {
    pub looping: bool,
    pub start_frame: Option<usize>,
    pub end_frame: Option<usize>,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            looping: true,
            start_frame: None,
            end_frame: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Playback {
    looping: bool,
    starting_frame: FrameIndex,
    ending_frame: FrameIndex,
    wrap_next: bool,
    last_tick: Option<Instant>,
}

pub struct Timeline {
    duration: f64,
    fps: f64,
    frame_time: f64,
    frames: Vec<Frame>,
    current_frame: FrameIndex,
    current_time: f64,
    pending_seek: Option<FrameIndex>,
    direction: Direction,
    pub frame_skip: usize,
    start_frame: FrameIndex,
    end_frame: FrameIndex,
    play_interval: Duration,
    playback: Option<Playback>,
    pub events: EventBus<TimelineEvent>,
}

fn frame_grid(duration: f64, fps: f64) -> Result<(f64, Vec<Frame>), TimelineError> {
    if !(fps.is_finite() && fps > 0.0) {
        return Err(TimelineError::InvalidFrameRate(fps));
    }
    if !(duration.is_finite() && duration > 0.0) {
        return Err(TimelineError::InvalidDuration(duration));
    }
    let frame_time = round_to(1.0 / fps, 3);
    if frame_time <= 0.0 {
        return Err(TimelineError::InvalidFrameRate(fps));
    }
    let count = ((round_to(duration, 3) / frame_time) + 1e-9).floor().max(1.0) as usize;
    let frames = (0..count)
        .map(|i| Frame {
            index: FrameIndex(i),
            time: round_to(i as f64 * frame_time, 3),
        })
        .collect();
    Ok((frame_time, frames))
}

impl Timeline {
    pub const DEFAULT_PLAY_INTERVAL: Duration = Duration::from_millis(200);

    pub fn new(duration: f64, fps: f64) -> Result<Self, TimelineError> {
        let (frame_time, frames) = frame_grid(duration, fps)?;
        let last = FrameIndex(frames.len() - 1);
        Ok(Self {
            duration: round_to(frames.len() as f64 * frame_time, 3),
            fps,
            frame_time,
            frames,
            current_frame: FrameIndex(0),
            current_time: 0.0,
            pending_seek: None,
            direction: Direction::Forward,
            frame_skip: 1,
            start_frame: FrameIndex(0),
            end_frame: last,
            play_interval: Self::DEFAULT_PLAY_INTERVAL,
            playback: None,
            events: EventBus::new(),
        })
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frame_time(&self) -> f64 {
        self.frame_time
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame(&self, index: FrameIndex) -> Option<&Frame> {
        self.frames.get(index.0)
    }

    pub fn current_frame(&self) -> FrameIndex {
        self.current_frame
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn current(&self) -> Frame {
        self.frames
            .get(self.current_frame.0)
            .copied()
            .unwrap_or(self.frames[0])
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn start_frame(&self) -> FrameIndex {
        self.start_frame
    }

    pub fn end_frame(&self) -> FrameIndex {
        self.end_frame
    }

    /// Set the active trim range. Out-of-range or inverted ranges are
    /// clamped to the timeline.
    pub fn set_range(&mut self, start: FrameIndex, end: FrameIndex) {
        let last = self.frames.len() - 1;
        let end = end.0.min(last);
        let start = start.0.min(end);
        self.start_frame = FrameIndex(start);
        self.end_frame = FrameIndex(end);
    }

    pub fn in_range(&self, frame: FrameIndex) -> bool {
        frame >= self.start_frame && frame <= self.end_frame
    }

    pub fn set_play_interval(&mut self, interval: Duration) {
        self.play_interval = interval;
    }

    /// Request a seek, applied on the next [`Timeline::update`].
    pub fn seek(&mut self, frame: FrameIndex) -> &mut Self {
        let last = self.frames.len() - 1;
        self.pending_seek = Some(FrameIndex(frame.0.min(last)));
        self
    }

    /// Apply a pending seek. Returns the new frame when one was applied.
    pub fn update(&mut self) -> Option<FrameIndex> {
        let Some(target) = self.pending_seek.take() else {
            self.current_time = self.frame_start(self.current_frame);
            return None;
        };
        let previous = self.current_frame;
        self.current_frame = target;
        self.direction = if previous < target {
            Direction::Forward
        } else {
            Direction::Backward
        };
        self.current_time = self.frame_start(target);
        self.events.emit(&TimelineEvent::Seek(target));
        Some(target)
    }

    /// Jump to `frame` immediately. Returns `false` if it does not exist.
    pub fn set_frame(&mut self, frame: FrameIndex) -> bool {
        let Some(found) = self.frames.get(frame.0).copied() else {
            return false;
        };
        let previous = self.current_frame;
        self.current_frame = found.index;
        self.current_time = found.time;
        self.direction = if previous < found.index {
            Direction::Forward
        } else {
            Direction::Backward
        };
        self.events.emit(&TimelineEvent::Seek(found.index));
        true
    }

    /// Next frame on the frame-skip grid, clamped at the end of the range.
    pub fn next(&self) -> Option<FrameIndex> {
        let skip = self.frame_skip.max(1);
        let current = self.current_frame.0;
        let mut next = current + skip;
        if current % skip != 0 {
            next -= current % skip;
        }
        if next > self.end_frame.0 {
            next = self.end_frame.0;
        }
        self.frames.get(next).map(|f| f.index)
    }

    /// Previous frame on the frame-skip grid. Below the start of the range
    /// the step wraps by `frame_count % frame_skip`.
    pub fn prev(&self) -> Option<FrameIndex> {
        let skip = self.frame_skip.max(1) as i64;
        let current = self.current_frame.0 as i64;
        let mut prev = current - skip;
        if current % skip != 0 {
            prev += skip - current % skip;
        }
        if prev < self.start_frame.0 as i64 {
            prev = current - (self.frames.len() as i64 % skip);
        }
        usize::try_from(prev)
            .ok()
            .and_then(|p| self.frames.get(p))
            .map(|f| f.index)
    }

    pub fn closest_frame(&self, time: f64) -> FrameIndex {
        let index = round_to(time / self.frame_time, 3).floor().max(0.0) as usize;
        FrameIndex(index.min(self.frames.len() - 1))
    }

    pub fn frame_start(&self, frame: FrameIndex) -> f64 {
        round_to(self.frame_time * frame.0 as f64, 3)
    }

    /// Recompute the frame grid for a new duration or frame rate, keeping
    /// the trim range at the same relative position. Returns the rounded
    /// duration.
    pub fn update_timing(&mut self, duration: f64, fps: f64) -> Result<f64, TimelineError> {
        let (frame_time, frames) = frame_grid(duration, fps)?;
        let old_last = (self.frames.len() - 1).max(1) as f64;
        let start_ratio = self.start_frame.0 as f64 / old_last;
        let end_ratio = if self.frames.len() > 1 {
            self.end_frame.0 as f64 / old_last
        } else {
            1.0
        };

        let new_last = frames.len() - 1;
        self.fps = fps;
        self.frame_time = frame_time;
        self.frames = frames;
        self.duration = round_to(self.frames.len() as f64 * frame_time, 3);
        self.set_range(
            FrameIndex((start_ratio * new_last as f64).floor() as usize),
            FrameIndex((end_ratio * new_last as f64).floor() as usize),
        );
        self.current_frame = FrameIndex(self.current_frame.0.min(new_last));
        self.current_time = self.frame_start(self.current_frame);
        self.events.emit(&TimelineEvent::TimingUpdate {
            duration: self.duration,
            fps,
        });
        Ok(self.duration)
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_some()
    }

    /// Start playback. No-op returning `false` if already playing.
    pub fn play(&mut self, options: PlayOptions) -> bool {
        if self.playback.is_some() {
            return false;
        }
        let count = self.frames.len();
        let starting_frame = options
            .start_frame
            .filter(|&f| f < count)
            .map(FrameIndex)
            .unwrap_or(self.start_frame);
        let ending_frame = options
            .end_frame
            .filter(|&f| f > 0 && f < count)
            .map(FrameIndex)
            .unwrap_or(self.end_frame);

        self.playback = Some(Playback {
            looping: options.looping,
            starting_frame,
            ending_frame,
            wrap_next: false,
            last_tick: None,
        });
        self.events.emit(&TimelineEvent::Play);
        true
    }

    pub fn pause(&mut self) {
        self.playback = None;
        self.events.emit(&TimelineEvent::Pause);
    }

    /// Advance playback if a full interval has elapsed since the last step.
    /// Returns the frame shown after the step.
    pub fn tick(&mut self, now: Instant) -> Option<FrameIndex> {
        let mut playback = self.playback?;
        match playback.last_tick {
            None => {
                playback.last_tick = Some(now);
                self.playback = Some(playback);
                return None;
            }
            Some(last) if now.duration_since(last) < self.play_interval => return None,
            Some(_) => playback.last_tick = Some(now),
        }

        if playback.wrap_next || self.current_frame > playback.ending_frame {
            if !playback.looping {
                self.pause();
                return None;
            }
            playback.wrap_next = false;
            self.set_frame(playback.starting_frame);
        } else if let Some(next) = self.next() {
            let next = next.min(playback.ending_frame);
            self.set_frame(next);
            if next == playback.ending_frame {
                playback.wrap_next = true;
            }
        }
        self.playback = Some(playback);
        Some(self.current_frame)
    }
}

async fn seek_within<S: FrameSource + ?Sized>(source: &mut S, time: f64, timeout: Duration) -> Result<(), SourceError> {
    match tokio::time::timeout(timeout, source.seek(time)).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout { time, timeout }),
    }
}

/// Estimate a source's frame rate by stepping at 1/240 s and timing the
/// first two image changes. Best effort: variable-rate sources can give a
/// wrong answer, so callers should surface the value for confirmation.
///
/// Each seek must finish within `seek_timeout`, otherwise detection fails
/// with [`SourceError::Timeout`].
pub async fn detect_frame_rate<S: FrameSource + ?Sized>(
    source: &mut S,
    seek_timeout: Duration,
) -> Result<Option<f64>, SourceError> {
    const STEPS_PER_SECOND: f64 = 240.0;

    let duration = source.duration();
    seek_within(source, 0.0, seek_timeout).await?;
    let mut reference = source.current_image()?;
    let mut first_change: Option<f64> = None;

    let mut step = 1u64;
    loop {
        let time = step as f64 / STEPS_PER_SECOND;
        if time > duration {
            log::debug!("Frame rate detection reached the end of the video");
            return Ok(None);
        }
        seek_within(source, time, seek_timeout).await?;
        let image = source.current_image()?;
        if image != reference {
            match first_change {
                None => {
                    first_change = Some(time);
                    reference = image;
                }
                Some(start) => {
                    let fps = round_to(1.0 / (time - start), 2);
                    log::info!("Detected frame rate {} fps", fps);
                    return Ok(Some(fps));
                }
            }
        }
        step += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::media::ImageSequenceSource;
    use std::cell::RefCell;
    use std::rc::Rc;

    const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_frame_grid() {
        let t = Timeline::new(10.0, 30.0).unwrap();
        assert_eq!(t.frame_time(), 0.033);
        assert_eq!(t.frame_count(), 303);
        assert_eq!(t.frame(FrameIndex(1)).unwrap().time, 0.033);
        assert_eq!(t.frame(FrameIndex(302)).unwrap().time, 9.966);
        assert_eq!(t.end_frame(), FrameIndex(302));
        assert!(Timeline::new(10.0, 0.0).is_err());
        assert!(Timeline::new(-1.0, 30.0).is_err());
    }

    #[test]
    fn test_seek_is_deferred() {
        let mut t = Timeline::new(10.0, 30.0).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        t.events.subscribe(move |e| sink.borrow_mut().push(*e));

        t.seek(FrameIndex(10)).seek(FrameIndex(20));
        assert_eq!(t.current_frame(), FrameIndex(0));
        assert_eq!(t.update(), Some(FrameIndex(20)));
        assert_eq!(t.current_frame(), FrameIndex(20));
        assert_eq!(t.current_time(), 0.66);
        assert_eq!(t.update(), None);
        // Coalesced: one seek event.
        assert_eq!(*seen.borrow(), vec![TimelineEvent::Seek(FrameIndex(20))]);
    }

    #[test]
    fn test_set_frame_direction() {
        let mut t = Timeline::new(10.0, 30.0).unwrap();
        assert!(t.set_frame(FrameIndex(5)));
        assert_eq!(t.direction(), Direction::Forward);
        assert!(t.set_frame(FrameIndex(2)));
        assert_eq!(t.direction(), Direction::Backward);
        assert!(!t.set_frame(FrameIndex(1000)));
        assert_eq!(t.current_frame(), FrameIndex(2));
    }

    #[test]
    fn test_next_prev_with_skip() {
        let mut t = Timeline::new(1.0, 10.0).unwrap();
        assert_eq!(t.frame_count(), 10);
        t.frame_skip = 3;
        t.set_frame(FrameIndex(4));
        assert_eq!(t.next(), Some(FrameIndex(6)));
        assert_eq!(t.prev(), Some(FrameIndex(3)));

        t.set_frame(FrameIndex(8));
        assert_eq!(t.next(), Some(FrameIndex(9)));

        // Below the start the step wraps by frame_count % skip.
        t.set_frame(FrameIndex(1));
        assert_eq!(t.prev(), Some(FrameIndex(0)));
        t.set_frame(FrameIndex(0));
        assert_eq!(t.prev(), None);
    }

    #[test]
    fn test_next_clamps_to_range() {
        let mut t = Timeline::new(1.0, 10.0).unwrap();
        t.set_range(FrameIndex(2), FrameIndex(5));
        t.set_frame(FrameIndex(5));
        assert_eq!(t.next(), Some(FrameIndex(5)));
    }

    #[test]
    fn test_update_timing_keeps_ratios() {
        let mut t = Timeline::new(10.0, 10.0).unwrap();
        assert_eq!(t.frame_count(), 100);
        t.set_range(FrameIndex(0), FrameIndex(99));
        let duration = t.update_timing(10.0, 20.0).unwrap();
        assert_eq!(t.frame_count(), 200);
        assert_eq!(duration, 10.0);
        assert_eq!(t.end_frame(), FrameIndex(199));

        t.set_range(FrameIndex(0), FrameIndex(99));
        t.update_timing(10.0, 10.0).unwrap();
        assert_eq!(t.end_frame(), FrameIndex(49));
    }

    #[test]
    fn test_closest_frame() {
        let t = Timeline::new(10.0, 30.0).unwrap();
        assert_eq!(t.closest_frame(0.0), FrameIndex(0));
        assert_eq!(t.closest_frame(0.034), FrameIndex(1));
        assert_eq!(t.closest_frame(100.0), FrameIndex(302));
        assert_eq!(t.frame_start(FrameIndex(3)), 0.099);
    }

    #[test]
    fn test_play_guard_and_ticks() {
        let mut t = Timeline::new(1.0, 10.0).unwrap();
        t.set_range(FrameIndex(0), FrameIndex(2));
        let start = Instant::now();
        assert!(t.play(PlayOptions::default()));
        assert!(!t.play(PlayOptions::default()));

        let step = Timeline::DEFAULT_PLAY_INTERVAL;
        assert_eq!(t.tick(start), None);
        assert_eq!(t.tick(start + step / 2), None);
        assert_eq!(t.tick(start + step), Some(FrameIndex(1)));
        assert_eq!(t.tick(start + step * 2), Some(FrameIndex(2)));
        // Looping wraps back to the start.
        assert_eq!(t.tick(start + step * 3), Some(FrameIndex(0)));

        t.pause();
        assert!(!t.is_playing());
        assert_eq!(t.tick(start + step * 10), None);
    }

    #[test]
    fn test_play_without_loop_stops() {
        let mut t = Timeline::new(1.0, 10.0).unwrap();
        let start = Instant::now();
        t.play(PlayOptions {
            looping: false,
            start_frame: None,
            end_frame: Some(1),
        });
        let step = Timeline::DEFAULT_PLAY_INTERVAL;
        t.tick(start);
        assert_eq!(t.tick(start + step), Some(FrameIndex(1)));
        assert_eq!(t.tick(start + step * 2), None);
        assert!(!t.is_playing());
    }

    #[tokio::test]
    async fn test_detect_frame_rate() {
        let mut source = ImageSequenceSource::synthetic_counter(30, 30.0, 8, 8);
        let fps = detect_frame_rate(&mut source, SEEK_TIMEOUT).await.unwrap();
        assert_eq!(fps, Some(30.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detect_frame_rate_stalled_source() {
        let mut source = ImageSequenceSource::synthetic_counter(30, 10.0, 4, 4).stalling_from(1);
        let result = tokio::time::timeout(Duration::from_secs(3600), detect_frame_rate(&mut source, SEEK_TIMEOUT))
            .await
            .expect("detection must give up on a stalled seek");
        assert!(matches!(result, Err(SourceError::Timeout { timeout, .. }) if timeout == SEEK_TIMEOUT));
    }

    #[tokio::test]
    async fn test_detect_frame_rate_static_video() {
        let frames = vec![image::RgbaImage::new(4, 4); 10];
        let mut source = ImageSequenceSource::new(frames, 30.0);
        assert_eq!(detect_frame_rate(&mut source, SEEK_TIMEOUT).await.unwrap(), None);
    }
}
