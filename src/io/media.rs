// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Media loading and time-addressable frame sources.
//!
//! Anything that can seek to a time and hand back the decoded frame
//! implements [`FrameSource`]. Seeking is asynchronous: callers await it
//! and bound the wait with a timeout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use image::RgbaImage;
use thiserror::Error;

use crate::util::geometry::round_to;

/// Supported still-image extensions for image sequences.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("time {time}s is outside the video (duration {duration}s)")]
    OutOfRange { time: f64, duration: f64 },
    #[error("seek failed: {0}")]
    Seek(String),
    #[error("failed to decode frame: {0}")]
    Decode(String),
    #[error("source has no frames")]
    Empty,
    #[error("frame at {time}s was not ready within {timeout:?}")]
    Timeout { time: f64, timeout: Duration },
}

/// A video addressable by time.
pub trait FrameSource {
    /// Frame size in pixels (width, height).
    fn dimensions(&self) -> (u32, u32);

    /// Length in seconds.
    fn duration(&self) -> f64;

    /// Move to `time` seconds. Resolves once the frame at that time is ready.
    fn seek(&mut self, time: f64) -> LocalBoxFuture<'_, Result<(), SourceError>>;

    /// The decoded frame at the current position.
    fn current_image(&self) -> Result<RgbaImage, SourceError>;
}

impl<F: FrameSource + ?Sized> FrameSource for Box<F> {
    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }

    fn duration(&self) -> f64 {
        (**self).duration()
    }

    fn seek(&mut self, time: f64) -> LocalBoxFuture<'_, Result<(), SourceError>> {
        (**self).seek(time)
    }

    fn current_image(&self) -> Result<RgbaImage, SourceError> {
        (**self).current_image()
    }
}

/// Frames held in memory, shown at a fixed rate.
///
/// Frame `n` starts at `n * round(1/fps, 3)`, the same grid a
/// [`Timeline`](crate::models::timeline::Timeline) at that rate uses, so
/// timeline frame `n` always shows image `n`.
pub struct ImageSequenceSource {
    frames: Vec<RgbaImage>,
    fps: f64,
    frame_time: f64,
    position: usize,
    seek_delay: Option<Duration>,
    stall_from: Option<usize>,
}

impl ImageSequenceSource {
    pub fn new(frames: Vec<RgbaImage>, fps: f64) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 30.0 };
        let rounded = round_to(1.0 / fps, 3);
        Self {
            frames,
            fps,
            frame_time: if rounded > 0.0 { rounded } else { 1.0 / fps },
            position: 0,
            seek_delay: None,
            stall_from: None,
        }
    }

    /// Simulate decode latency on every seek.
    #[cfg(test)]
    pub(crate) fn with_seek_delay(mut self, delay: Duration) -> Self {
        self.seek_delay = Some(delay);
        self
    }

    /// Simulate a decoder that never becomes ready from frame `index` on.
    #[cfg(test)]
    pub(crate) fn stalling_from(mut self, index: usize) -> Self {
        self.stall_from = Some(index);
        self
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Seconds per frame, rounded to the millisecond like the timeline.
    pub fn frame_time(&self) -> f64 {
        self.frame_time
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn frame(&self, index: usize) -> Option<&RgbaImage> {
        self.frames.get(index)
    }

    fn index_for(&self, time: f64) -> Result<usize, SourceError> {
        if self.frames.is_empty() {
            return Err(SourceError::Empty);
        }
        let duration = self.duration();
        if !time.is_finite() || time < 0.0 || time > duration + 1e-9 {
            return Err(SourceError::OutOfRange { time, duration });
        }
        let index = (time / self.frame_time + 1e-6).floor() as usize;
        Ok(index.min(self.frames.len() - 1))
    }

    /// Frames whose pixel values encode their index, all distinct.
    #[cfg(test)]
    pub(crate) fn synthetic_counter(count: usize, fps: f64, width: u32, height: u32) -> Self {
        let frames = (0..count)
            .map(|i| RgbaImage::from_pixel(width, height, image::Rgba([(i % 256) as u8, (i / 256) as u8, 0, 255])))
            .collect();
        Self::new(frames, fps)
    }
}

impl FrameSource for ImageSequenceSource {
    fn dimensions(&self) -> (u32, u32) {
        self.frames.first().map(|f| f.dimensions()).unwrap_or((0, 0))
    }

    fn duration(&self) -> f64 {
        round_to(self.frames.len() as f64 * self.frame_time, 3)
    }

    fn seek(&mut self, time: f64) -> LocalBoxFuture<'_, Result<(), SourceError>> {
        async move {
            let index = self.index_for(time)?;
            if self.stall_from.is_some_and(|from| index >= from) {
                futures::future::pending::<()>().await;
            }
            if let Some(delay) = self.seek_delay {
                tokio::time::sleep(delay).await;
            }
            self.position = index;
            Ok(())
        }
        .boxed_local()
    }

    fn current_image(&self) -> Result<RgbaImage, SourceError> {
        self.frames
            .get(self.position)
            .cloned()
            .ok_or(SourceError::Empty)
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Load every image in `dir` (sorted by file name) as one sequence.
pub fn load_image_sequence(dir: &Path, fps: f64) -> Result<ImageSequenceSource> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_image_file(p))
        .collect();
    paths.sort();
    anyhow::ensure!(!paths.is_empty(), "No images found in {}", dir.display());

    let mut frames = Vec::with_capacity(paths.len());
    let mut size: Option<(u32, u32)> = None;
    for path in &paths {
        let image = image::open(path)
            .with_context(|| format!("Failed to load image {}", path.display()))?
            .to_rgba8();
        match size {
            None => size = Some(image.dimensions()),
            Some(expected) => anyhow::ensure!(
                expected == image.dimensions(),
                "Image {} has a different size than the first frame",
                path.display()
            ),
        }
        frames.push(image);
    }
    log::info!("Loaded {} frames from {}", frames.len(), dir.display());
    Ok(ImageSequenceSource::new(frames, fps))
}

/// Load a single still image as a one-frame source.
pub fn load_image(path: &Path) -> Result<ImageSequenceSource> {
    anyhow::ensure!(is_image_file(path), "Unsupported image format: {}", path.display());
    let image = image::open(path)
        .with_context(|| format!("Failed to load image {}", path.display()))?
        .to_rgba8();
    Ok(ImageSequenceSource::new(vec![image], 1.0))
}

#[cfg(feature = "video-opencv")]
pub use opencv_source::OpencvSource;

#[cfg(feature = "video-opencv")]
mod opencv_source {
    use super::{FrameSource, SourceError};
    use anyhow::{anyhow, Result};
    use futures::future::LocalBoxFuture;
    use futures::FutureExt;
    use image::RgbaImage;
    use opencv::{
        core::Mat,
        imgproc,
        prelude::*,
        videoio::{VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_POS_MSEC},
    };

    /// Video file decoded through OpenCV.
    pub struct OpencvSource {
        capture: VideoCapture,
        fps: f64,
        duration: f64,
        dimensions: (u32, u32),
        current: Option<RgbaImage>,
    }

    impl OpencvSource {
        pub fn open(path: &str) -> Result<Self> {
            let capture = VideoCapture::from_file(path, CAP_ANY)?;
            if !capture.is_opened()? {
                return Err(anyhow!("Failed to open video file: {}", path));
            }
            let mut fps = capture.get(CAP_PROP_FPS)?;
            if fps <= 0.0 {
                log::warn!("No frame rate in {} metadata, assuming 30 fps", path);
                fps = 30.0;
            }
            let frame_count = capture.get(CAP_PROP_FRAME_COUNT)?;
            let mut source = Self {
                capture,
                fps,
                duration: frame_count / fps,
                dimensions: (0, 0),
                current: None,
            };
            source.read_current().map_err(|e| anyhow!("{}: {}", path, e))?;
            if let Some(frame) = &source.current {
                source.dimensions = frame.dimensions();
            }
            log::info!(
                "Opened {}: {}x{}, {:.2}s at {:.2} fps",
                path,
                source.dimensions.0,
                source.dimensions.1,
                source.duration,
                fps
            );
            Ok(source)
        }

        /// Frame rate reported by the container.
        pub fn fps(&self) -> f64 {
            self.fps
        }

        fn read_current(&mut self) -> Result<(), SourceError> {
            let mut frame = Mat::default();
            let ok = self
                .capture
                .read(&mut frame)
                .map_err(|e| SourceError::Decode(e.to_string()))?;
            if !ok || frame.empty() {
                return Err(SourceError::Decode("empty frame".to_string()));
            }
            let mut rgba = Mat::default();
            imgproc::cvt_color(&frame, &mut rgba, imgproc::COLOR_BGR2RGBA, 0)
                .map_err(|e| SourceError::Decode(e.to_string()))?;
            let (width, height) = (rgba.cols() as u32, rgba.rows() as u32);
            let bytes = rgba
                .data_bytes()
                .map_err(|e| SourceError::Decode(e.to_string()))?
                .to_vec();
            let image = RgbaImage::from_raw(width, height, bytes)
                .ok_or_else(|| SourceError::Decode("unexpected buffer size".to_string()))?;
            self.current = Some(image);
            Ok(())
        }
    }

    impl FrameSource for OpencvSource {
        fn dimensions(&self) -> (u32, u32) {
            self.dimensions
        }

        fn duration(&self) -> f64 {
            self.duration
        }

        fn seek(&mut self, time: f64) -> LocalBoxFuture<'_, Result<(), SourceError>> {
            async move {
                if time < 0.0 || time > self.duration + 1e-6 {
                    return Err(SourceError::OutOfRange {
                        time,
                        duration: self.duration,
                    });
                }
                self.capture
                    .set(CAP_PROP_POS_MSEC, time * 1000.0)
                    .map_err(|e| SourceError::Seek(e.to_string()))?;
                self.read_current()?;
                // Decoding is synchronous; give the scheduler a turn.
                tokio::task::yield_now().await;
                Ok(())
            }
            .boxed_local()
        }

        fn current_image(&self) -> Result<RgbaImage, SourceError> {
            self.current.clone().ok_or(SourceError::Empty)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::timeline::Timeline;

    #[tokio::test]
    async fn test_sequence_seek() {
        let mut source = ImageSequenceSource::synthetic_counter(10, 10.0, 4, 4);
        assert_eq!(source.duration(), 1.0);
        assert_eq!(source.dimensions(), (4, 4));

        source.seek(0.35).await.unwrap();
        assert_eq!(source.position(), 3);
        assert_eq!(source.current_image().unwrap().get_pixel(0, 0)[0], 3);

        // The last instant maps onto the last frame.
        source.seek(1.0).await.unwrap();
        assert_eq!(source.position(), 9);
    }

    #[tokio::test]
    async fn test_sequence_out_of_range() {
        let mut source = ImageSequenceSource::synthetic_counter(10, 10.0, 4, 4);
        assert!(matches!(
            source.seek(2.0).await,
            Err(SourceError::OutOfRange { .. })
        ));
        assert!(source.seek(-0.1).await.is_err());

        let mut empty = ImageSequenceSource::new(Vec::new(), 30.0);
        assert_eq!(empty.seek(0.0).await, Err(SourceError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_source_times_out() {
        let mut source = ImageSequenceSource::synthetic_counter(10, 10.0, 4, 4).stalling_from(5);
        source.seek(0.1).await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), source.seek(0.6)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_sequence_matches_timeline_frames() {
        let mut source = ImageSequenceSource::synthetic_counter(300, 30.0, 2, 2);
        let timeline = Timeline::new(source.duration(), 30.0).unwrap();
        assert_eq!(timeline.frame_count(), 300);
        assert_eq!(source.frame_time(), timeline.frame_time());

        for frame in timeline.frames() {
            source.seek(frame.time).await.unwrap();
            assert_eq!(source.position(), frame.index.0, "time {}", frame.time);
            let pixel = source.current_image().unwrap().get_pixel(0, 0).0;
            assert_eq!(usize::from(pixel[0]) + 256 * usize::from(pixel[1]), frame.index.0);
        }
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("frame_001.PNG")));
        assert!(is_image_file(Path::new("a/b/c.jpeg")));
        assert!(!is_image_file(Path::new("video.mp4")));
        assert!(!is_image_file(Path::new("noext")));
    }
}
