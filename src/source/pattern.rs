//! Synthetic test pattern
//!
//! Renders a moving colour pattern and encodes each frame to JPEG, so the
//! server can be run without a camera attached.

use std::time::{Duration, Instant};

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use super::CameraConfig;
use crate::error::Result;
use crate::frame::FrameWriter;

/// Width of the sweeping bar, in pixels
const BAR_WIDTH: u32 = 16;

/// Moving test pattern producer
#[derive(Debug)]
pub struct TestPattern {
    width: u32,
    height: u32,
    quality: u8,
    frame_interval: Duration,
    frame_limit: Option<u64>,
    frame_index: u64,
}

impl TestPattern {
    /// Create a pattern at the camera's resolution, rate and quality
    pub fn new(camera: &CameraConfig) -> Self {
        Self {
            width: camera.width.max(1),
            height: camera.height.max(1),
            quality: camera.quality.clamp(1, 100),
            frame_interval: Duration::from_secs(1) / camera.framerate.max(1),
            frame_limit: None,
            frame_index: 0,
        }
    }

    /// Stop after `frames` frames instead of running forever
    pub fn frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Render and encode the next frame
    pub fn next_frame(&mut self) -> Result<Vec<u8>> {
        let image = self.render();
        self.frame_index += 1;

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality).encode_image(&image)?;
        Ok(jpeg)
    }

    /// Publish frames into `writer` at the configured rate
    ///
    /// Each encoded frame is one chunk, the same way a camera driver
    /// delivers MJPEG. Returns the number of frames published once the frame
    /// limit is reached.
    pub fn run(mut self, writer: &mut FrameWriter) -> Result<u64> {
        let mut next_frame = Instant::now();

        while self.frame_limit.map_or(true, |limit| self.frame_index < limit) {
            let jpeg = self.next_frame()?;
            writer.ingest(&jpeg);

            next_frame += self.frame_interval;
            let now = Instant::now();
            if next_frame > now {
                std::thread::sleep(next_frame - now);
            } else {
                // Encoding can't keep up; don't try to catch up in a burst
                next_frame = now;
            }
        }

        writer.flush();
        Ok(writer.published())
    }

    fn render(&self) -> RgbImage {
        let (width, height) = (self.width, self.height);
        let bar_x = ((self.frame_index * 4) % u64::from(width)) as u32;
        let shift = (self.frame_index % 256) as u32;

        RgbImage::from_fn(width, height, |x, y| {
            if x >= bar_x && x < bar_x + BAR_WIDTH {
                return Rgb([255, 255, 255]);
            }
            Rgb([
                ((x * 255 / width + shift) % 256) as u8,
                ((y * 255 / height) % 256) as u8,
                ((shift * 2) % 256) as u8,
            ])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FRAME_MARKER;

    fn small_camera() -> CameraConfig {
        CameraConfig {
            width: 32,
            height: 24,
            framerate: 100,
            quality: 75,
        }
    }

    #[test]
    fn test_frames_are_jpeg() {
        let mut pattern = TestPattern::new(&small_camera());
        let jpeg = pattern.next_frame().unwrap();

        assert!(jpeg.starts_with(&FRAME_MARKER));
        // End-of-image marker
        assert!(jpeg.ends_with(&[0xFF, 0xD9]));
    }

    #[test]
    fn test_pattern_moves() {
        let mut pattern = TestPattern::new(&small_camera());
        let first = pattern.next_frame().unwrap();
        let second = pattern.next_frame().unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_run_with_frame_limit() {
        let mut writer = FrameWriter::new();
        let buffer = writer.buffer();

        let published = TestPattern::new(&small_camera())
            .frame_limit(3)
            .run(&mut writer)
            .unwrap();

        assert_eq!(published, 3);
        let latest = buffer.latest().unwrap();
        assert!(latest.data.starts_with(&FRAME_MARKER));
        assert_eq!(buffer.metrics().snapshot().frames_published, 3);
    }
}
