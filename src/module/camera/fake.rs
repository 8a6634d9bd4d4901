//! Still-image camera for machines without capture hardware.
//!

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::imageops::FilterType;
use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Camera, CameraConfig, FpsMeter, Request, Size};
use crate::module::error::Result;
use crate::module::vision::lens::{CameraIntrinsics, LensModel};

/// Replays one still image as a YUV 4:2:0 stream.
///
/// A frame's capture delay is the random jitter it was held back by.
pub struct FakeCamera {
    config: CameraConfig,
    frame: Arc<[u8]>,
    period: Option<Duration>,
    jitter: f64,
    rng: StdRng,
    meter: FpsMeter,
    epoch: Instant,
    last: Option<Instant>,
}

impl FakeCamera {
    /// Creates a fake camera from an image file.
    ///
    /// # Arguments
    ///
    /// * `image_path` - Still image to replay; a test pattern is used when it cannot be read.
    /// * `size` - Frame size; the image is resized to fit.
    /// * `fps` - Frame pacing, 0 for as fast as possible.
    /// * `jitter` - Random extra delay, as a fraction of the frame interval.
    ///
    pub fn new(image_path: &str, size: Size, fps: f64, jitter: f64) -> Self {
        let luma = match image::open(image_path) {
            Ok(img) => {
                if img.width() == size.width && img.height() == size.height {
                    img.into_luma8()
                } else {
                    img.resize_exact(size.width, size.height, FilterType::Triangle)
                        .into_luma8()
                }
            }
            Err(e) => {
                log::warn!(
                    "Cannot read {} ({}), replaying a test pattern instead",
                    image_path,
                    e
                );
                gradient(size)
            }
        };
        Self::from_luma(luma, fps, jitter)
    }

    /// Creates a fake camera replaying the given luma image.
    pub fn from_luma(luma: GrayImage, fps: f64, jitter: f64) -> Self {
        let size = Size {
            width: luma.width(),
            height: luma.height(),
        };
        let lens = LensModel::pinhole(CameraIntrinsics {
            fx: size.width as f64,
            fy: size.width as f64,
            cx: size.width as f64 / 2.0,
            cy: size.height as f64 / 2.0,
        });
        log::info!(
            "Fake camera {}x{} at {} fps",
            size.width,
            size.height,
            fps
        );
        Self {
            config: CameraConfig { size, lens },
            frame: pack_yuv420(&luma).into(),
            period: (fps > 0.0).then(|| Duration::from_secs_f64(1.0 / fps)),
            jitter: jitter.abs(),
            rng: StdRng::from_entropy(),
            meter: FpsMeter::default(),
            epoch: Instant::now(),
            last: None,
        }
    }

    fn jitter_delay(&mut self) -> Duration {
        match self.period {
            Some(period) if self.jitter > 0.0 => {
                period.mul_f64(self.jitter * self.rng.gen_range(0.0..1.0))
            }
            _ => Duration::ZERO,
        }
    }
}

impl Camera for FakeCamera {
    fn config(&self) -> &CameraConfig {
        &self.config
    }

    fn next_request(&mut self) -> Result<Box<dyn Request>> {
        let jitter = self.jitter_delay();
        if let (Some(period), Some(last)) = (self.period, self.last) {
            let due = last + period + jitter;
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
        }
        let now = Instant::now();
        self.last = Some(now);
        let timestamp_us = u64::try_from(now.duration_since(self.epoch).as_micros())
            .unwrap_or(u64::MAX);
        let fps = self.meter.tick(timestamp_us);

        Ok(Box::new(FakeRequest {
            frame: Arc::clone(&self.frame),
            delay: jitter,
            fps,
        }))
    }
}

struct FakeRequest {
    frame: Arc<[u8]>,
    delay: Duration,
    fps: f64,
}

impl Request for FakeRequest {
    fn yuv(&self) -> &[u8] {
        &self.frame
    }

    fn capture_delay(&self) -> Duration {
        self.delay
    }

    fn fps(&self) -> f64 {
        self.fps
    }
}

/// Horizontal luma ramp.
fn gradient(size: Size) -> GrayImage {
    let width = u64::from(size.width.max(1));
    GrayImage::from_fn(size.width, size.height, |x, _| {
        Luma([((u64::from(x) * 255) / width) as u8])
    })
}

/// Planar YUV 4:2:0 with neutral chroma.
fn pack_yuv420(luma: &GrayImage) -> Vec<u8> {
    let size = Size {
        width: luma.width(),
        height: luma.height(),
    };
    let mut buf = Vec::with_capacity(size.yuv420_len());
    buf.extend_from_slice(luma.as_raw());
    buf.resize(size.yuv420_len(), 128);
    buf
}
