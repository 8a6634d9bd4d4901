//! Camera Functions
//!
//! A [`Camera`] hands out one [`Request`] per captured frame. The request owns
//! the frame buffer: the pixels can only be borrowed from it, and dropping the
//! request gives the buffer back to whoever produced it.

use std::time::Duration;

use nalgebra::Matrix3;

use crate::module::error::Result;
use crate::module::vision::lens::LensModel;

pub mod factory;
pub mod fake;
pub mod real;

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    /// Bytes in the luma plane.
    pub fn luma_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Bytes in a planar YUV 4:2:0 frame.
    pub fn yuv420_len(&self) -> usize {
        let chroma = (self.width as usize).div_ceil(2) * (self.height as usize).div_ceil(2);
        self.luma_len() + 2 * chroma
    }
}

/// Optical calibration of one physical camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraConfig {
    pub size: Size,
    pub lens: LensModel,
}

/// One captured frame plus its timing.
pub trait Request {
    /// Raw YUV buffer, luma plane first. Valid while the request lives.
    fn yuv(&self) -> &[u8];

    /// Time between exposure and buffer availability.
    fn capture_delay(&self) -> Duration;

    /// Capture delay in whole microseconds.
    fn delay_us(&self) -> u64 {
        u64::try_from(self.capture_delay().as_micros()).unwrap_or(u64::MAX)
    }

    /// Measured frame rate of the producing camera.
    fn fps(&self) -> f64;
}

/// Capability interface shared by the hardware and fake cameras.
pub trait Camera {
    fn config(&self) -> &CameraConfig;

    /// Block until the next frame is available.
    fn next_request(&mut self) -> Result<Box<dyn Request>>;

    /// The 3x3 intrinsic matrix.
    fn intrinsic(&self) -> Matrix3<f64> {
        self.config().lens.intrinsics.matrix()
    }

    /// Distortion coefficients: k1, k2, p1, p2, k3.
    fn dist(&self) -> [f64; 5] {
        self.config().lens.distortion.coefficients()
    }

    fn size(&self) -> Size {
        self.config().size
    }
}

/// Smoothed frame rate from frame timestamps.
#[derive(Debug, Clone, Default)]
pub struct FpsMeter {
    last_us: Option<u64>,
    fps: f64,
}

impl FpsMeter {
    const SMOOTHING: f64 = 0.1;

    /// Record a frame timestamp, in microseconds, and return the current rate.
    pub fn tick(&mut self, timestamp_us: u64) -> f64 {
        if let Some(last) = self.last_us {
            let interval = timestamp_us.saturating_sub(last);
            if interval > 0 {
                let instant = 1e6 / interval as f64;
                self.fps = if self.fps == 0.0 {
                    instant
                } else {
                    self.fps + Self::SMOOTHING * (instant - self.fps)
                };
            }
        }
        self.last_us = Some(timestamp_us);
        self.fps
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}
