//! V4L2 capture through rscam.
//!

use std::time::Duration;

use rscam::Config;

use super::{Camera, CameraConfig, FpsMeter, Request, Size};
use crate::module::error::Result;
use crate::module::identity::Identity;
use crate::module::util::conf;
use crate::module::vision::lens::LensModel;

/// Represents a V4L2 camera configuration and capture functionality.
///
pub struct V4l2Camera {
    cap: rscam::Camera, // The camera instance for capturing frames.
    config: CameraConfig,
    meter: FpsMeter,
}

impl V4l2Camera {
    /// Opens and starts the V4L2 device for the given camera.
    ///
    /// # Arguments
    ///
    /// * `identity` - Selects the calibration.
    /// * `camera_num` - Appended to the device prefix.
    /// * `conf` - Application configuration.
    ///
    pub fn new(identity: Identity, camera_num: u32, conf: &conf::Config) -> Result<Self> {
        let device = format!("{}{}", conf.camera.device_prefix, camera_num);
        let mut cap = rscam::Camera::new(&device)?;

        // Planar YUV 4:2:0, luma plane first.
        cap.start(&Config {
            interval: (1, conf.camera.fps),
            resolution: (conf.camera.width, conf.camera.height),
            format: b"YU12",
            nbuffers: conf.camera.buffers,
            ..Default::default()
        })?;

        let config = CameraConfig {
            size: Size {
                width: conf.camera.width,
                height: conf.camera.height,
            },
            lens: LensModel::from(conf.calibration_for(identity)),
        };
        log::info!(
            "Started {} at {}x{}, {} fps",
            device,
            config.size.width,
            config.size.height,
            conf.camera.fps
        );

        Ok(Self {
            cap,
            config,
            meter: FpsMeter::default(),
        })
    }
}

impl Camera for V4l2Camera {
    fn config(&self) -> &CameraConfig {
        &self.config
    }

    fn next_request(&mut self) -> Result<Box<dyn Request>> {
        let frame = self.cap.capture()?;
        let timestamp_us = frame.get_timestamp();
        let delay = Duration::from_micros(monotonic_us().saturating_sub(timestamp_us));
        let fps = self.meter.tick(timestamp_us);
        Ok(Box::new(V4l2Request { frame, delay, fps }))
    }
}

/// A dequeued driver buffer; the driver gets it back on drop.
struct V4l2Request {
    frame: rscam::Frame,
    delay: Duration,
    fps: f64,
}

impl Request for V4l2Request {
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

/// CLOCK_MONOTONIC in microseconds, the clock V4L2 stamps buffers with.
fn monotonic_us() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    if rc != 0 {
        return 0;
    }
    (ts.tv_sec as u64) * 1_000_000 + (ts.tv_nsec as u64) / 1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_test() {
        let a = monotonic_us();
        std::thread::sleep(Duration::from_millis(2));
        let b = monotonic_us();
        assert!(a > 0);
        assert!(b >= a + 2_000);
    }

    #[test]
    fn missing_device_is_camera_error() {
        let mut conf = crate::module::util::conf::toml::defaults().unwrap();
        conf.camera.device_prefix = "/tmp/tagvisiontest/no/video".to_owned();
        let res = V4l2Camera::new(Identity::Dev, 0, &conf);
        assert!(res.is_err());
    }
}
