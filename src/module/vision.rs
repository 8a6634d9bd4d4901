//! Processing related to visual information.
//!
//! The tag-family decoding itself comes from outside through [`TagFinder`].
//! Corner undistortion and pose recovery live here.

use nalgebra::{Matrix3, Rotation3, Vector3};
use ndarray::ArrayView2;
use serde::Serialize;

use crate::module::error::Result;

pub mod lens;
pub mod pose;
pub mod tag_detector;

/// Pixel coordinates, x then y.
pub type Point = [f64; 2];

/// One raw tag hit, before any correction.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub id: u32,
    /// Bits the decoder had to correct; anything but zero is not trusted.
    pub hamming: u32,
    /// Distorted image corners: lower left, lower right, upper right, upper left.
    /// The pose estimator relies on this order.
    pub corners: [Point; 4],
    /// Maps tag coordinates in [-1, 1] to distorted image pixels.
    pub homography: Matrix3<f64>,
}

impl Detection {
    /// Mean of the four corners.
    pub fn center(&self) -> Point {
        let sum = self
            .corners
            .iter()
            .fold([0.0, 0.0], |acc, c| [acc[0] + c[0], acc[1] + c[1]]);
        [sum[0] / 4.0, sum[1] / 4.0]
    }
}

/// A tag's pose relative to the camera (camera <- tag), in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
    /// RMS reprojection error of the corners, in pixels.
    pub error: f64,
}

/// One published observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Blip {
    pub id: u32,
    pub pose: Pose,
}

/// Settings handed to the tag finder once, at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub family: String,
    pub threads: usize,
}

impl From<&crate::module::util::conf::Detector> for DetectorConfig {
    fn from(d: &crate::module::util::conf::Detector) -> Self {
        Self {
            family: d.family.clone(),
            threads: d.threads,
        }
    }
}

/// Finds tags in a single-channel image.
///
/// Implementations wrap a tag-family decoder. They may parallelize
/// internally but must return synchronously.
pub trait TagFinder: Send {
    /// Apply family and worker settings.
    fn configure(&mut self, config: &DetectorConfig) -> Result<()>;

    /// Find every tag in the luma image, shape (height, width).
    fn detect(&mut self, luma: ArrayView2<'_, u8>) -> Result<Vec<Detection>>;
}
