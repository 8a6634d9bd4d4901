//! Camera intrinsics and radial-tangential lens distortion.
//!
//! Only the four tag corners are undistorted, never the whole frame.

use nalgebra::Matrix3;

use super::Point;
use crate::module::util::conf::Calibration;

/// Pinhole camera intrinsics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length in x (pixels).
    pub fx: f64,
    /// Focal length in y (pixels).
    pub fy: f64,
    /// Principal point x (pixels).
    pub cx: f64,
    /// Principal point y (pixels).
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Returns `true` when focal lengths are finite and non-zero.
    pub fn is_valid(self) -> bool {
        self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }

    /// The 3x3 camera matrix.
    pub fn matrix(self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// Convert pixel coordinates to normalized pinhole coordinates.
    pub fn pixel_to_normalized(self, pixel: Point) -> Option<Point> {
        if !self.is_valid() {
            return None;
        }
        let x = (pixel[0] - self.cx) / self.fx;
        let y = (pixel[1] - self.cy) / self.fy;
        (x.is_finite() && y.is_finite()).then_some([x, y])
    }

    /// Convert normalized pinhole coordinates to pixel coordinates.
    pub fn normalized_to_pixel(self, normalized: Point) -> Point {
        [
            self.fx * normalized[0] + self.cx,
            self.fy * normalized[1] + self.cy,
        ]
    }
}

/// Brown-Conrady radial-tangential distortion coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RadialTangentialDistortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl RadialTangentialDistortion {
    /// Coefficients in OpenCV order: k1, k2, p1, p2, k3.
    pub fn coefficients(self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    /// Apply distortion to normalized coordinates.
    pub fn distort_normalized(self, normalized: Point) -> Point {
        let [x, y] = normalized;
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        [x * radial + x_tan, y * radial + y_tan]
    }
}

const UNDISTORT_ITERS: usize = 20;
const UNDISTORT_EPS: f64 = 1e-12;

/// Complete lens model: intrinsics plus distortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LensModel {
    pub intrinsics: CameraIntrinsics,
    pub distortion: RadialTangentialDistortion,
}

impl LensModel {
    /// A distortion-free lens.
    pub fn pinhole(intrinsics: CameraIntrinsics) -> Self {
        Self {
            intrinsics,
            distortion: RadialTangentialDistortion::default(),
        }
    }

    /// Distort an undistorted pixel into image pixel coordinates.
    pub fn distort_pixel(self, undistorted: Point) -> Option<Point> {
        let xn = self.intrinsics.pixel_to_normalized(undistorted)?;
        let xd = self.distortion.distort_normalized(xn);
        let pix = self.intrinsics.normalized_to_pixel(xd);
        (pix[0].is_finite() && pix[1].is_finite()).then_some(pix)
    }

    /// Undistort one image pixel by fixed-point inversion of the model.
    pub fn undistort_pixel(self, distorted: Point) -> Option<Point> {
        let xd = self.intrinsics.pixel_to_normalized(distorted)?;
        let d = self.distortion;
        let [mut x, mut y] = xd;

        for _ in 0..UNDISTORT_ITERS {
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let r6 = r4 * r2;
            let radial = 1.0 + d.k1 * r2 + d.k2 * r4 + d.k3 * r6;
            if !radial.is_finite() || radial.abs() < 1e-12 {
                return None;
            }

            let dx_tan = 2.0 * d.p1 * x * y + d.p2 * (r2 + 2.0 * x * x);
            let dy_tan = d.p1 * (r2 + 2.0 * y * y) + 2.0 * d.p2 * x * y;
            let x_next = (xd[0] - dx_tan) / radial;
            let y_next = (xd[1] - dy_tan) / radial;
            if !x_next.is_finite() || !y_next.is_finite() {
                return None;
            }

            let step = (x_next - x).hypot(y_next - y);
            x = x_next;
            y = y_next;
            if step <= UNDISTORT_EPS {
                break;
            }
        }

        let out = self.intrinsics.normalized_to_pixel([x, y]);
        (out[0].is_finite() && out[1].is_finite()).then_some(out)
    }

    /// Undistort the four tag corners, keeping their order.
    ///
    /// A corner the model cannot invert is passed through unchanged.
    pub fn undistort_points(&self, corners: &[Point; 4]) -> [Point; 4] {
        corners.map(|p| {
            self.undistort_pixel(p).unwrap_or_else(|| {
                log::debug!("Corner {:?} could not be undistorted", p);
                p
            })
        })
    }
}

impl From<&Calibration> for LensModel {
    fn from(c: &Calibration) -> Self {
        Self {
            intrinsics: CameraIntrinsics {
                fx: c.fx,
                fy: c.fy,
                cx: c.cx,
                cy: c.cy,
            },
            distortion: RadialTangentialDistortion {
                k1: c.k1,
                k2: c.k2,
                p1: c.p1,
                p2: c.p2,
                k3: c.k3,
            },
        }
    }
}
