//! Tag pose from a planar homography.
//!
//! Camera frame: x right, y down, z forward. Tag frame: x right, y up, z out
//! of the tag face, origin at the tag center.

use nalgebra::{Matrix3, Rotation3, SMatrix, SVector, Vector3};

use super::lens::CameraIntrinsics;
use super::{Point, Pose};

/// Tag corners in homography coordinates, in image corner order.
pub const TAG_CORNERS: [Point; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];

/// Turns a homography plus undistorted corners into a pose.
pub trait PoseEstimator: Send {
    fn estimate(
        &self,
        homography: &Matrix3<f64>,
        corners: &[Point; 4],
    ) -> std::result::Result<Pose, String>;
}

/// Pose recovery by homography decomposition.
///
/// The homography is refit to the undistorted corners; the detector's own
/// homography, fit to distorted pixels, is only used when the refit is
/// degenerate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomographyPoseEstimator {
    /// Tag side length, meters.
    pub tag_size: f64,
    pub intrinsics: CameraIntrinsics,
}

impl HomographyPoseEstimator {
    pub fn new(tag_size: f64, intrinsics: CameraIntrinsics) -> Self {
        Self {
            tag_size,
            intrinsics,
        }
    }

    /// Decompose `H ~ K [s*r0, s*r1, t]`.
    fn decompose(
        &self,
        homography: &Matrix3<f64>,
    ) -> std::result::Result<(Rotation3<f64>, Vector3<f64>), String> {
        let k_inv = self
            .intrinsics
            .matrix()
            .try_inverse()
            .ok_or("camera matrix is singular")?;
        let m = k_inv * homography;
        let m0: Vector3<f64> = m.column(0).into_owned();
        let m1: Vector3<f64> = m.column(1).into_owned();
        let m2: Vector3<f64> = m.column(2).into_owned();

        let (n0, n1) = (m0.norm(), m1.norm());
        if !(n0 > 1e-12 && n1 > 1e-12) || !m.iter().all(|v| v.is_finite()) {
            return Err(format!("degenerate homography {homography:?}"));
        }
        let mut scale = (n0 * n1).sqrt();
        // the tag is in front of the camera
        if m2.z < 0.0 {
            scale = -scale;
        }

        let r0 = m0 / scale;
        let r1 = m1 / scale;
        let r2 = r0.cross(&r1);
        let approx = Matrix3::from_columns(&[r0, r1, r2]);

        // nearest rotation
        let svd = approx.svd(true, true);
        let (mut u, v_t) = match (svd.u, svd.v_t) {
            (Some(u), Some(v_t)) => (u, v_t),
            _ => return Err("svd failed".to_owned()),
        };
        let mut rot = u * v_t;
        if rot.determinant() < 0.0 {
            let flipped = -u.column(2);
            u.set_column(2, &flipped);
            rot = u * v_t;
        }

        let translation = m2 / scale * (self.tag_size / 2.0);
        Ok((Rotation3::from_matrix_unchecked(rot), translation))
    }

    /// RMS pixel distance between projected tag corners and the observed ones.
    fn reprojection_error(
        &self,
        rotation: &Rotation3<f64>,
        translation: &Vector3<f64>,
        corners: &[Point; 4],
    ) -> f64 {
        let k = self.intrinsics.matrix();
        let half = self.tag_size / 2.0;
        let sum: f64 = TAG_CORNERS
            .iter()
            .zip(corners.iter())
            .map(|(tag, seen)| {
                let p = k * (rotation * Vector3::new(half * tag[0], half * tag[1], 0.0) + translation);
                let dx = p.x / p.z - seen[0];
                let dy = p.y / p.z - seen[1];
                dx * dx + dy * dy
            })
            .sum();
        (sum / 4.0).sqrt()
    }
}

impl PoseEstimator for HomographyPoseEstimator {
    fn estimate(
        &self,
        homography: &Matrix3<f64>,
        corners: &[Point; 4],
    ) -> std::result::Result<Pose, String> {
        let h = corner_homography(corners).unwrap_or_else(|| {
            log::debug!("Corner refit degenerate, using detector homography");
            *homography
        });
        let (rotation, translation) = self.decompose(&h)?;
        let error = self.reprojection_error(&rotation, &translation, corners);
        Ok(Pose {
            rotation,
            translation,
            error,
        })
    }
}

/// Fit the homography taking [`TAG_CORNERS`] to `corners`, with h33 = 1.
pub fn corner_homography(corners: &[Point; 4]) -> Option<Matrix3<f64>> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for (i, (tag, img)) in TAG_CORNERS.iter().zip(corners.iter()).enumerate() {
        let [x, y] = *tag;
        let [u, v] = *img;
        let r = 2 * i;
        a.row_mut(r)
            .copy_from_slice(&[x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y]);
        a.row_mut(r + 1)
            .copy_from_slice(&[0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y]);
        b[r] = u;
        b[r + 1] = v;
    }
    let h = a.lu().solve(&b)?;
    if !h.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0))
}
