//! Tag pose from a plane-induced homography.
//!
//! The homography maps tag coordinates `(u, v) in [-1, 1]^2` to pixels. The
//! tag is the plane `Z = 0` in its own frame with side `tag_size`, so the
//! tag point `(u, v)` sits at `(u, v, 0) * tag_size / 2`.

use nalgebra::{Matrix3, Vector3};
use tagscan_core::CameraIntrinsics;

use crate::{EngineError, EnginePose, RawDetection};

/// Tag coordinates of the four corners, in engine corner order.
pub const TAG_CORNER_COORDS: [[f64; 2]; 4] = [[-1.0, 1.0], [1.0, 1.0], [1.0, -1.0], [-1.0, -1.0]];

/// Metric position of a tag-coordinate point on the tag plane.
#[inline]
pub fn tag_object_point(uv: [f64; 2], tag_size: f64) -> Vector3<f64> {
    let half = tag_size / 2.0;
    Vector3::new(uv[0] * half, uv[1] * half, 0.0)
}

/// Decompose `detection.homography` into a camera-frame pose.
///
/// Follows the classic `K^-1 H` column normalisation, orthonormalises the
/// rotation through SVD and reports the mean corner reprojection error in
/// pixels as the residual.
pub fn solve_pose_from_homography(
    detection: &RawDetection,
    intrinsics: &CameraIntrinsics,
    tag_size: f64,
) -> Result<EnginePose, EngineError> {
    if !tag_size.is_finite() || tag_size <= 0.0 {
        return Err(EngineError::PoseSolve(format!(
            "tag size must be positive, got {tag_size}"
        )));
    }
    if intrinsics.fx == 0.0 || intrinsics.fy == 0.0 {
        return Err(EngineError::PoseSolve("focal length must be non-zero".into()));
    }

    let h = &detection.homography;
    let (fx, fy) = (-intrinsics.fx, intrinsics.fy);
    let (cx, cy) = (intrinsics.cx, intrinsics.cy);

    let mut c1 = Vector3::new(
        (h[(0, 0)] - cx * h[(2, 0)]) / fx,
        (h[(1, 0)] - cy * h[(2, 0)]) / fy,
        h[(2, 0)],
    );
    let mut c2 = Vector3::new(
        (h[(0, 1)] - cx * h[(2, 1)]) / fx,
        (h[(1, 1)] - cy * h[(2, 1)]) / fy,
        h[(2, 1)],
    );
    let mut t = Vector3::new(
        (h[(0, 2)] - cx * h[(2, 2)]) / fx,
        (h[(1, 2)] - cy * h[(2, 2)]) / fy,
        h[(2, 2)],
    );

    let scale_sq = c1.norm() * c2.norm();
    if !scale_sq.is_finite() || scale_sq <= f64::EPSILON {
        return Err(EngineError::PoseSolve("degenerate homography".into()));
    }
    let mut s = 1.0 / scale_sq.sqrt();
    // The tag must end up in front of the camera.
    if t.z > 0.0 {
        s = -s;
    }
    c1 *= s;
    c2 *= s;
    t *= s;

    let mut r = Matrix3::zeros();
    r.set_column(0, &c1);
    r.set_column(1, &c2);
    r.set_column(2, &c1.cross(&c2));

    let svd = r.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(EngineError::PoseSolve("SVD did not converge".into()));
    };
    let mut rotation = u * v_t;
    if rotation.determinant() < 0.0 {
        let mut u_flipped = u;
        for row in 0..3 {
            u_flipped[(row, 2)] = -u_flipped[(row, 2)];
        }
        rotation = u_flipped * v_t;
    }

    t *= tag_size / 2.0;

    // Flip y and z: the decomposition above works in a y-up, z-backward frame.
    let flip = Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, -1.0));
    let rotation = flip * rotation;
    let translation = flip * t;

    if rotation.iter().chain(translation.iter()).any(|v| !v.is_finite()) {
        return Err(EngineError::PoseSolve("non-finite pose".into()));
    }

    let error = reprojection_error(
        &rotation,
        &translation,
        intrinsics,
        tag_size,
        &detection.corners,
    );

    Ok(EnginePose {
        rotation,
        translation,
        error,
    })
}

/// Mean pixel distance between detected corners and the projected tag corners.
pub fn reprojection_error(
    rotation: &Matrix3<f64>,
    translation: &Vector3<f64>,
    intrinsics: &CameraIntrinsics,
    tag_size: f64,
    corners: &[[f64; 2]; 4],
) -> f64 {
    let total: f64 = TAG_CORNER_COORDS
        .iter()
        .zip(corners)
        .map(|(uv, observed)| {
            let p = rotation * tag_object_point(*uv, tag_size) + translation;
            let u = intrinsics.fx * p.x / p.z + intrinsics.cx;
            let v = intrinsics.fy * p.y / p.z + intrinsics.cy;
            ((u - observed[0]).powi(2) + (v - observed[1]).powi(2)).sqrt()
        })
        .sum();
    total / corners.len() as f64
}
