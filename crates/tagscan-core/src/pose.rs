use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Below this value of `sqrt(R00^2 + R10^2)` the rotation is treated as
/// gimbal-locked and yaw is pinned to zero.
pub const SINGULAR_EPS: f64 = 1e-6;

/// Pinhole camera intrinsics in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Intrinsics with the principal point in the middle of a `width x height` image.
    pub fn centered(fx: f64, fy: f64, width: usize, height: usize) -> Self {
        Self {
            fx,
            fy,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
        }
    }

    /// Camera matrix `K`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }
}

/// Roll/pitch/yaw in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// Decompose a rotation matrix into roll/pitch/yaw (degrees).
pub fn rotation_to_euler(r: &Matrix3<f64>) -> EulerAngles {
    let sy = (r[(0, 0)] * r[(0, 0)] + r[(1, 0)] * r[(1, 0)]).sqrt();

    let (roll, pitch, yaw) = if sy >= SINGULAR_EPS {
        (
            r[(2, 1)].atan2(r[(2, 2)]),
            (-r[(2, 0)]).atan2(sy),
            r[(1, 0)].atan2(r[(0, 0)]),
        )
    } else {
        (
            (-r[(1, 2)]).atan2(r[(1, 1)]),
            (-r[(2, 0)]).atan2(sy),
            0.0,
        )
    };

    EulerAngles {
        roll: roll * 180.0 / std::f64::consts::PI,
        pitch: pitch * 180.0 / std::f64::consts::PI,
        yaw: yaw * 180.0 / std::f64::consts::PI,
    }
}

/// 6-DOF tag pose in the camera frame plus quantities derived from it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseEstimate {
    pub rotation: Matrix3<f64>,
    /// Translation in the unit of the tag size (usually meters).
    pub translation: Vector3<f64>,
    /// Solver residual; lower is better, not bounded above.
    pub error: f64,
    pub euler: EulerAngles,
    /// Euclidean norm of `translation`.
    pub distance: f64,
}

impl PoseEstimate {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>, error: f64) -> Self {
        let euler = rotation_to_euler(&rotation);
        let distance = (translation.x * translation.x
            + translation.y * translation.y
            + translation.z * translation.z)
            .sqrt();
        Self {
            rotation,
            translation,
            error,
            euler,
            distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identity_has_zero_angles() {
        let e = rotation_to_euler(&Matrix3::identity());
        assert_eq!(e, EulerAngles::default());
    }

    #[test]
    fn pure_yaw_is_recovered() {
        let a = 30f64.to_radians();
        let r = Matrix3::new(
            a.cos(), -a.sin(), 0.0, //
            a.sin(), a.cos(), 0.0, //
            0.0, 0.0, 1.0,
        );
        let e = rotation_to_euler(&r);
        assert_relative_eq!(e.yaw, 30.0, epsilon = 1e-9);
        assert_relative_eq!(e.roll, 0.0, epsilon = 1e-9);
        assert_relative_eq!(e.pitch, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn half_turn_about_z_reports_180_yaw() {
        let r = Matrix3::new(
            -1.0, 0.0, 0.0, //
            0.0, -1.0, 0.0, //
            0.0, 0.0, 1.0,
        );
        let e = rotation_to_euler(&r);
        assert_relative_eq!(e.yaw, 180.0, epsilon = 1e-9);
        assert_relative_eq!(e.roll, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn gimbal_lock_takes_singular_branch() {
        // Pitch of +90 degrees: R00 = R10 = 0.
        let r = Matrix3::new(
            0.0, 0.0, 1.0, //
            0.0, 1.0, 0.0, //
            -1.0, 0.0, 0.0,
        );
        let e = rotation_to_euler(&r);
        assert_eq!(e.yaw, 0.0);
        assert_eq!(e.pitch, 1f64.atan2(0.0) * 180.0 / std::f64::consts::PI);
        assert_relative_eq!(e.pitch, 90.0, epsilon = 1e-12);
        assert_eq!(e.roll, (-0.0f64).atan2(1.0) * 180.0 / std::f64::consts::PI);
    }

    #[test]
    fn all_zero_first_column_gives_atan2_zero_zero_pitch() {
        let mut r = Matrix3::identity();
        r[(0, 0)] = 0.0;
        let e = rotation_to_euler(&r);
        assert_eq!(e.yaw, 0.0);
        assert_eq!(e.pitch, (-0.0f64).atan2(0.0) * 180.0 / std::f64::consts::PI);
    }

    #[test]
    fn pose_distance_is_translation_norm() {
        let pose = PoseEstimate::new(Matrix3::identity(), Vector3::new(3.0, 4.0, 12.0), 0.25);
        assert_eq!(pose.distance, 13.0);
        assert_eq!(pose.error, 0.25);
        assert_eq!(pose.euler, EulerAngles::default());
    }

    #[test]
    fn centered_intrinsics_use_half_dimensions() {
        let k = CameraIntrinsics::centered(500.0, 500.0, 640, 481);
        assert_eq!(k.cx, 320.0);
        assert_eq!(k.cy, 240.5);
        assert_eq!(k.matrix()[(0, 2)], 320.0);
    }
}
