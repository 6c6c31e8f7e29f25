//! Rigid frames: camera poses, axis conventions and the final cube estimate.
//!
//! All camera poses here follow the computer-vision convention: x right,
//! y down, z forward (the optical axis). Simulation cameras that look along
//! their local `-z` with `y` up are converted with [`CameraPose::from_opengl`].

use crate::geometry::MarkerGeometry;
use crate::pnp::PnpSolution;
use nalgebra::{Isometry3, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Flip from an OpenGL-style camera frame (y up, looking along -z) to the
/// computer-vision frame (y down, looking along +z).
pub fn opengl_to_cv() -> Matrix3<f64> {
    Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, -1.0))
}

/// World-from-camera transform in the computer-vision convention.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    /// Columns are the camera axes expressed in world coordinates.
    pub rotation: Rotation3<f64>,
    /// Camera center in world coordinates.
    pub position: Point3<f64>,
}

impl CameraPose {
    pub fn new(rotation: Rotation3<f64>, position: Point3<f64>) -> Self {
        Self { rotation, position }
    }

    /// Convert a simulation camera pose (OpenGL axes) into the CV convention.
    ///
    /// `rotation` maps camera-frame vectors to world; it is re-orthonormalized
    /// since simulators report it in single precision.
    pub fn from_opengl(position: Point3<f64>, rotation: &Matrix3<f64>) -> Self {
        let r = Rotation3::from_matrix(&(rotation * opengl_to_cv()));
        Self::new(r, position)
    }

    /// Camera at `eye` looking at `target`, with `up` pointing up in the image.
    ///
    /// Returns `None` when the viewing direction is degenerate or parallel to `up`.
    pub fn look_at(eye: Point3<f64>, target: Point3<f64>, up: Vector3<f64>) -> Option<Self> {
        let forward = (target - eye).try_normalize(1e-12)?;
        let right = forward.cross(&up).try_normalize(1e-12)?;
        let down = forward.cross(&right);
        let m = Matrix3::from_columns(&[right, down, forward]);
        Some(Self::new(Rotation3::from_matrix_unchecked(m), eye))
    }

    pub fn isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.position.coords),
            UnitQuaternion::from_rotation_matrix(&self.rotation),
        )
    }

    /// Express a world point in this camera's frame.
    pub fn world_to_camera(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.inverse() * (p - self.position))
    }

    pub fn camera_to_world(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation * p + self.position.coords
    }

    /// Viewing direction in world coordinates.
    pub fn optical_axis(&self) -> Vector3<f64> {
        self.rotation * Vector3::z()
    }
}

/// Cube pose recovered from one marker observation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseEstimate {
    /// Object-to-camera rotation.
    pub rotation: Rotation3<f64>,
    /// Object-to-camera translation.
    pub translation: Vector3<f64>,
    /// Camera center expressed in the object frame, `-R^T t`.
    pub camera_position_object: Point3<f64>,
    /// Camera center in world coordinates, recovered through the solved pose.
    pub camera_position_world: Point3<f64>,
    pub cube_center_world: Point3<f64>,
    pub reprojection_rmse: f64,
}

impl PoseEstimate {
    /// Compose a PnP solution with the camera's world pose.
    ///
    /// `cube_center_world = T_world_cam * T_cam_obj * cube_center_obj`.
    pub fn compose(solution: &PnpSolution, camera: &CameraPose, geometry: &MarkerGeometry) -> Self {
        let world_from_object = camera.isometry() * solution.isometry();
        let camera_position_object = solution.camera_position();

        Self {
            rotation: solution.rotation,
            translation: solution.translation,
            camera_position_object,
            camera_position_world: world_from_object * camera_position_object,
            cube_center_world: world_from_object * geometry.cube_center(),
            reprojection_rmse: solution.reprojection_rmse,
        }
    }

    /// Euclidean distance between the estimate and a reference position.
    pub fn distance_to(&self, reference: &Point3<f64>) -> f64 {
        (self.cube_center_world - reference).norm()
    }
}
