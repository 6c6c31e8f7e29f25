//! Read-only view of the simulation: named camera poses and body positions.

use std::collections::BTreeMap;

use cube_pose_core::CameraPose;
use nalgebra::{Matrix3, Point3};
use serde::{Deserialize, Serialize};

/// Camera pose as reported by the simulator.
///
/// The simulator camera looks along its local `-z` with `y` up in the image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimCameraPose {
    pub position: [f64; 3],
    /// Row-major camera-to-world rotation.
    pub rotation: [[f64; 3]; 3],
}

impl SimCameraPose {
    /// Apply the axis-convention correction and return a CV camera pose.
    pub fn to_camera_pose(&self) -> CameraPose {
        let [x, y, z] = self.position;
        let r = self.rotation;
        let m = Matrix3::new(
            r[0][0], r[0][1], r[0][2], //
            r[1][0], r[1][1], r[1][2], //
            r[2][0], r[2][1], r[2][2],
        );
        CameraPose::from_opengl(Point3::new(x, y, z), &m)
    }

    /// Inverse of [`SimCameraPose::to_camera_pose`].
    pub fn from_camera_pose(pose: &CameraPose) -> Self {
        let m = pose.rotation.matrix() * cube_pose_core::opengl_to_cv();
        let p = pose.position;
        Self {
            position: [p.x, p.y, p.z],
            rotation: [
                [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
                [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
                [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
            ],
        }
    }
}

/// Queries the estimator needs from the simulation.
pub trait SceneContext {
    fn camera_pose(&self, name: &str) -> Option<SimCameraPose>;
    /// Ground-truth world position of a named body.
    fn body_position(&self, name: &str) -> Option<Point3<f64>>;
}

/// Snapshot of a scene, loadable from JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticScene {
    #[serde(default)]
    pub cameras: BTreeMap<String, SimCameraPose>,
    #[serde(default)]
    pub bodies: BTreeMap<String, [f64; 3]>,
}

impl StaticScene {
    pub fn with_camera(mut self, name: impl Into<String>, pose: SimCameraPose) -> Self {
        self.cameras.insert(name.into(), pose);
        self
    }

    pub fn with_body(mut self, name: impl Into<String>, position: Point3<f64>) -> Self {
        self.bodies
            .insert(name.into(), [position.x, position.y, position.z]);
        self
    }
}

impl SceneContext for StaticScene {
    fn camera_pose(&self, name: &str) -> Option<SimCameraPose> {
        self.cameras.get(name).copied()
    }

    fn body_position(&self, name: &str) -> Option<Point3<f64>> {
        self.bodies
            .get(name)
            .map(|&[x, y, z]| Point3::new(x, y, z))
    }
}
