//! Geometry core for fiducial-based cube localization.
//!
//! This crate is purely geometric: it knows the pinhole camera model, where
//! the marker corners sit on the cube, how to solve a planar PnP problem and
//! how to chain the result with a camera's world pose. It does *not* depend on
//! any image type or marker detector.
//!
//! ```
//! use cube_pose_core::{solve_planar_pnp, CameraParams, CameraPose, MarkerGeometryParams, PnpParams, PoseEstimate};
//! use nalgebra::{Point3, Vector3};
//!
//! let k = CameraParams::default().intrinsics().unwrap();
//! let geometry = MarkerGeometryParams::default().build().unwrap();
//! let camera = CameraPose::look_at(
//!     Point3::new(1.0, -0.3, 0.3),
//!     geometry.face_center(),
//!     Vector3::z(),
//! )
//! .unwrap();
//!
//! // Synthetic detection: project the corners through the camera.
//! let pixels: Vec<_> = geometry
//!     .corners()
//!     .iter()
//!     .map(|p| k.project(&camera.world_to_camera(p)).unwrap())
//!     .collect();
//!
//! let solution = solve_planar_pnp(geometry.corners(), &pixels, &k, &PnpParams::default()).unwrap();
//! let estimate = PoseEstimate::compose(&solution, &camera, &geometry);
//! assert!(estimate.distance_to(&geometry.cube_center()) < 1e-6);
//! ```

mod camera;
mod geometry;
mod homography;
mod logger;
mod pnp;
mod pose;

pub use camera::{CameraError, CameraIntrinsics, CameraParams, DistortionModel};
pub use geometry::{
    MarkerGeometry, MarkerGeometryError, MarkerGeometryParams, DEFAULT_MARKER_MARGIN,
};
pub use homography::{estimate_homography, homography_from_4pt, Homography};
pub use pnp::{solve_planar_pnp, PnpError, PnpParams, PnpSolution, MIN_CORRESPONDENCES};
pub use pose::{opengl_to_cv, CameraPose, PoseEstimate};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
