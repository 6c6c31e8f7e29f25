//! Marker-based cube localization for simulated camera frames.
//!
//! This crate provides:
//! - re-exports of the geometric core (`cube_pose::core`): camera model,
//!   marker geometry, planar PnP and rigid frames
//! - the seams to the outside world: a [`MarkerDetector`] for finding markers
//!   and a [`SceneContext`] for camera poses and ground truth
//! - [`CubePoseEstimator`], which turns one image into a validated world
//!   position of the cube
//!
//! ## Quickstart
//!
//! ```
//! use cube_pose::{CubePoseEstimator, EstimatorParams, MarkerDetection, ValidationOutcome};
//! use cube_pose::core::CameraPose;
//! use nalgebra::{Point3, Vector3};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let params = EstimatorParams::default();
//! let face = params.marker.build()?.face_center();
//! let camera = CameraPose::look_at(Point3::new(1.0, -0.3, 0.3), face, Vector3::z())
//!     .ok_or("degenerate camera")?;
//! let estimator = CubePoseEstimator::new(params, camera)?;
//!
//! // Stand-in for a real detector: project the marker corners.
//! let k = estimator.intrinsics();
//! let corners = estimator
//!     .geometry()
//!     .corners()
//!     .map(|p| k.project(&camera.world_to_camera(&p)).expect("in front of camera"));
//!
//! let estimate = estimator.estimate_from_detections(&[MarkerDetection::new(0, corners)])?;
//! let truth = Point3::new(-0.3, -0.3, 0.05);
//! assert!(matches!(
//!     estimator.validate(&estimate, &truth)?,
//!     ValidationOutcome::Passed { .. }
//! ));
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `cube_pose::core`: intrinsics, marker geometry, homography, PnP, poses, logging.
//! - `cube_pose::detection`: detections, dictionaries and selection policies.
//! - `cube_pose::scene`: simulation camera poses and ground truth.
//! - `cube_pose::capture`: grayscale conversion and PNG persistence.
//! - `cube_pose::estimator`: the per-frame pipeline and validation.

pub use cube_pose_core as core;

pub mod capture;
pub mod detection;
pub mod estimator;
pub mod scene;

pub use capture::{save_capture, to_gray, CaptureError, CaptureTarget};
pub use detection::{
    select_detection, DetectorError, FixedDetections, MarkerDetection, MarkerDetector,
    MarkerDictionary, MarkerSelection,
};
pub use estimator::{
    validate_position, CubeEstimate, CubePoseEstimator, EstimateError, EstimatorParams,
    FrameReport, ValidationError, ValidationOutcome, ValidationStatus, DEFAULT_TOLERANCE,
};
pub use scene::{SceneContext, SimCameraPose, StaticScene};
