use super::{ValidationError, ValidationOutcome};
use crate::detection::MarkerDetection;
use cube_pose_core::PoseEstimate;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output of one estimation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CubeEstimate {
    /// Whether a usable marker was found.
    pub detected: bool,
    /// Everything the detector reported, before selection.
    pub detections: Vec<MarkerDetection>,
    /// Id of the marker the pose was solved from.
    pub marker_id: Option<u32>,
    pub pose: Option<PoseEstimate>,
}

impl CubeEstimate {
    pub(crate) fn not_detected(detections: Vec<MarkerDetection>) -> Self {
        Self {
            detected: false,
            detections,
            marker_id: None,
            pose: None,
        }
    }

    /// Estimated cube center in world coordinates, if a marker was detected.
    pub fn cube_position(&self) -> Option<Point3<f64>> {
        self.pose.as_ref().map(|p| p.cube_center_world)
    }
}

/// Validation verdict as recorded in a [`FrameReport`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationStatus {
    Skipped,
    Passed { distance: f64 },
    Failed { distance: f64, tolerance: f64 },
}

impl From<Result<ValidationOutcome, ValidationError>> for ValidationStatus {
    fn from(r: Result<ValidationOutcome, ValidationError>) -> Self {
        match r {
            Ok(ValidationOutcome::Skipped) => Self::Skipped,
            Ok(ValidationOutcome::Passed { distance }) => Self::Passed { distance },
            Err(ValidationError::Deviation {
                distance,
                tolerance,
            }) => Self::Failed {
                distance,
                tolerance,
            },
        }
    }
}

/// Human- and machine-readable summary of one processed frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub detected: bool,
    pub marker_id: Option<u32>,
    pub detection_count: usize,
    pub estimate: Option<[f64; 3]>,
    pub ground_truth: [f64; 3],
    pub reprojection_rmse: Option<f64>,
    pub validation: ValidationStatus,
    pub capture_path: Option<PathBuf>,
}

impl FrameReport {
    pub(crate) fn new(
        estimate: &CubeEstimate,
        ground_truth: Point3<f64>,
        validation: ValidationStatus,
        capture_path: Option<PathBuf>,
    ) -> Self {
        Self {
            detected: estimate.detected,
            marker_id: estimate.marker_id,
            detection_count: estimate.detections.len(),
            estimate: estimate.cube_position().map(|p| [p.x, p.y, p.z]),
            ground_truth: [ground_truth.x, ground_truth.y, ground_truth.z],
            reprojection_rmse: estimate.pose.as_ref().map(|p| p.reprojection_rmse),
            validation,
            capture_path,
        }
    }

    /// Turn a failed validation back into an error.
    pub fn check(&self) -> Result<ValidationOutcome, ValidationError> {
        match self.validation {
            ValidationStatus::Skipped => Ok(ValidationOutcome::Skipped),
            ValidationStatus::Passed { distance } => Ok(ValidationOutcome::Passed { distance }),
            ValidationStatus::Failed {
                distance,
                tolerance,
            } => Err(ValidationError::Deviation {
                distance,
                tolerance,
            }),
        }
    }
}
