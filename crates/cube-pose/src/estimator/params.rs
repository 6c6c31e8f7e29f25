use super::EstimateError;
use crate::detection::{MarkerDictionary, MarkerSelection};
use cube_pose_core::{CameraParams, MarkerGeometryParams, PnpParams};
use serde::{Deserialize, Serialize};

/// Maximum accepted distance between estimate and ground truth.
pub const DEFAULT_TOLERANCE: f64 = 0.05;

/// Configuration for [`CubePoseEstimator`](super::CubePoseEstimator).
///
/// The default describes the reference scene: a 640x480 camera with a 90 degree
/// vertical field of view and a 0.1 cube centered at `(-0.3, -0.3, 0.05)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorParams {
    pub camera: CameraParams,
    pub marker: MarkerGeometryParams,
    /// Dictionary passed to the marker detector.
    pub dictionary: MarkerDictionary,
    /// Only solve for this marker id when set.
    pub expected_marker_id: Option<u32>,
    /// Policy when several markers are visible.
    pub selection: MarkerSelection,
    pub tolerance: f64,
    pub pnp: PnpParams,
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self {
            camera: CameraParams::default(),
            marker: MarkerGeometryParams::default(),
            dictionary: MarkerDictionary::default(),
            expected_marker_id: None,
            selection: MarkerSelection::default(),
            tolerance: DEFAULT_TOLERANCE,
            pnp: PnpParams::default(),
        }
    }
}

impl EstimatorParams {
    /// Checks that do not need the derived camera or geometry.
    pub(crate) fn check(&self) -> Result<(), EstimateError> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(EstimateError::InvalidTolerance {
                tolerance: self.tolerance,
            });
        }
        if let Some(id) = self.expected_marker_id {
            if !self.dictionary.contains(id) {
                return Err(EstimateError::MarkerIdOutOfRange {
                    id,
                    dictionary: self.dictionary,
                });
            }
        }
        Ok(())
    }
}
