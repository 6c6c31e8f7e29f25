use super::ValidationError;
use crate::capture::CaptureError;
use crate::detection::{DetectorError, MarkerDictionary};
use cube_pose_core::{CameraError, MarkerGeometryError, PnpError};

/// Errors returned by the cube pose estimator.
#[derive(thiserror::Error, Debug)]
pub enum EstimateError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Geometry(#[from] MarkerGeometryError),
    #[error("validation tolerance must be positive and finite, got {tolerance}")]
    InvalidTolerance { tolerance: f64 },
    #[error("marker id {id} is outside dictionary {dictionary}")]
    MarkerIdOutOfRange { id: u32, dictionary: MarkerDictionary },
    #[error("image is {got_width}x{got_height}, camera expects {width}x{height}")]
    ImageSizeMismatch {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },
    #[error("unknown camera `{name}`")]
    UnknownCamera { name: String },
    #[error("unknown body `{name}`")]
    UnknownBody { name: String },
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Pnp(#[from] PnpError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl EstimateError {
    /// True for setup problems that surface before any frame is processed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Camera(_)
                | Self::Geometry(_)
                | Self::InvalidTolerance { .. }
                | Self::MarkerIdOutOfRange { .. }
                | Self::ImageSizeMismatch { .. }
                | Self::UnknownCamera { .. }
                | Self::UnknownBody { .. }
        )
    }
}
