//! Per-frame cube localization.
//!
//! This module wires together image conversion, the external marker
//! detector, detection selection, the planar PnP solve, composition with the
//! camera's world pose, and validation against simulation ground truth.

mod error;
mod params;
mod pipeline;
mod result;
mod validation;

pub use error::EstimateError;
pub use params::{EstimatorParams, DEFAULT_TOLERANCE};
pub use pipeline::CubePoseEstimator;
pub use result::{CubeEstimate, FrameReport, ValidationStatus};
pub use validation::{validate_position, ValidationError, ValidationOutcome};
