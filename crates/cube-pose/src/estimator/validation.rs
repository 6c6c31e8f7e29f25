use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Estimated position too far from ground truth.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum ValidationError {
    #[error("estimate deviates from ground truth by {distance:.4} (tolerance {tolerance})")]
    Deviation { distance: f64, tolerance: f64 },
}

/// Result of a validation that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    /// Nothing was detected, so there was nothing to check.
    Skipped,
    Passed { distance: f64 },
}

/// Compare an estimate with ground truth. Fails when `distance >= tolerance`.
pub fn validate_position(
    estimate: &Point3<f64>,
    ground_truth: &Point3<f64>,
    tolerance: f64,
) -> Result<f64, ValidationError> {
    let distance = (estimate - ground_truth).norm();
    // NaN distances fail as well.
    if distance < tolerance {
        Ok(distance)
    } else {
        Err(ValidationError::Deviation {
            distance,
            tolerance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_is_exclusive() {
        let origin = Point3::origin();
        assert!(validate_position(&origin, &Point3::new(0.0499999, 0.0, 0.0), 0.05).is_ok());
        assert_eq!(
            validate_position(&origin, &Point3::new(0.05, 0.0, 0.0), 0.05),
            Err(ValidationError::Deviation {
                distance: 0.05,
                tolerance: 0.05
            })
        );
        assert!(validate_position(&origin, &Point3::new(0.0, 0.1, 0.0), 0.05).is_err());
    }

    #[test]
    fn nan_estimate_fails() {
        let nan = Point3::new(f64::NAN, 0.0, 0.0);
        assert!(validate_position(&nan, &Point3::origin(), 0.05).is_err());
    }
}
