//! Pinhole camera intrinsics derived from image resolution and vertical field of view.
//!
//! The model is a zero-skew, zero-distortion pinhole with square pixels, which
//! is exactly what a rendered simulation camera produces.

use nalgebra::{Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};

/// Invalid camera configuration.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum CameraError {
    #[error("invalid image resolution (width={width}, height={height})")]
    InvalidResolution { width: u32, height: u32 },
    #[error("vertical field of view must lie in (0, 180) degrees, got {fovy_deg}")]
    InvalidFieldOfView { fovy_deg: f64 },
}

/// Camera configuration as it appears in scene descriptions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraParams {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Vertical field of view in degrees.
    pub fovy_deg: f64,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fovy_deg: 90.0,
        }
    }
}

impl CameraParams {
    pub fn intrinsics(&self) -> Result<CameraIntrinsics, CameraError> {
        CameraIntrinsics::from_fovy(self.width, self.height, self.fovy_deg)
    }
}

/// Pinhole camera intrinsics.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length in x (pixels).
    pub fx: f64,
    /// Focal length in y (pixels).
    pub fy: f64,
    /// Principal point x (pixels).
    pub cx: f64,
    /// Principal point y (pixels).
    pub cy: f64,
    pub width: u32,
    pub height: u32,
}

impl CameraIntrinsics {
    /// Build intrinsics for a `width x height` image with the given vertical
    /// field of view.
    ///
    /// `fy = height / (2 tan(fovy / 2))`, `fx = fy` (square pixels), and the
    /// principal point sits at the image center.
    pub fn from_fovy(width: u32, height: u32, fovy_deg: f64) -> Result<Self, CameraError> {
        if width == 0 || height == 0 {
            return Err(CameraError::InvalidResolution { width, height });
        }
        if !fovy_deg.is_finite() || fovy_deg <= 0.0 || fovy_deg >= 180.0 {
            return Err(CameraError::InvalidFieldOfView { fovy_deg });
        }

        let fy = height as f64 / (2.0 * (fovy_deg.to_radians() * 0.5).tan());
        Ok(Self {
            fx: fy,
            fy,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
            width,
            height,
        })
    }

    /// The 3x3 intrinsic matrix `K`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Project a point expressed in the camera frame (z forward) to pixels.
    ///
    /// Returns `None` for points at or behind the image plane.
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if p.z <= f64::EPSILON {
            return None;
        }
        Some(Point2::new(
            self.fx * p.x / p.z + self.cx,
            self.fy * p.y / p.z + self.cy,
        ))
    }

    /// Apply `K^-1` to a pixel coordinate.
    #[inline]
    pub fn pixel_to_normalized(&self, px: &Point2<f64>) -> Point2<f64> {
        Point2::new((px.x - self.cx) / self.fx, (px.y - self.cy) / self.fy)
    }

    /// Lens model paired with these intrinsics.
    #[inline]
    pub fn distortion(&self) -> DistortionModel {
        DistortionModel
    }

    /// Whether a pixel lies inside the image bounds.
    pub fn contains(&self, px: &Point2<f64>) -> bool {
        px.x >= 0.0 && px.y >= 0.0 && px.x < self.width as f64 && px.y < self.height as f64
    }
}

/// Lens distortion: four coefficients `(k1, k2, p1, p2)`, always zero.
///
/// The solver assumes an ideal pinhole and never applies distortion; this
/// type only reports the coefficients alongside the intrinsics (see
/// [`CameraIntrinsics::distortion`]).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistortionModel;

impl DistortionModel {
    pub const COEFFICIENTS: [f64; 4] = [0.0; 4];

    #[inline]
    pub fn coefficients(&self) -> [f64; 4] {
        Self::COEFFICIENTS
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        true
    }
}
