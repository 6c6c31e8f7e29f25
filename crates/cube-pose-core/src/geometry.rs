//! 3D corner layout of a square marker printed on a cube face.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Border between the printed pattern and the cube edge.
pub const DEFAULT_MARKER_MARGIN: f64 = 0.02;

/// Invalid marker geometry.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum MarkerGeometryError {
    #[error("marker size must be positive and finite, got {size}")]
    InvalidSize { size: f64 },
    #[error("margin must lie in [0, {size}), got {margin}")]
    InvalidMargin { size: f64, margin: f64 },
    #[error("marker center must be finite")]
    NonFiniteCenter,
}

/// Marker geometry as it appears in scene descriptions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerGeometryParams {
    /// Side length of the cube face carrying the marker.
    pub marker_size: f64,
    /// Reference point of the object frame (the cube center).
    pub marker_center: [f64; 3],
    pub margin: f64,
}

impl Default for MarkerGeometryParams {
    fn default() -> Self {
        Self {
            marker_size: 0.1,
            marker_center: [-0.3, -0.3, 0.05],
            margin: DEFAULT_MARKER_MARGIN,
        }
    }
}

impl MarkerGeometryParams {
    pub fn build(&self) -> Result<MarkerGeometry, MarkerGeometryError> {
        let [x, y, z] = self.marker_center;
        MarkerGeometry::new(self.marker_size, Point3::new(x, y, z), self.margin)
    }
}

/// Four marker corners on the `+X` face of a cube, in the object frame.
///
/// With `h = (size - margin) / 2` and `h_full = size / 2`, corner `i` is
/// `center + (h_full, sy_i * h, sz_i * h)` where `(sy, sz)` runs through
/// `(+,+)`, `(+,-)`, `(-,-)`, `(-,+)`. Index `i` pairs with detected image
/// corner `i`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerGeometry {
    marker_size: f64,
    margin: f64,
    center: Point3<f64>,
    corners: [Point3<f64>; 4],
}

impl MarkerGeometry {
    pub fn new(
        marker_size: f64,
        marker_center: Point3<f64>,
        margin: f64,
    ) -> Result<Self, MarkerGeometryError> {
        if !marker_size.is_finite() || marker_size <= 0.0 {
            return Err(MarkerGeometryError::InvalidSize { size: marker_size });
        }
        if !margin.is_finite() || margin < 0.0 || margin >= marker_size {
            return Err(MarkerGeometryError::InvalidMargin {
                size: marker_size,
                margin,
            });
        }
        if !marker_center.coords.iter().all(|v| v.is_finite()) {
            return Err(MarkerGeometryError::NonFiniteCenter);
        }

        let h = (marker_size - margin) / 2.0;
        let h_full = marker_size / 2.0;
        let corners = [(h, h), (h, -h), (-h, -h), (-h, h)]
            .map(|(dy, dz)| marker_center + Vector3::new(h_full, dy, dz));

        Ok(Self {
            marker_size,
            margin,
            center: marker_center,
            corners,
        })
    }

    /// Geometry with the reference margin.
    pub fn with_default_margin(
        marker_size: f64,
        marker_center: Point3<f64>,
    ) -> Result<Self, MarkerGeometryError> {
        Self::new(marker_size, marker_center, DEFAULT_MARKER_MARGIN)
    }

    #[inline]
    pub fn corners(&self) -> &[Point3<f64>; 4] {
        &self.corners
    }

    /// Cube center in the object frame.
    #[inline]
    pub fn cube_center(&self) -> Point3<f64> {
        self.center
    }

    /// Center of the face carrying the marker.
    pub fn face_center(&self) -> Point3<f64> {
        self.center + Vector3::new(self.marker_size / 2.0, 0.0, 0.0)
    }

    /// Outward face normal in the object frame.
    pub fn face_normal(&self) -> Vector3<f64> {
        Vector3::x()
    }

    #[inline]
    pub fn marker_size(&self) -> f64 {
        self.marker_size
    }

    #[inline]
    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// Side length of the printed pattern.
    pub fn pattern_side(&self) -> f64 {
        self.marker_size - self.margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn reference() -> MarkerGeometry {
        MarkerGeometryParams::default().build().expect("reference geometry")
    }

    #[test]
    fn reference_corners_match_layout() {
        let g = reference();
        let expected = [
            [-0.25, -0.26, 0.09],
            [-0.25, -0.26, 0.01],
            [-0.25, -0.34, 0.01],
            [-0.25, -0.34, 0.09],
        ];
        for (c, e) in g.corners().iter().zip(expected) {
            assert_relative_eq!(c.x, e[0], epsilon = 1e-12);
            assert_relative_eq!(c.y, e[1], epsilon = 1e-12);
            assert_relative_eq!(c.z, e[2], epsilon = 1e-12);
        }
        assert_relative_eq!(g.pattern_side(), 0.08, epsilon = 1e-12);
    }

    #[test]
    fn construction_is_deterministic() {
        let a = MarkerGeometry::with_default_margin(0.1, Point3::new(0.1, 0.2, 0.3)).unwrap();
        let b = MarkerGeometry::with_default_margin(0.1, Point3::new(0.1, 0.2, 0.3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn corners_are_coplanar_and_equidistant() {
        let g = MarkerGeometry::new(0.25, Point3::new(1.0, -2.0, 0.5), 0.03).unwrap();
        let c = g.corners();
        let n = (c[1] - c[0]).cross(&(c[3] - c[0]));
        for p in c {
            assert_relative_eq!(n.dot(&(p - c[0])), 0.0, epsilon = 1e-12);
        }

        let d0 = (c[0] - g.cube_center()).norm();
        for p in c {
            assert_relative_eq!((p - g.cube_center()).norm(), d0, epsilon = 1e-12);
        }

        // The square is centered on the face, which sits at half the size.
        let centroid = c.iter().fold(Vector3::<f64>::zeros(), |acc, p| acc + p.coords) / 4.0;
        assert_relative_eq!(centroid, g.face_center().coords, epsilon = 1e-12);
        assert_relative_eq!(
            (g.face_center() - g.cube_center()).dot(&g.face_normal()),
            0.125,
            epsilon = 1e-12
        );
    }

    #[test]
    fn adjacent_corners_span_the_pattern() {
        let g = reference();
        let c = g.corners();
        for i in 0..4 {
            let side = (c[(i + 1) % 4] - c[i]).norm();
            assert_relative_eq!(side, g.pattern_side(), epsilon = 1e-12);
        }
    }

    #[test]
    fn rejects_invalid_parameters() {
        let o = Point3::origin();
        assert!(matches!(
            MarkerGeometry::new(0.0, o, 0.0),
            Err(MarkerGeometryError::InvalidSize { .. })
        ));
        assert!(matches!(
            MarkerGeometry::new(f64::NAN, o, 0.0),
            Err(MarkerGeometryError::InvalidSize { .. })
        ));
        assert!(matches!(
            MarkerGeometry::new(0.1, o, 0.1),
            Err(MarkerGeometryError::InvalidMargin { .. })
        ));
        assert!(matches!(
            MarkerGeometry::new(0.1, o, -0.01),
            Err(MarkerGeometryError::InvalidMargin { .. })
        ));
        assert_eq!(
            MarkerGeometry::new(0.1, Point3::new(f64::NAN, 0.0, 0.0), 0.02),
            Err(MarkerGeometryError::NonFiniteCenter)
        );
    }
}
