//! Perspective-n-Point for planar targets.
//!
//! The solver works in two stages:
//! 1. object points are expressed in an in-plane 2D basis and a
//!    plane -> normalized-image homography is decomposed into an initial pose
//!    (rotation projected onto SO(3), positive depth);
//! 2. the pose is refined with damped Gauss-Newton on pixel reprojection
//!    error, using a left-multiplicative rotation update.
//!
//! Inputs that would make either stage ill-posed are rejected up front.

use crate::camera::CameraIntrinsics;
use crate::homography::estimate_homography;
use nalgebra::{
    Isometry3, Matrix2, Matrix2x3, Matrix2x6, Matrix3, Matrix6, Point2, Point3, Rotation3,
    SymmetricEigen, Translation3, UnitQuaternion, Vector2, Vector3, Vector6,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Minimum number of 2D-3D correspondences accepted by the solver.
pub const MIN_CORRESPONDENCES: usize = 4;

/// Relative spread below which a point set is treated as lower-dimensional.
const DEGENERACY_RATIO: f64 = 1e-6;

/// Rejected or failed PnP solve.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PnpError {
    #[error("mismatched correspondences: {object} object points vs {image} image points")]
    MismatchedCorrespondences { object: usize, image: usize },
    #[error("PnP requires at least {required} correspondences, got {got}")]
    TooFewCorrespondences { required: usize, got: usize },
    #[error("non-finite input coordinate")]
    NonFiniteInput,
    #[error("object points are collinear")]
    CollinearObjectPoints,
    #[error("image points are collinear")]
    CollinearImagePoints,
    #[error("object points are not coplanar (relative out-of-plane spread {spread:.3e})")]
    NonPlanarObject { spread: f64 },
    #[error("homography estimation failed")]
    HomographyFailed,
    #[error("degenerate homography for pose extraction")]
    DegenerateHomography,
    #[error("solved pose places object points behind the camera")]
    BehindCamera,
}

/// Refinement settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PnpParams {
    /// Maximum Gauss-Newton iterations after the homography initialization.
    pub max_iterations: usize,
    /// Stop once the parameter update norm falls below this value.
    pub step_tolerance: f64,
}

impl Default for PnpParams {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            step_tolerance: 1e-12,
        }
    }
}

/// Pose of the object frame expressed in the camera frame:
/// `p_cam = rotation * p_obj + translation`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PnpSolution {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
    /// RMS pixel reprojection error of the refined pose.
    pub reprojection_rmse: f64,
    pub iterations: usize,
}

impl PnpSolution {
    /// Axis-angle (Rodrigues) form of the rotation.
    pub fn rvec(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }

    #[inline]
    pub fn transform(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation * p + self.translation
    }

    /// Camera center in the object frame, `-R^T t`.
    pub fn camera_position(&self) -> Point3<f64> {
        Point3::from(-(self.rotation.inverse() * self.translation))
    }

    /// Camera-from-object isometry.
    pub fn isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.translation),
            UnitQuaternion::from_rotation_matrix(&self.rotation),
        )
    }
}

/// Solve for the pose of a planar object given its image projections.
///
/// `object` and `image` are paired by index. Image points are raw pixels; the
/// camera is assumed distortion free.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(n = object.len()))
)]
pub fn solve_planar_pnp(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    intrinsics: &CameraIntrinsics,
    params: &PnpParams,
) -> Result<PnpSolution, PnpError> {
    validate_correspondences(object, image)?;

    let frame = PlaneFrame::fit(object)?;
    let plane_pts: Vec<Point2<f64>> = object.iter().map(|p| frame.to_plane(p)).collect();
    if has_collinear_triple(&plane_pts) {
        return Err(PnpError::CollinearObjectPoints);
    }
    if is_collinear_2d(image) || has_collinear_triple(image) {
        return Err(PnpError::CollinearImagePoints);
    }

    let norm_pts: Vec<Point2<f64>> = image
        .iter()
        .map(|px| intrinsics.pixel_to_normalized(px))
        .collect();

    let h = estimate_homography(&plane_pts, &norm_pts).ok_or(PnpError::HomographyFailed)?;
    let (r_plane, t_plane) = pose_from_normalized_homography(&h.h)?;

    // p_cam = R_plane * B^T (p - c) + t
    let rotation = Rotation3::from_matrix_unchecked(r_plane * frame.basis.transpose());
    let translation = t_plane - rotation * frame.origin.coords;

    let (rotation, translation, iterations) =
        refine_pose(object, image, intrinsics, rotation, translation, params);

    if object
        .iter()
        .any(|p| (rotation * p + translation).z <= f64::EPSILON)
    {
        return Err(PnpError::BehindCamera);
    }

    let reprojection_rmse = reprojection_cost(object, image, intrinsics, &rotation, &translation)
        .map(|c| (c / object.len() as f64).sqrt())
        .ok_or(PnpError::BehindCamera)?;

    log::debug!(
        "planar pnp: {} points, {} iterations, rmse {:.3e} px",
        object.len(),
        iterations,
        reprojection_rmse
    );

    Ok(PnpSolution {
        rotation,
        translation,
        reprojection_rmse,
        iterations,
    })
}

fn validate_correspondences(object: &[Point3<f64>], image: &[Point2<f64>]) -> Result<(), PnpError> {
    if object.len() != image.len() {
        return Err(PnpError::MismatchedCorrespondences {
            object: object.len(),
            image: image.len(),
        });
    }
    if object.len() < MIN_CORRESPONDENCES {
        return Err(PnpError::TooFewCorrespondences {
            required: MIN_CORRESPONDENCES,
            got: object.len(),
        });
    }
    let finite = object.iter().all(|p| p.coords.iter().all(|v| v.is_finite()))
        && image.iter().all(|p| p.coords.iter().all(|v| v.is_finite()));
    if !finite {
        return Err(PnpError::NonFiniteInput);
    }
    Ok(())
}

/// Orthonormal frame of the object plane: `p = origin + basis * (a, b, 0)`.
struct PlaneFrame {
    origin: Point3<f64>,
    basis: Matrix3<f64>,
}

impl PlaneFrame {
    fn fit(points: &[Point3<f64>]) -> Result<Self, PnpError> {
        let n = points.len() as f64;
        let centroid = points.iter().fold(Vector3::<f64>::zeros(), |acc, p| acc + p.coords) / n;

        let cov = points.iter().fold(Matrix3::<f64>::zeros(), |acc, p| {
            let d = p.coords - centroid;
            acc + d * d.transpose()
        });

        let eig = SymmetricEigen::new(cov);
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));
        let spread = |i: usize| eig.eigenvalues[order[i]].max(0.0).sqrt();

        let major = spread(0);
        if major <= f64::EPSILON || spread(1) / major < DEGENERACY_RATIO {
            return Err(PnpError::CollinearObjectPoints);
        }
        let out_of_plane = spread(2) / major;
        if out_of_plane > DEGENERACY_RATIO {
            return Err(PnpError::NonPlanarObject {
                spread: out_of_plane,
            });
        }

        let e1: Vector3<f64> = eig.eigenvectors.column(order[0]).normalize();
        let e2: Vector3<f64> = eig.eigenvectors.column(order[1]).normalize();
        let e3 = e1.cross(&e2);

        Ok(Self {
            origin: Point3::from(centroid),
            basis: Matrix3::from_columns(&[e1, e2, e3]),
        })
    }

    fn to_plane(&self, p: &Point3<f64>) -> Point2<f64> {
        let local = self.basis.transpose() * (p - self.origin);
        Point2::new(local.x, local.y)
    }
}

fn is_collinear_2d(points: &[Point2<f64>]) -> bool {
    let n = points.len() as f64;
    let centroid = points.iter().fold(Vector2::<f64>::zeros(), |acc, p| acc + p.coords) / n;
    let cov = points.iter().fold(Matrix2::<f64>::zeros(), |acc, p| {
        let d = p.coords - centroid;
        acc + d * d.transpose()
    });
    let eig = cov.symmetric_eigenvalues();
    let (lo, hi) = if eig[0] < eig[1] {
        (eig[0], eig[1])
    } else {
        (eig[1], eig[0])
    };
    hi <= f64::EPSILON || (lo.max(0.0) / hi).sqrt() < DEGENERACY_RATIO
}

/// For a minimal set, any three collinear points leave the homography
/// underdetermined. Triangle areas are compared against the set's spread.
fn has_collinear_triple(points: &[Point2<f64>]) -> bool {
    if points.len() != MIN_CORRESPONDENCES {
        return false;
    }
    let n = points.len() as f64;
    let centroid = points.iter().fold(Vector2::<f64>::zeros(), |acc, p| acc + p.coords) / n;
    let spread_sq = points
        .iter()
        .map(|p| (p.coords - centroid).norm_squared())
        .sum::<f64>()
        / n;
    if spread_sq <= f64::EPSILON {
        return true;
    }

    (0..4).any(|skip| {
        let [a, b, c]: [Point2<f64>; 3] = match skip {
            0 => [points[1], points[2], points[3]],
            1 => [points[0], points[2], points[3]],
            2 => [points[0], points[1], points[3]],
            _ => [points[0], points[1], points[2]],
        };
        let (u, v) = (b - a, c - a);
        let twice_area = (u.x * v.y - u.y * v.x).abs();
        twice_area / spread_sq < DEGENERACY_RATIO
    })
}

/// Decompose `H ~ [r1 r2 t]` (plane with `z = 0`, identity intrinsics).
fn pose_from_normalized_homography(h: &Matrix3<f64>) -> Result<(Matrix3<f64>, Vector3<f64>), PnpError> {
    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let norm1 = h1.norm();
    let norm2 = h2.norm();
    if norm1 <= 1e-12 || norm2 <= 1e-12 {
        return Err(PnpError::DegenerateHomography);
    }
    let lambda = 2.0 / (norm1 + norm2);

    let mut r1 = h1 * lambda;
    let mut r2 = h2 * lambda;
    let mut t = h3 * lambda;
    if t.z < 0.0 {
        r1 = -r1;
        r2 = -r2;
        t = -t;
    }
    let r3 = r1.cross(&r2);
    if r3.norm() <= 1e-12 {
        return Err(PnpError::DegenerateHomography);
    }

    // Polar projection onto SO(3).
    let svd = Matrix3::from_columns(&[r1, r2, r3]).svd(true, true);
    let (u, v_t) = svd
        .u
        .zip(svd.v_t)
        .ok_or(PnpError::DegenerateHomography)?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r = u_flipped * v_t;
    }

    Ok((r, t))
}

/// Sum of squared pixel residuals, `None` if any point is behind the camera.
fn reprojection_cost(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    k: &CameraIntrinsics,
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
) -> Option<f64> {
    object.iter().zip(image).try_fold(0.0, |acc, (p, obs)| {
        let proj = k.project(&(rotation * p + translation))?;
        Some(acc + (proj - obs).norm_squared())
    })
}

fn refine_pose(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    k: &CameraIntrinsics,
    mut rotation: Rotation3<f64>,
    mut translation: Vector3<f64>,
    params: &PnpParams,
) -> (Rotation3<f64>, Vector3<f64>, usize) {
    let Some(mut cost) = reprojection_cost(object, image, k, &rotation, &translation) else {
        return (rotation, translation, 0);
    };
    let mut damping = 1e-3;
    let mut iterations = 0;

    while iterations < params.max_iterations && cost > 0.0 {
        iterations += 1;

        let mut jtj = Matrix6::<f64>::zeros();
        let mut jtr = Vector6::<f64>::zeros();
        for (p, obs) in object.iter().zip(image) {
            let rp = rotation * p.coords;
            let pc = rp + translation;
            let inv_z = 1.0 / pc.z;
            let residual = Vector2::new(
                k.fx * pc.x * inv_z + k.cx - obs.x,
                k.fy * pc.y * inv_z + k.cy - obs.y,
            );
            let j_proj = Matrix2x3::new(
                k.fx * inv_z, 0.0, -k.fx * pc.x * inv_z * inv_z, //
                0.0, k.fy * inv_z, -k.fy * pc.y * inv_z * inv_z,
            );
            let mut j = Matrix2x6::<f64>::zeros();
            j.fixed_view_mut::<2, 3>(0, 0)
                .copy_from(&(j_proj * -rp.cross_matrix()));
            j.fixed_view_mut::<2, 3>(0, 3).copy_from(&j_proj);

            jtj += j.transpose() * j;
            jtr += j.transpose() * residual;
        }

        let mut damped = jtj;
        for i in 0..6 {
            damped[(i, i)] += damping * jtj[(i, i)].max(1e-12);
        }
        let Some(chol) = damped.cholesky() else {
            break;
        };
        let delta = chol.solve(&(-jtr));

        let cand_rot =
            Rotation3::new(delta.fixed_rows::<3>(0).into_owned()) * rotation;
        let cand_t = translation + delta.fixed_rows::<3>(3);

        match reprojection_cost(object, image, k, &cand_rot, &cand_t) {
            Some(c) if c <= cost => {
                rotation = cand_rot;
                translation = cand_t;
                cost = c;
                damping = (damping * 0.1).max(1e-12);
                if delta.norm() < params.step_tolerance {
                    break;
                }
            }
            _ => {
                damping *= 10.0;
                if damping > 1e12 {
                    break;
                }
            }
        }
    }

    (rotation, translation, iterations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraParams;
    use approx::assert_relative_eq;

    fn camera() -> CameraIntrinsics {
        CameraParams::default().intrinsics().unwrap()
    }

    fn square(side: f64) -> Vec<Point3<f64>> {
        let h = side / 2.0;
        vec![
            Point3::new(-h, h, 0.0),
            Point3::new(h, h, 0.0),
            Point3::new(h, -h, 0.0),
            Point3::new(-h, -h, 0.0),
        ]
    }

    fn project_all(
        k: &CameraIntrinsics,
        rot: &Rotation3<f64>,
        t: &Vector3<f64>,
        pts: &[Point3<f64>],
    ) -> Vec<Point2<f64>> {
        pts.iter()
            .map(|p| k.project(&(rot * p + t)).expect("in front"))
            .collect()
    }

    #[test]
    fn recovers_pose_of_tilted_square() {
        let k = camera();
        let rot = Rotation3::from_euler_angles(0.3, -0.2, 0.4);
        let t = Vector3::new(0.05, -0.02, 0.6);
        let obj = square(0.08);
        let img = project_all(&k, &rot, &t, &obj);

        let sol = solve_planar_pnp(&obj, &img, &k, &PnpParams::default()).expect("solve");
        assert_relative_eq!(sol.translation, t, epsilon = 1e-7);
        assert_relative_eq!(*sol.rotation.matrix(), *rot.matrix(), epsilon = 1e-7);
        assert!(sol.reprojection_rmse < 1e-6);
    }

    #[test]
    fn recovers_pose_of_plane_not_through_origin() {
        let k = camera();
        // Square on the plane x = 0.3, like a marker on a cube face.
        let obj: Vec<Point3<f64>> = square(0.1)
            .into_iter()
            .map(|p| Point3::new(0.3, p.x + 0.1, p.y - 0.2))
            .collect();
        let rot = Rotation3::from_euler_angles(0.1, 1.2, -0.1);
        let t = Vector3::new(-0.1, 0.05, 1.0);
        let img = project_all(&k, &rot, &t, &obj);

        let sol = solve_planar_pnp(&obj, &img, &k, &PnpParams::default()).expect("solve");
        for (p, q) in obj.iter().zip(&img) {
            let back = k.project(&sol.transform(p)).unwrap();
            assert!((back - q).norm() < 1e-6);
        }
        assert_relative_eq!(sol.translation, t, epsilon = 1e-6);

        let cam = sol.camera_position();
        let expected = Point3::from(-(rot.inverse() * t));
        assert_relative_eq!(cam, expected, epsilon = 1e-6);
    }

    #[test]
    fn refinement_reduces_noisy_residuals() {
        let k = camera();
        let rot = Rotation3::from_euler_angles(-0.2, 0.1, 0.05);
        let t = Vector3::new(0.0, 0.0, 0.8);
        let obj: Vec<Point3<f64>> = (0..3)
            .flat_map(|y| (0..3).map(move |x| Point3::new(x as f64 * 0.05, y as f64 * 0.05, 0.0)))
            .collect();
        let mut img = project_all(&k, &rot, &t, &obj);
        for (i, p) in img.iter_mut().enumerate() {
            let s = if i % 2 == 0 { 0.3 } else { -0.3 };
            p.x += s;
            p.y -= s;
        }

        let sol = solve_planar_pnp(&obj, &img, &k, &PnpParams::default()).expect("solve");
        assert!(sol.reprojection_rmse < 0.5, "rmse {}", sol.reprojection_rmse);
        assert!((sol.translation - t).norm() < 2e-2);
    }

    #[test]
    fn rvec_matches_rotation() {
        let k = camera();
        let rot = Rotation3::from_euler_angles(0.0, 0.0, 0.5);
        let t = Vector3::new(0.0, 0.0, 0.5);
        let obj = square(0.1);
        let img = project_all(&k, &rot, &t, &obj);
        let sol = solve_planar_pnp(&obj, &img, &k, &PnpParams::default()).unwrap();
        assert_relative_eq!(sol.rvec(), Vector3::new(0.0, 0.0, 0.5), epsilon = 1e-7);
    }

    #[test]
    fn rejects_mismatched_and_short_input() {
        let k = camera();
        let obj = square(0.1);
        let img = vec![Point2::new(1.0, 2.0); 3];
        assert_eq!(
            solve_planar_pnp(&obj, &img, &k, &PnpParams::default()),
            Err(PnpError::MismatchedCorrespondences {
                object: 4,
                image: 3
            })
        );
        assert_eq!(
            solve_planar_pnp(&obj[..3], &img, &k, &PnpParams::default()),
            Err(PnpError::TooFewCorrespondences {
                required: 4,
                got: 3
            })
        );
    }

    #[test]
    fn rejects_degenerate_geometry() {
        let k = camera();
        let img = vec![
            Point2::new(100.0, 100.0),
            Point2::new(200.0, 100.0),
            Point2::new(200.0, 200.0),
            Point2::new(100.0, 200.0),
        ];

        let collinear: Vec<Point3<f64>> =
            (0..4).map(|i| Point3::new(i as f64 * 0.1, 0.0, 0.0)).collect();
        assert_eq!(
            solve_planar_pnp(&collinear, &img, &k, &PnpParams::default()),
            Err(PnpError::CollinearObjectPoints)
        );

        let tetra = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.1, 0.0, 0.0),
            Point3::new(0.0, 0.1, 0.0),
            Point3::new(0.0, 0.0, 0.1),
        ];
        assert!(matches!(
            solve_planar_pnp(&tetra, &img, &k, &PnpParams::default()),
            Err(PnpError::NonPlanarObject { .. })
        ));

        let line_img: Vec<Point2<f64>> =
            (0..4).map(|i| Point2::new(100.0 + i as f64 * 10.0, 50.0 + i as f64 * 5.0)).collect();
        assert_eq!(
            solve_planar_pnp(&square(0.1), &line_img, &k, &PnpParams::default()),
            Err(PnpError::CollinearImagePoints)
        );

        // Three of four corners on one line.
        let bent_img = vec![
            Point2::new(100.0, 100.0),
            Point2::new(200.0, 100.0),
            Point2::new(300.0, 100.0),
            Point2::new(200.0, 200.0),
        ];
        assert_eq!(
            solve_planar_pnp(&square(0.08), &bent_img, &k, &PnpParams::default()),
            Err(PnpError::CollinearImagePoints)
        );

        let bent_obj = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.05, 0.0, 0.0),
            Point3::new(0.1, 0.0, 0.0),
            Point3::new(0.05, 0.1, 0.0),
        ];
        assert_eq!(
            solve_planar_pnp(&bent_obj, &img, &k, &PnpParams::default()),
            Err(PnpError::CollinearObjectPoints)
        );

        let mut nan_img = img.clone();
        nan_img[2].x = f64::NAN;
        assert_eq!(
            solve_planar_pnp(&square(0.1), &nan_img, &k, &PnpParams::default()),
            Err(PnpError::NonFiniteInput)
        );
    }
}
