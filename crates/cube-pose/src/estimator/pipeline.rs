use super::{
    validate_position, CubeEstimate, EstimateError, EstimatorParams, FrameReport,
    ValidationError, ValidationOutcome, ValidationStatus,
};
use crate::capture::{save_capture, to_gray, CaptureTarget};
use crate::detection::{select_detection, MarkerDetection, MarkerDetector};
use crate::scene::SceneContext;
use cube_pose_core::{
    solve_planar_pnp, CameraIntrinsics, CameraPose, MarkerGeometry, PnpError, PoseEstimate,
};
use image::RgbImage;
use nalgebra::Point3;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Estimates a cube's world position from a single marker on its `+X` face.
///
/// Intrinsics and marker geometry are derived once at construction; the
/// estimator itself is immutable apart from the camera pose.
#[derive(Clone, Debug)]
pub struct CubePoseEstimator {
    params: EstimatorParams,
    intrinsics: CameraIntrinsics,
    geometry: MarkerGeometry,
    camera: CameraPose,
}

impl CubePoseEstimator {
    /// Create an estimator for a camera with a known world pose.
    pub fn new(params: EstimatorParams, camera: CameraPose) -> Result<Self, EstimateError> {
        params.check()?;
        let intrinsics = params.camera.intrinsics()?;
        let geometry = params.marker.build()?;
        log::debug!(
            "camera fx={:.3} cx={:.1} cy={:.1}, marker size {}",
            intrinsics.fx,
            intrinsics.cx,
            intrinsics.cy,
            geometry.marker_size()
        );

        Ok(Self {
            params,
            intrinsics,
            geometry,
            camera,
        })
    }

    /// Create an estimator for a named simulation camera.
    pub fn from_scene<S: SceneContext + ?Sized>(
        params: EstimatorParams,
        scene: &S,
        camera_name: &str,
    ) -> Result<Self, EstimateError> {
        let pose = scene
            .camera_pose(camera_name)
            .ok_or_else(|| EstimateError::UnknownCamera {
                name: camera_name.to_owned(),
            })?;
        Self::new(params, pose.to_camera_pose())
    }

    #[inline]
    pub fn params(&self) -> &EstimatorParams {
        &self.params
    }

    #[inline]
    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    #[inline]
    pub fn geometry(&self) -> &MarkerGeometry {
        &self.geometry
    }

    #[inline]
    pub fn camera_pose(&self) -> &CameraPose {
        &self.camera
    }

    /// Update the camera pose, e.g. for a moving camera.
    pub fn set_camera_pose(&mut self, camera: CameraPose) {
        self.camera = camera;
    }

    /// Detect the marker in `image` and estimate the cube position.
    ///
    /// Finding no marker is a normal outcome and yields `detected == false`.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
    pub fn estimate<D: MarkerDetector + ?Sized>(
        &self,
        image: &RgbImage,
        detector: &D,
    ) -> Result<CubeEstimate, EstimateError> {
        let (width, height) = image.dimensions();
        if width != self.intrinsics.width || height != self.intrinsics.height {
            return Err(EstimateError::ImageSizeMismatch {
                width: self.intrinsics.width,
                height: self.intrinsics.height,
                got_width: width,
                got_height: height,
            });
        }

        let gray = to_gray(image);
        let detections = detector.detect_markers(&gray, self.params.dictionary)?;
        self.estimate_from_detections(&detections)
    }

    /// Estimate from detections produced elsewhere.
    pub fn estimate_from_detections(
        &self,
        detections: &[MarkerDetection],
    ) -> Result<CubeEstimate, EstimateError> {
        log::debug!("{} marker(s) detected", detections.len());

        let Some(selected) = select_detection(
            detections,
            self.params.expected_marker_id,
            self.params.selection,
        ) else {
            log::info!("no marker detected");
            return Ok(CubeEstimate::not_detected(detections.to_vec()));
        };
        log::debug!("solving pose from marker {}", selected.id);

        let pose = self.solve(selected)?;
        let p = pose.cube_center_world;
        log::debug!(
            "marker {} -> cube center [{:.4}, {:.4}, {:.4}]",
            selected.id,
            p.x,
            p.y,
            p.z
        );

        Ok(CubeEstimate {
            detected: true,
            detections: detections.to_vec(),
            marker_id: Some(selected.id),
            pose: Some(pose),
        })
    }

    /// Solve the pose for a single detection and place the cube in the world.
    pub fn solve(&self, detection: &MarkerDetection) -> Result<PoseEstimate, PnpError> {
        let solution = solve_planar_pnp(
            self.geometry.corners(),
            &detection.corners,
            &self.intrinsics,
            &self.params.pnp,
        )?;
        log::debug!(
            "pnp converged in {} iterations, rmse {:.3e} px",
            solution.iterations,
            solution.reprojection_rmse
        );
        Ok(PoseEstimate::compose(&solution, &self.camera, &self.geometry))
    }

    /// Validate an estimate against ground truth with the configured tolerance.
    ///
    /// Non-detections are skipped rather than failed.
    pub fn validate(
        &self,
        estimate: &CubeEstimate,
        ground_truth: &Point3<f64>,
    ) -> Result<ValidationOutcome, ValidationError> {
        let Some(position) = estimate.cube_position() else {
            return Ok(ValidationOutcome::Skipped);
        };
        match validate_position(&position, ground_truth, self.params.tolerance) {
            Ok(distance) => {
                log::debug!("estimate within {distance:.4} of ground truth");
                Ok(ValidationOutcome::Passed { distance })
            }
            Err(err) => {
                log::warn!("validation failed: {err}");
                Err(err)
            }
        }
    }

    /// Full per-frame routine: estimation, optional capture, report and
    /// validation against the named body's ground truth.
    ///
    /// Frames rejected by [`CubePoseEstimator::estimate`] are not captured.
    ///
    /// A failed validation is recorded in the report; use
    /// [`FrameReport::check`] to turn it into an error.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, image, detector, scene, capture))
    )]
    pub fn process_frame<D, S>(
        &self,
        image: &RgbImage,
        detector: &D,
        scene: &S,
        body_name: &str,
        capture: Option<&CaptureTarget>,
    ) -> Result<FrameReport, EstimateError>
    where
        D: MarkerDetector + ?Sized,
        S: SceneContext + ?Sized,
    {
        let ground_truth =
            scene
                .body_position(body_name)
                .ok_or_else(|| EstimateError::UnknownBody {
                    name: body_name.to_owned(),
                })?;

        let estimate = self.estimate(image, detector)?;
        let capture_path = capture
            .map(|target| save_capture(image, &target.dir, &target.file_name))
            .transpose()?;
        if let Some(p) = estimate.cube_position() {
            log::info!(
                "detected: true, estimated position: [{:.4}, {:.4}, {:.4}]",
                p.x,
                p.y,
                p.z
            );
        }

        let validation = ValidationStatus::from(self.validate(&estimate, &ground_truth));
        Ok(FrameReport::new(
            &estimate,
            ground_truth,
            validation,
            capture_path,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{FixedDetections, MarkerSelection};
    use crate::scene::StaticScene;
    use nalgebra::{Point2, Vector3};

    fn reference_estimator() -> CubePoseEstimator {
        let params = EstimatorParams::default();
        let geometry = params.marker.build().unwrap();
        let camera =
            CameraPose::look_at(Point3::new(1.0, -0.3, 0.3), geometry.face_center(), Vector3::z())
                .unwrap();
        CubePoseEstimator::new(params, camera).unwrap()
    }

    fn project(est: &CubePoseEstimator, id: u32) -> MarkerDetection {
        let corners = est.geometry().corners().map(|p| {
            est.intrinsics()
                .project(&est.camera_pose().world_to_camera(&p))
                .unwrap()
        });
        MarkerDetection::new(id, corners)
    }

    #[test]
    fn empty_detections_are_not_an_error() {
        let est = reference_estimator();
        let out = est.estimate_from_detections(&[]).unwrap();
        assert!(!out.detected);
        assert_eq!(out.cube_position(), None);
        assert_eq!(
            est.validate(&out, &Point3::new(9.0, 9.0, 9.0)),
            Ok(ValidationOutcome::Skipped)
        );
    }

    #[test]
    fn expected_id_filters_detections() {
        let params = EstimatorParams {
            expected_marker_id: Some(4),
            selection: MarkerSelection::First,
            ..EstimatorParams::default()
        };
        let base = reference_estimator();
        let est = CubePoseEstimator::new(params, *base.camera_pose()).unwrap();

        let out = est.estimate_from_detections(&[project(&est, 1)]).unwrap();
        assert!(!out.detected);
        assert_eq!(out.detections.len(), 1);

        let out = est
            .estimate_from_detections(&[project(&est, 1), project(&est, 4)])
            .unwrap();
        assert_eq!(out.marker_id, Some(4));
    }

    #[test]
    fn detected_marker_recovers_cube_center() {
        let est = reference_estimator();
        let out = est.estimate_from_detections(&[project(&est, 0)]).unwrap();
        assert!(out.detected);
        let truth = est.geometry().cube_center();
        match est.validate(&out, &truth) {
            Ok(ValidationOutcome::Passed { distance }) => assert!(distance < 1e-6),
            other => panic!("unexpected validation result {other:?}"),
        }
        assert!(est.validate(&out, &(truth + Vector3::new(0.0, 0.0, 0.06))).is_err());
    }

    #[test]
    fn degenerate_detection_is_rejected() {
        let est = reference_estimator();
        let line = MarkerDetection::new(
            0,
            [
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 1.0),
                Point2::new(2.0, 2.0),
                Point2::new(3.0, 3.0),
            ],
        );
        assert!(matches!(
            est.estimate_from_detections(&[line]),
            Err(EstimateError::Pnp(PnpError::CollinearImagePoints))
        ));
    }

    #[test]
    fn wrong_image_size_is_a_configuration_error() {
        let est = reference_estimator();
        let err = est
            .estimate(&RgbImage::new(320, 240), &FixedDetections::default())
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn unknown_names_are_reported() {
        let scene = StaticScene::default();
        let err =
            CubePoseEstimator::from_scene(EstimatorParams::default(), &scene, "cam").unwrap_err();
        assert!(matches!(err, EstimateError::UnknownCamera { ref name } if name == "cam"));

        let est = reference_estimator();
        let err = est
            .process_frame(
                &RgbImage::new(640, 480),
                &FixedDetections::default(),
                &scene,
                "cube",
                None,
            )
            .unwrap_err();
        assert!(matches!(err, EstimateError::UnknownBody { .. }));
    }
}
