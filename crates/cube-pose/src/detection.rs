//! Marker detections and the detector seam.
//!
//! Finding markers in an image is delegated to an external detector; this
//! module only fixes the data it hands back and how one detection is picked
//! when several are visible.

use image::GrayImage;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Predefined marker dictionaries understood by common ArUco detectors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerDictionary {
    #[serde(rename = "DICT_4X4_50")]
    Dict4x4_50,
    #[serde(rename = "DICT_4X4_1000")]
    Dict4x4_1000,
    #[serde(rename = "DICT_5X5_250")]
    Dict5x5_250,
    #[default]
    #[serde(rename = "DICT_6X6_250")]
    Dict6x6_250,
    #[serde(rename = "DICT_7X7_1000")]
    Dict7x7_1000,
    #[serde(rename = "DICT_APRILTAG_36h11")]
    AprilTag36h11,
}

impl MarkerDictionary {
    pub fn name(self) -> &'static str {
        match self {
            Self::Dict4x4_50 => "DICT_4X4_50",
            Self::Dict4x4_1000 => "DICT_4X4_1000",
            Self::Dict5x5_250 => "DICT_5X5_250",
            Self::Dict6x6_250 => "DICT_6X6_250",
            Self::Dict7x7_1000 => "DICT_7X7_1000",
            Self::AprilTag36h11 => "DICT_APRILTAG_36h11",
        }
    }

    /// Number of ids in the dictionary.
    pub fn marker_count(self) -> u32 {
        match self {
            Self::Dict4x4_50 => 50,
            Self::Dict4x4_1000 | Self::Dict7x7_1000 => 1000,
            Self::Dict5x5_250 | Self::Dict6x6_250 => 250,
            Self::AprilTag36h11 => 587,
        }
    }

    pub fn contains(self, id: u32) -> bool {
        id < self.marker_count()
    }
}

impl std::fmt::Display for MarkerDictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One decoded marker: its id and four image corners, in detector order.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerDetection {
    pub id: u32,
    pub corners: [Point2<f64>; 4],
}

impl MarkerDetection {
    pub fn new(id: u32, corners: [Point2<f64>; 4]) -> Self {
        Self { id, corners }
    }

    /// Enclosed image area in square pixels (shoelace formula).
    pub fn area(&self) -> f64 {
        let c = &self.corners;
        let twice: f64 = (0..4)
            .map(|i| {
                let (a, b) = (c[i], c[(i + 1) % 4]);
                a.x * b.y - b.x * a.y
            })
            .sum();
        twice.abs() * 0.5
    }
}

/// Detector failure (as opposed to "nothing found", which is an empty list).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("marker detector failed: {message}")]
pub struct DetectorError {
    pub message: String,
}

impl DetectorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// External marker detector.
///
/// Returning an empty list is the normal "no marker visible" outcome.
pub trait MarkerDetector {
    fn detect_markers(
        &self,
        image: &GrayImage,
        dictionary: MarkerDictionary,
    ) -> Result<Vec<MarkerDetection>, DetectorError>;
}

impl<F> MarkerDetector for F
where
    F: Fn(&GrayImage, MarkerDictionary) -> Result<Vec<MarkerDetection>, DetectorError>,
{
    fn detect_markers(
        &self,
        image: &GrayImage,
        dictionary: MarkerDictionary,
    ) -> Result<Vec<MarkerDetection>, DetectorError> {
        self(image, dictionary)
    }
}

/// Replays a fixed set of detections regardless of the image.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FixedDetections(pub Vec<MarkerDetection>);

impl MarkerDetector for FixedDetections {
    fn detect_markers(
        &self,
        _image: &GrayImage,
        _dictionary: MarkerDictionary,
    ) -> Result<Vec<MarkerDetection>, DetectorError> {
        Ok(self.0.clone())
    }
}

/// How to pick one detection when several markers are visible.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerSelection {
    /// The marker covering the most pixels (closest / least oblique).
    #[default]
    LargestArea,
    LowestId,
    /// Whatever the detector reported first.
    First,
}

/// Pick the detection to solve for.
///
/// Detections whose id differs from `expected_id` (when given) are ignored.
/// Ties are broken by the lower id, then by detector order.
pub fn select_detection(
    detections: &[MarkerDetection],
    expected_id: Option<u32>,
    policy: MarkerSelection,
) -> Option<&MarkerDetection> {
    let mut candidates = detections
        .iter()
        .filter(|d| expected_id.is_none_or(|id| d.id == id));

    match policy {
        MarkerSelection::First => candidates.next(),
        MarkerSelection::LowestId => candidates.min_by_key(|d| d.id),
        MarkerSelection::LargestArea => candidates.reduce(|best, d| {
            let (a, b) = (d.area(), best.area());
            if a > b || (a == b && d.id < best.id) {
                d
            } else {
                best
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(id: u32, x: f64, y: f64, side: f64) -> MarkerDetection {
        MarkerDetection::new(
            id,
            [
                Point2::new(x, y),
                Point2::new(x + side, y),
                Point2::new(x + side, y + side),
                Point2::new(x, y + side),
            ],
        )
    }

    #[test]
    fn area_is_orientation_independent() {
        let d = square(1, 10.0, 20.0, 5.0);
        assert_eq!(d.area(), 25.0);
        let mut rev = d;
        rev.corners.reverse();
        assert_eq!(rev.area(), 25.0);
    }

    #[test]
    fn selection_policies() {
        let dets = [
            square(7, 0.0, 0.0, 10.0),
            square(3, 50.0, 0.0, 20.0),
            square(5, 100.0, 0.0, 20.0),
        ];
        let pick = |id, policy| select_detection(&dets, id, policy).map(|d| d.id);

        assert_eq!(pick(None, MarkerSelection::First), Some(7));
        assert_eq!(pick(None, MarkerSelection::LowestId), Some(3));
        // 3 and 5 tie on area, lower id wins.
        assert_eq!(pick(None, MarkerSelection::LargestArea), Some(3));
        assert_eq!(pick(Some(5), MarkerSelection::LargestArea), Some(5));
        assert_eq!(pick(Some(42), MarkerSelection::First), None);
        assert_eq!(select_detection(&[], None, MarkerSelection::LargestArea), None);
    }

    #[test]
    fn closures_and_fixed_sets_act_as_detectors() {
        let img = GrayImage::new(4, 4);
        let fixed = FixedDetections(vec![square(1, 0.0, 0.0, 1.0)]);
        assert_eq!(
            fixed
                .detect_markers(&img, MarkerDictionary::default())
                .unwrap()
                .len(),
            1
        );

        let failing = |_: &GrayImage, _: MarkerDictionary| -> Result<Vec<MarkerDetection>, DetectorError> {
            Err(DetectorError::new("camera offline"))
        };
        let err = failing
            .detect_markers(&img, MarkerDictionary::Dict4x4_50)
            .unwrap_err();
        assert_eq!(err.to_string(), "marker detector failed: camera offline");
    }

    #[test]
    fn dictionary_names_round_trip_through_serde() {
        let json = serde_json::to_string(&MarkerDictionary::Dict6x6_250).unwrap();
        assert_eq!(json, "\"DICT_6X6_250\"");
        let back: MarkerDictionary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MarkerDictionary::default());
        assert_eq!(back.name(), "DICT_6X6_250");
        assert!(back.contains(1));
        assert!(!back.contains(250));
    }
}
