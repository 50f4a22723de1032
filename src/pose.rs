//! Pose estimator output.
//!
//! Keypoints follow the layout of the upstream estimator; the kernel only
//! ever reads the two wrist slots named by a [`WristPair`].

use serde::{Deserialize, Serialize};

use crate::detect::{BoundingBox, Point};

/// Person identity as delivered to the segmenter.
pub type PersonId = u32;

/// COCO-17 left wrist slot.
pub const COCO_LEFT_WRIST: usize = 9;
/// COCO-17 right wrist slot.
pub const COCO_RIGHT_WRIST: usize = 10;

/// One person in a pose frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersonPose {
    pub person_id: PersonId,
    pub keypoints: Vec<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

impl PersonPose {
    pub fn new(person_id: PersonId, keypoints: Vec<Point>) -> Self {
        Self {
            person_id,
            keypoints,
            bbox: None,
        }
    }

    /// Keypoint at `index` if present and finite.
    pub fn keypoint(&self, index: usize) -> Option<Point> {
        self.keypoints
            .get(index)
            .copied()
            .filter(|point| point.is_finite())
    }

    /// Mean of all finite keypoints.
    pub fn centroid(&self) -> Option<Point> {
        let (sum, count) = self
            .keypoints
            .iter()
            .filter(|point| point.is_finite())
            .fold((Point::default(), 0usize), |(acc, n), point| {
                (Point::new(acc.x + point.x, acc.y + point.y), n + 1)
            });
        if count == 0 {
            return None;
        }
        Some(Point::new(sum.x / count as f64, sum.y / count as f64))
    }
}

/// All people seen in one processed frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    /// Same numbering as `DetectionFrame::frame_id`.
    pub frame_id: u64,
    /// Position of the pose frame in the video, when the estimator reports
    /// it. Overlay lookups fall back to it if frame ids do not line up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<f64>,
    #[serde(default)]
    pub people: Vec<PersonPose>,
}

impl PoseFrame {
    pub fn new(frame_id: u64, people: Vec<PersonPose>) -> Self {
        Self {
            frame_id,
            timestamp_ms: None,
            people,
        }
    }
}

/// Keypoint slots checked for a held object, in check order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WristPair {
    pub first: usize,
    pub second: usize,
}

impl WristPair {
    pub const fn new(first: usize, second: usize) -> Self {
        Self { first, second }
    }

    pub fn indices(&self) -> [usize; 2] {
        [self.first, self.second]
    }
}

impl Default for WristPair {
    fn default() -> Self {
        Self::new(COCO_LEFT_WRIST, COCO_RIGHT_WRIST)
    }
}
