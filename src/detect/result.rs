use serde::{Deserialize, Serialize};

use super::geometry::BoundingBox;

/// One object reported by the upstream detector for a frame.
///
/// Confidence thresholding happens upstream; anything that reaches the
/// kernel is treated as a real detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectDetection {
    /// Detector class label (e.g. "cell phone").
    pub label: String,
    pub bbox: BoundingBox,
}

impl ObjectDetection {
    pub fn new(label: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            bbox,
        }
    }
}

/// All detections for one processed frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionFrame {
    /// 1-based frame number, shared with the pose stream.
    pub frame_id: u64,
    /// Frame position in the video, milliseconds.
    pub timestamp_ms: f64,
    #[serde(default)]
    pub objects: Vec<ObjectDetection>,
}

impl DetectionFrame {
    pub fn new(frame_id: u64, timestamp_ms: f64, objects: Vec<ObjectDetection>) -> Self {
        Self {
            frame_id,
            timestamp_ms,
            objects,
        }
    }

    pub fn empty(frame_id: u64, timestamp_ms: f64) -> Self {
        Self::new(frame_id, timestamp_ms, Vec::new())
    }
}
