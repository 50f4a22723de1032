//! Spatial correlation of detected objects with wrist keypoints.
//!
//! A detected object of a watched class is "held" by the first person (in
//! pose-frame order) with a wrist strictly closer than `max_wrist_dist` to
//! the object's box center. Each object yields at most one hit per frame.

use std::collections::HashSet;

use crate::detect::{DetectionFrame, Point};
use crate::pose::{PersonPose, PoseFrame, WristPair};
use crate::Hit;

/// Hits produced for one frame plus the detections rejected on the way.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CorrelationOutcome {
    pub hits: Vec<Hit>,
    /// Watched-class detections dropped for malformed geometry.
    pub skipped: usize,
}

#[derive(Clone, Debug)]
pub struct SpatialCorrelator {
    detected_classes: HashSet<String>,
    max_wrist_dist: f64,
    wrists: WristPair,
}

impl SpatialCorrelator {
    pub fn new<I, S>(detected_classes: I, max_wrist_dist: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            detected_classes: detected_classes.into_iter().map(Into::into).collect(),
            max_wrist_dist,
            wrists: WristPair::default(),
        }
    }

    pub fn with_wrists(mut self, wrists: WristPair) -> Self {
        self.wrists = wrists;
        self
    }

    pub fn is_detected_class(&self, label: &str) -> bool {
        self.detected_classes.contains(label)
    }

    /// Correlate one detection frame with its time-aligned pose frame.
    ///
    /// `pose` is `None` when the pose stream has no entry for this frame;
    /// such a frame contributes no hits.
    pub fn correlate(&self, frame: &DetectionFrame, pose: Option<&PoseFrame>) -> CorrelationOutcome {
        let mut outcome = CorrelationOutcome::default();

        for object in &frame.objects {
            if !self.is_detected_class(&object.label) {
                continue;
            }
            if !object.bbox.is_finite() {
                log::warn!(
                    "frame {}: skipping '{}' detection with non-finite box {:?}",
                    frame.frame_id,
                    object.label,
                    object.bbox
                );
                outcome.skipped += 1;
                continue;
            }
            let bbox = if object.bbox.is_inverted() {
                log::debug!(
                    "frame {}: normalizing inverted box for '{}'",
                    frame.frame_id,
                    object.label
                );
                object.bbox.normalized()
            } else {
                object.bbox
            };

            let Some(pose) = pose else {
                continue;
            };
            let center = bbox.center();
            if let Some(person) = pose.people.iter().find(|p| self.holds(p, &center)) {
                outcome.hits.push(Hit {
                    frame_id: frame.frame_id,
                    timestamp_ms: frame.timestamp_ms,
                    person_id: person.person_id,
                });
            }
        }

        if pose.is_none() && !frame.objects.is_empty() {
            log::debug!("frame {}: no pose data, no correlation", frame.frame_id);
        }
        outcome
    }

    /// True when either wrist (checked in order) is within range of `center`.
    fn holds(&self, person: &PersonPose, center: &Point) -> bool {
        self.wrists
            .indices()
            .into_iter()
            .filter_map(|index| person.keypoint(index))
            .any(|wrist| wrist.distance(center) < self.max_wrist_dist)
    }
}
