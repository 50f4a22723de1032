//! Frame alignment between the detection and pose streams.
//!
//! - `PoseIndex`: pose lookup by detection `frame_id`.
//! - `FrameStore`: both streams of one run, with timestamp lookup for
//!   single-frame overlays.

use serde::Serialize;

use crate::detect::{DetectionFrame, ObjectDetection};
use crate::pose::{PersonPose, PoseFrame};

// ----------------------------------------------------------------------------
// PoseIndex
// ----------------------------------------------------------------------------

/// Pose lookup over a slice of pose frames ordered by `frame_id`.
///
/// Frame ids are 1-based while storage is 0-based, so frame `n` is expected
/// in slot `n - 1`. When the slot disagrees (dropped or duplicated frames
/// upstream) the lookup falls back to an exact `frame_id` search, so a pose
/// frame is never paired with the wrong detection frame.
#[derive(Clone, Copy, Debug)]
pub struct PoseIndex<'a> {
    frames: &'a [PoseFrame],
}

impl<'a> PoseIndex<'a> {
    pub fn new(frames: &'a [PoseFrame]) -> Self {
        Self { frames }
    }

    pub fn get(&self, frame_id: u64) -> Option<&'a PoseFrame> {
        if let Some(slot) = frame_id.checked_sub(1) {
            if let Some(frame) = usize::try_from(slot).ok().and_then(|s| self.frames.get(s)) {
                if frame.frame_id == frame_id {
                    return Some(frame);
                }
            }
        }
        let pos = self.frames.partition_point(|f| f.frame_id < frame_id);
        self.frames.get(pos).filter(|f| f.frame_id == frame_id)
    }
}

// ----------------------------------------------------------------------------
// FrameStore
// ----------------------------------------------------------------------------

/// Detections and poses for one analyzed frame, as handed to renderers.
#[derive(Clone, Debug, Serialize)]
pub struct FrameOverlay<'a> {
    pub frame_id: u64,
    pub timestamp_ms: f64,
    pub objects: &'a [ObjectDetection],
    pub people: &'a [PersonPose],
}

/// Both input streams of one analysis run.
#[derive(Clone, Debug, Default)]
pub struct FrameStore {
    detections: Vec<DetectionFrame>,
    poses: Vec<PoseFrame>,
}

impl FrameStore {
    /// Pose frames are kept sorted by `frame_id` for `PoseIndex`.
    pub fn new(detections: Vec<DetectionFrame>, mut poses: Vec<PoseFrame>) -> Self {
        poses.sort_by_key(|pose| pose.frame_id);
        Self { detections, poses }
    }

    pub fn detections(&self) -> &[DetectionFrame] {
        &self.detections
    }

    pub fn pose_index(&self) -> PoseIndex<'_> {
        PoseIndex::new(&self.poses)
    }

    /// Overlay for the first frame at or after `timestamp_ms`.
    pub fn overlay_at(&self, timestamp_ms: f64) -> Option<FrameOverlay<'_>> {
        let frame = self
            .detections
            .iter()
            .find(|frame| frame.timestamp_ms >= timestamp_ms)?;
        let people = self
            .pose_for(frame)
            .map(|pose| pose.people.as_slice())
            .unwrap_or(&[]);
        Some(FrameOverlay {
            frame_id: frame.frame_id,
            timestamp_ms: frame.timestamp_ms,
            objects: &frame.objects,
            people,
        })
    }

    /// Pose frame for `frame`: by `frame_id`, else the first timestamped
    /// pose frame at or after the detection's timestamp.
    fn pose_for(&self, frame: &DetectionFrame) -> Option<&PoseFrame> {
        self.pose_index().get(frame.frame_id).or_else(|| {
            self.poses.iter().find(|pose| {
                pose.timestamp_ms
                    .is_some_and(|ts| ts >= frame.timestamp_ms)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Point};

    fn pose(frame_id: u64, person_id: u32) -> PoseFrame {
        PoseFrame::new(
            frame_id,
            vec![PersonPose::new(person_id, vec![Point::new(1.0, 1.0)])],
        )
    }

    #[test]
    fn pose_index_uses_positional_slot() {
        let poses = vec![pose(1, 10), pose(2, 20), pose(3, 30)];
        let index = PoseIndex::new(&poses);
        assert_eq!(index.get(2).unwrap().people[0].person_id, 20);
        assert_eq!(index.get(1).unwrap().people[0].person_id, 10);
    }

    #[test]
    fn pose_index_falls_back_when_slot_disagrees() {
        // Frame 2 was dropped upstream, so frame 3 sits in slot 1.
        let poses = vec![pose(1, 10), pose(3, 30), pose(4, 40)];
        let index = PoseIndex::new(&poses);
        assert_eq!(index.get(3).unwrap().people[0].person_id, 30);
        assert_eq!(index.get(4).unwrap().people[0].person_id, 40);
        assert!(index.get(2).is_none());
        assert!(index.get(0).is_none());
        assert!(index.get(99).is_none());
    }

    #[test]
    fn overlay_picks_first_frame_at_or_after_timestamp() {
        let detections = vec![
            DetectionFrame::empty(1, 0.0),
            DetectionFrame::new(
                2,
                40.0,
                vec![ObjectDetection::new(
                    "cell phone",
                    BoundingBox::new(0.0, 0.0, 4.0, 4.0),
                )],
            ),
            DetectionFrame::empty(3, 80.0),
        ];
        let store = FrameStore::new(detections, vec![pose(1, 1), pose(2, 2)]);

        let overlay = store.overlay_at(10.0).expect("overlay");
        assert_eq!(overlay.frame_id, 2);
        assert_eq!(overlay.objects.len(), 1);
        assert_eq!(overlay.people[0].person_id, 2);

        let overlay = store.overlay_at(80.0).expect("overlay");
        assert_eq!(overlay.frame_id, 3);
        assert!(overlay.people.is_empty());

        assert!(store.overlay_at(80.5).is_none());
    }

    #[test]
    fn overlay_falls_back_to_pose_timestamps() {
        let detections = vec![DetectionFrame::empty(1, 0.0), DetectionFrame::empty(2, 40.0)];
        // Pose stream numbered on its own; only its timestamps line up.
        let mut early = pose(101, 7);
        early.timestamp_ms = Some(0.0);
        let mut late = pose(102, 8);
        late.timestamp_ms = Some(40.0);
        let store = FrameStore::new(detections, vec![early, late]);

        let overlay = store.overlay_at(20.0).expect("overlay");
        assert_eq!(overlay.frame_id, 2);
        assert_eq!(overlay.people[0].person_id, 8);

        // Untimed pose frames never match by time.
        let store = FrameStore::new(vec![DetectionFrame::empty(1, 0.0)], vec![pose(101, 7)]);
        assert!(store.overlay_at(0.0).expect("overlay").people.is_empty());
    }
}
