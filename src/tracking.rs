//! Person identity assignment ahead of segmentation.
//!
//! The segmenter keys episodes by `person_id`, so ids must be stable for the
//! duration of an episode. Upstream trackers that already deliver stable ids
//! use `PassThrough`; estimators that only number people per frame use the
//! nearest-keypoint tracker to turn positions into persistent ids.

use crate::detect::Point;
use crate::pose::{PersonId, PoseFrame};

/// How person ids in pose frames are interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum TrackingMode {
    /// `person_id` is already a stable track id.
    #[default]
    PassThrough,
    /// Re-identify people frame to frame by keypoint centroid proximity.
    NearestKeypoint {
        max_match_dist: f64,
        max_idle_frames: u64,
    },
}

#[derive(Clone, Debug)]
pub enum IdentityAssigner {
    PassThrough,
    NearestKeypoint(NearestKeypointTracker),
}

impl IdentityAssigner {
    pub fn new(mode: TrackingMode) -> Self {
        match mode {
            TrackingMode::PassThrough => IdentityAssigner::PassThrough,
            TrackingMode::NearestKeypoint {
                max_match_dist,
                max_idle_frames,
            } => IdentityAssigner::NearestKeypoint(NearestKeypointTracker::new(
                max_match_dist,
                max_idle_frames,
            )),
        }
    }

    /// Rewrite the frame's person ids. Frames must arrive in `frame_id` order.
    pub fn assign(&mut self, frame: PoseFrame) -> PoseFrame {
        match self {
            IdentityAssigner::PassThrough => frame,
            IdentityAssigner::NearestKeypoint(tracker) => tracker.assign(frame),
        }
    }
}

#[derive(Clone, Debug)]
struct Track {
    id: PersonId,
    centroid: Point,
    last_frame: u64,
}

/// Greedy nearest-centroid tracker.
///
/// (track, person) pairs are matched in ascending centroid distance, ties
/// broken by track id then person order, so assignment is deterministic.
#[derive(Clone, Debug)]
pub struct NearestKeypointTracker {
    max_match_dist: f64,
    max_idle_frames: u64,
    tracks: Vec<Track>,
    next_id: PersonId,
}

impl NearestKeypointTracker {
    pub fn new(max_match_dist: f64, max_idle_frames: u64) -> Self {
        Self {
            max_match_dist,
            max_idle_frames,
            tracks: Vec::new(),
            next_id: 0,
        }
    }

    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn assign(&mut self, mut frame: PoseFrame) -> PoseFrame {
        let frame_id = frame.frame_id;
        let max_idle = self.max_idle_frames;
        self.tracks
            .retain(|track| frame_id.saturating_sub(track.last_frame) <= max_idle);

        let centroids: Vec<Option<Point>> =
            frame.people.iter().map(|person| person.centroid()).collect();

        let mut candidates: Vec<(f64, PersonId, usize, usize)> = Vec::new();
        for (track_idx, track) in self.tracks.iter().enumerate() {
            for (person_idx, centroid) in centroids.iter().enumerate() {
                let Some(centroid) = centroid else { continue };
                let dist = track.centroid.distance(centroid);
                if dist <= self.max_match_dist {
                    candidates.push((dist, track.id, track_idx, person_idx));
                }
            }
        }
        candidates.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then(a.3.cmp(&b.3))
        });

        let mut track_taken = vec![false; self.tracks.len()];
        let mut ids: Vec<Option<PersonId>> = vec![None; frame.people.len()];
        for (_, track_id, track_idx, person_idx) in candidates {
            if track_taken[track_idx] || ids[person_idx].is_some() {
                continue;
            }
            track_taken[track_idx] = true;
            ids[person_idx] = Some(track_id);
            if let Some(centroid) = centroids[person_idx] {
                let track = &mut self.tracks[track_idx];
                track.centroid = centroid;
                track.last_frame = frame_id;
            }
        }

        for (person_idx, centroid) in centroids.iter().enumerate() {
            if ids[person_idx].is_some() {
                continue;
            }
            let Some(centroid) = centroid else {
                log::debug!(
                    "frame {}: person {} has no usable keypoints, dropped",
                    frame_id,
                    frame.people[person_idx].person_id
                );
                continue;
            };
            let id = self.next_id;
            self.next_id += 1;
            self.tracks.push(Track {
                id,
                centroid: *centroid,
                last_frame: frame_id,
            });
            ids[person_idx] = Some(id);
        }

        let people = std::mem::take(&mut frame.people);
        frame.people = people
            .into_iter()
            .zip(ids)
            .filter_map(|(mut person, id)| {
                person.person_id = id?;
                Some(person)
            })
            .collect();
        frame
    }
}

/// Identity assignment over a pose stream that only moves forward.
///
/// A frame at or before the last accepted `frame_id` is dropped before it
/// reaches the assigner, so duplicates never advance tracker state.
#[derive(Clone, Debug)]
pub struct PoseSequencer {
    assigner: IdentityAssigner,
    last_frame: Option<u64>,
    dropped: usize,
}

impl PoseSequencer {
    pub fn new(mode: TrackingMode) -> Self {
        Self {
            assigner: IdentityAssigner::new(mode),
            last_frame: None,
            dropped: 0,
        }
    }

    /// Assign ids to the next pose frame, or drop it if it goes backwards.
    pub fn accept(&mut self, frame: PoseFrame) -> Option<PoseFrame> {
        if let Some(last) = self.last_frame.filter(|&last| frame.frame_id <= last) {
            log::warn!(
                "pose frame {} arrived after frame {}, dropped",
                frame.frame_id,
                last
            );
            self.dropped += 1;
            return None;
        }
        self.last_frame = Some(frame.frame_id);
        Some(self.assigner.assign(frame))
    }

    /// Sort a batch by `frame_id` and accept each frame in turn.
    pub fn accept_batch(&mut self, mut frames: Vec<PoseFrame>) -> Vec<PoseFrame> {
        frames.sort_by_key(|frame| frame.frame_id);
        frames
            .into_iter()
            .filter_map(|frame| self.accept(frame))
            .collect()
    }

    /// Frames dropped so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
