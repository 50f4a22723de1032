//! Temporal segmentation of per-person hits into violation intervals.
//!
//! Each person runs an independent episode state machine over their hits in
//! timestamp order. Early in an episode (elapsed `<= min_duration`) the gap
//! between hits must stay within `max_short_diff`; once the episode has run
//! for at least `min_duration`, gaps up to `max_long_diff` are bridged.
//!
//! Closing rules:
//! - A gap that breaks continuation closes the episode. It is emitted only if
//!   its elapsed time is strictly greater than `min_duration`, and the hit
//!   that broke it is discarded rather than opening a new episode.
//! - When the last hit of a person's sequence continues an open episode, that
//!   episode is emitted whatever its elapsed time.
//! - A final hit that only opens an episode emits nothing.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use serde::Serialize;

use crate::pose::PersonId;
use crate::{format_timestamp, Hit, ViolationRecord};

/// Segmentation thresholds, all in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentParams {
    pub min_duration: u64,
    pub max_short_diff: u64,
    pub max_long_diff: u64,
}

impl SegmentParams {
    /// Whether a hit `diff` ms after the last one extends an episode that
    /// has run for `passed` ms. Both tiers are inclusive.
    pub fn continues(&self, passed: f64, diff: f64) -> bool {
        let min = self.min_duration as f64;
        (passed <= min && diff <= self.max_short_diff as f64)
            || (passed >= min && diff <= self.max_long_diff as f64)
    }
}

/// A hit reduced to what the segmenter reads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameHit {
    pub frame_id: u64,
    pub timestamp_ms: f64,
}

/// One person's hits in input order.
#[derive(Clone, Debug, PartialEq)]
pub struct PersonHits {
    pub person_id: PersonId,
    pub hits: Vec<FrameHit>,
}

/// Group hits per person.
///
/// Persons keep their first-appearance order and hits keep input order.
/// Repeated hits for the same person in the same frame (several watched
/// objects near one person) collapse into the first one.
pub fn group_hits(hits: &[Hit]) -> Vec<PersonHits> {
    let mut groups: Vec<PersonHits> = Vec::new();
    let mut slots: HashMap<PersonId, usize> = HashMap::new();
    let mut seen: HashSet<(PersonId, u64)> = HashSet::new();

    for hit in hits {
        if !seen.insert((hit.person_id, hit.frame_id)) {
            continue;
        }
        let slot = *slots.entry(hit.person_id).or_insert_with(|| {
            groups.push(PersonHits {
                person_id: hit.person_id,
                hits: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].hits.push(FrameHit {
            frame_id: hit.frame_id,
            timestamp_ms: hit.timestamp_ms,
        });
    }
    groups
}

/// A confirmed episode for one person.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ViolationInterval {
    pub start_ms: f64,
    pub end_ms: f64,
    pub person_id: PersonId,
    pub category: String,
}

impl ViolationInterval {
    pub fn to_record(&self) -> ViolationRecord {
        ViolationRecord {
            start: format_timestamp(self.start_ms),
            end: format_timestamp(self.end_ms),
            person_id: self.person_id,
            category: self.category.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Episode {
    start: f64,
    last: f64,
    passed: f64,
}

impl Episode {
    fn open(timestamp: f64) -> Self {
        Self {
            start: timestamp,
            last: timestamp,
            passed: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Segmenter {
    params: SegmentParams,
    category: String,
}

impl Segmenter {
    pub fn new(params: SegmentParams, category: impl Into<String>) -> Self {
        Self {
            params,
            category: category.into(),
        }
    }

    /// Run one person's state machine over their hits.
    pub fn segment(&self, group: &PersonHits) -> Vec<ViolationInterval> {
        let hits = ordered_hits(group);
        let mut intervals = Vec::new();
        let mut episode: Option<Episode> = None;

        for (index, hit) in hits.iter().enumerate() {
            let timestamp = hit.timestamp_ms;
            let Some(mut open) = episode else {
                episode = Some(Episode::open(timestamp));
                continue;
            };

            let diff = timestamp - open.last;
            if self.params.continues(open.passed, diff) {
                open.passed = timestamp - open.start;
                open.last = timestamp;
                if index + 1 == hits.len() {
                    intervals.push(self.interval(group.person_id, open.start, timestamp));
                    episode = None;
                } else {
                    episode = Some(open);
                }
            } else {
                if open.passed > self.params.min_duration as f64 {
                    intervals.push(self.interval(group.person_id, open.start, open.last));
                }
                log::debug!(
                    "person {}: episode from {}ms closed by {}ms gap at frame {}",
                    group.person_id,
                    open.start,
                    diff,
                    hit.frame_id
                );
                episode = None;
            }
        }
        intervals
    }

    /// Segment every person. Persons are independent, so they run in
    /// parallel; output keeps the order of `groups`.
    pub fn segment_all(&self, groups: &[PersonHits]) -> Vec<ViolationInterval> {
        groups
            .par_iter()
            .map(|group| self.segment(group))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    }

    fn interval(&self, person_id: PersonId, start_ms: f64, end_ms: f64) -> ViolationInterval {
        ViolationInterval {
            start_ms,
            end_ms,
            person_id,
            category: self.category.clone(),
        }
    }
}

/// Drop hits that would run the clock backwards, and hits whose timestamp
/// is negative or not finite.
fn ordered_hits(group: &PersonHits) -> Vec<FrameHit> {
    let mut latest = 0.0;
    let mut ordered = Vec::with_capacity(group.hits.len());
    for hit in &group.hits {
        if !hit.timestamp_ms.is_finite() || hit.timestamp_ms < latest {
            log::warn!(
                "person {}: dropping hit at frame {} with bad timestamp {}ms",
                group.person_id,
                hit.frame_id,
                hit.timestamp_ms
            );
            continue;
        }
        latest = hit.timestamp_ms;
        ordered.push(*hit);
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: SegmentParams = SegmentParams {
        min_duration: 3000,
        max_short_diff: 3000,
        max_long_diff: 5000,
    };

    fn person(person_id: PersonId, stamps: &[f64]) -> PersonHits {
        PersonHits {
            person_id,
            hits: stamps
                .iter()
                .enumerate()
                .map(|(i, &timestamp_ms)| FrameHit {
                    frame_id: i as u64 + 1,
                    timestamp_ms,
                })
                .collect(),
        }
    }

    fn spans(intervals: &[ViolationInterval]) -> Vec<(f64, f64)> {
        intervals.iter().map(|v| (v.start_ms, v.end_ms)).collect()
    }

    fn segmenter() -> Segmenter {
        Segmenter::new(PARAMS, "phone usage")
    }

    #[test]
    fn sustained_episode_is_flushed_at_end() {
        let out = segmenter().segment(&person(1, &[0.0, 1000.0, 2000.0, 3000.0, 6000.0]));
        assert_eq!(spans(&out), vec![(0.0, 6000.0)]);
        assert_eq!(out[0].person_id, 1);
        assert_eq!(out[0].category, "phone usage");
    }

    #[test]
    fn short_episode_broken_by_gap_is_discarded() {
        let out = segmenter().segment(&person(1, &[0.0, 1000.0, 5000.0, 5500.0]));
        // 1000 -> 5000 breaks at passed=1000; 5000 is dropped, 5500 opens.
        assert!(out.is_empty());
    }

    #[test]
    fn long_episode_closes_at_last_accepted_hit() {
        let out = segmenter().segment(&person(
            2,
            &[10_000.0, 12_000.0, 14_000.0, 16_000.0, 30_000.0, 31_000.0],
        ));
        assert_eq!(spans(&out), vec![(10_000.0, 16_000.0)]);
    }

    #[test]
    fn breaking_hit_does_not_open_next_episode() {
        // Episode 1 closes at 30s, the 30s hit is dropped; 31s opens a new
        // episode that the 32s hit flushes.
        let out = segmenter().segment(&person(
            2,
            &[10_000.0, 12_000.0, 14_000.0, 16_000.0, 30_000.0, 31_000.0, 32_000.0],
        ));
        assert_eq!(spans(&out), vec![(10_000.0, 16_000.0), (31_000.0, 32_000.0)]);
    }

    #[test]
    fn close_requires_strictly_more_than_min_duration() {
        let out = segmenter().segment(&person(3, &[0.0, 3000.0, 9000.0, 9100.0, 9200.0]));
        // passed == 3000 at the 9000 gap: not > min_duration, dropped.
        // 9100 opens, 9200 flushes.
        assert_eq!(spans(&out), vec![(9100.0, 9200.0)]);
    }

    #[test]
    fn lone_final_hit_emits_nothing() {
        assert!(segmenter().segment(&person(4, &[42_000.0])).is_empty());
        assert!(segmenter().segment(&person(4, &[])).is_empty());
    }

    #[test]
    fn out_of_order_hits_are_dropped() {
        let out = segmenter().segment(&person(5, &[1000.0, 2000.0, 1500.0, 3000.0]));
        assert_eq!(spans(&out), vec![(1000.0, 3000.0)]);
    }

    #[test]
    fn negative_timestamps_are_dropped() {
        let out = segmenter().segment(&person(6, &[-1500.0, 0.0, 1000.0, -200.0, 2000.0]));
        assert_eq!(spans(&out), vec![(0.0, 2000.0)]);
        assert_eq!(out[0].to_record().start, "0:00");

        assert!(segmenter().segment(&person(6, &[-3000.0, -2000.0])).is_empty());
    }

    #[test]
    fn non_finite_timestamps_are_dropped() {
        let out = segmenter().segment(&person(
            7,
            &[0.0, f64::NAN, 1000.0, f64::INFINITY, 2000.0, f64::NEG_INFINITY],
        ));
        assert_eq!(spans(&out), vec![(0.0, 2000.0)]);
    }

    #[test]
    fn group_hits_collapses_same_frame_duplicates() {
        let hits = [
            Hit { frame_id: 1, timestamp_ms: 0.0, person_id: 2 },
            Hit { frame_id: 1, timestamp_ms: 0.0, person_id: 2 },
            Hit { frame_id: 1, timestamp_ms: 0.0, person_id: 0 },
            Hit { frame_id: 2, timestamp_ms: 40.0, person_id: 2 },
        ];
        let groups = group_hits(&hits);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].person_id, 2);
        assert_eq!(groups[0].hits.len(), 2);
        assert_eq!(groups[1].person_id, 0);
        assert_eq!(groups[1].hits.len(), 1);
    }

    #[test]
    fn segment_all_preserves_person_order() {
        let groups = vec![
            person(9, &[0.0, 1000.0]),
            person(3, &[0.0, 500.0]),
        ];
        let out = segmenter().segment_all(&groups);
        let ids: Vec<PersonId> = out.iter().map(|v| v.person_id).collect();
        assert_eq!(ids, vec![9, 3]);
    }

    #[test]
    fn to_record_formats_minutes_and_seconds() {
        let interval = ViolationInterval {
            start_ms: 61_000.0,
            end_ms: 125_999.0,
            person_id: 0,
            category: "phone usage".into(),
        };
        let record = interval.to_record();
        assert_eq!(record.start, "1:01");
        assert_eq!(record.end, "2:05");
    }
}
