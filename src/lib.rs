//! Driver/operator monitoring kernel (DMS)
//!
//! This crate turns per-frame object detections and pose keypoints into
//! time intervals of sustained "phone usage", attributed per person.
//!
//! # Pipeline
//!
//! 1. **Identity**: pose frames pass through an `IdentityAssigner` so that
//!    `person_id` is stable across frames.
//! 2. **Spatial correlation**: a watched object whose box center is close to
//!    a person's wrist yields a `Hit` for that person and frame.
//! 3. **Temporal segmentation**: each person's hits run through an episode
//!    state machine that bridges short detection gaps and emits
//!    `ViolationInterval`s.
//!
//! Model inference, video decoding and rendering live upstream; the kernel
//! only consumes their JSON output (see `ingest`).
//!
//! # Module Structure
//!
//! - `detect`, `pose`: input records and geometry
//! - `frame`: pose alignment and single-frame overlay lookup
//! - `tracking`: identity assignment
//! - `correlate`, `segment`: the two analysis stages
//! - `rules`, `analysis`: configured rules and analysis runs
//! - `config`, `ingest`, `export`: configuration, input files, output formats

use serde::{Deserialize, Serialize};

pub mod analysis;
pub mod config;
pub mod correlate;
pub mod detect;
pub mod export;
pub mod frame;
pub mod ingest;
pub mod pose;
pub mod rules;
pub mod segment;
pub mod tracking;

pub use analysis::{AnalysisReport, AnalysisSession, Analyzer, RunStats};
pub use config::{AnalyzerConfig, ConfigError, WristUsageSettings};
pub use correlate::{CorrelationOutcome, SpatialCorrelator};
pub use detect::{BoundingBox, DetectionFrame, ObjectDetection, Point};
pub use frame::{FrameOverlay, FrameStore, PoseIndex};
pub use pose::{PersonId, PersonPose, PoseFrame, WristPair};
pub use rules::{Rule, RuleKind};
pub use segment::{group_hits, PersonHits, SegmentParams, Segmenter, ViolationInterval};
pub use tracking::{IdentityAssigner, PoseSequencer, TrackingMode};

// -------------------- Hits --------------------

/// A watched object next to a person's wrist in one frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub frame_id: u64,
    pub timestamp_ms: f64,
    pub person_id: PersonId,
}

// -------------------- Records --------------------

/// Display form of a `ViolationInterval`, one row of the results table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub start: String,
    pub end: String,
    pub person_id: PersonId,
    pub category: String,
}

/// Render a video position as `M:SS`.
///
/// Hours are not carried: minutes wrap at 60, so 1:02:03 renders as `2:03`.
pub fn format_timestamp(millis: f64) -> String {
    let millis = millis as i64;
    let seconds = (millis / 1000) % 60;
    let minutes = (millis / (1000 * 60)) % 60;
    format!("{}:{:02}", minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_render_as_minutes_and_padded_seconds() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(6000.0), "0:06");
        assert_eq!(format_timestamp(59_999.9), "0:59");
        assert_eq!(format_timestamp(754_000.0), "12:34");
    }

    #[test]
    fn hours_fold_into_minutes() {
        assert_eq!(format_timestamp(3_723_000.0), "2:03");
        assert_eq!(format_timestamp(3_600_000.0), "0:00");
    }
}
