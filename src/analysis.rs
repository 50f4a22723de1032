//! Analysis runs.
//!
//! An `Analyzer` holds the configured rules. Each run goes through an
//! `AnalysisSession`, which accepts input in batches of any size and
//! produces the same report as a single pass over the whole input: hits are
//! ordered by frame before segmentation, so only timestamps (never batch
//! boundaries) decide where an episode ends.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::AnalyzerConfig;
use crate::correlate::CorrelationOutcome;
use crate::detect::DetectionFrame;
use crate::pose::PoseFrame;
use crate::rules::{DataKind, Rule, RuleKind};
use crate::segment::{group_hits, ViolationInterval};
use crate::tracking::{PoseSequencer, TrackingMode};
use crate::{Hit, ViolationRecord};

/// Counters for one run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Detection frames correlated.
    pub frames: usize,
    /// Frame-level hits across all rules, before same-frame collapsing.
    pub hits: usize,
    /// Watched detections dropped for malformed geometry.
    pub skipped_detections: usize,
    /// Detection frames that never got a pose frame.
    pub unmatched_frames: usize,
    /// Pose frames dropped for arriving out of order.
    pub dropped_pose_frames: usize,
}

/// Output of one run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub violations: Vec<ViolationInterval>,
    pub stats: RunStats,
}

impl AnalysisReport {
    /// Display records, in violation order.
    pub fn records(&self) -> Vec<ViolationRecord> {
        self.violations.iter().map(ViolationInterval::to_record).collect()
    }
}

#[derive(Clone, Debug)]
pub struct Analyzer {
    rules: Vec<Rule>,
    tracking: TrackingMode,
    /// Some selected rule reads poses. When none does, detection frames are
    /// correlated as they arrive and pose frames are ignored.
    needs_pose: bool,
}

impl Analyzer {
    /// Analyzer running the config's default rules.
    pub fn new(cfg: &AnalyzerConfig) -> Result<Self> {
        Self::with_rules(cfg, &[])
    }

    /// Analyzer running `kinds`, or the config's default rules when empty.
    pub fn with_rules(cfg: &AnalyzerConfig, kinds: &[RuleKind]) -> Result<Self> {
        let kinds = if kinds.is_empty() {
            cfg.default_rules.as_slice()
        } else {
            kinds
        };
        if kinds.is_empty() {
            return Err(anyhow!("no violation rules selected"));
        }

        let mut rules: Vec<Rule> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if rules.iter().any(|rule| rule.kind() == *kind) {
                continue;
            }
            rules.push(Rule::from_config(*kind, cfg)?);
        }
        let needs_pose = rules
            .iter()
            .any(|rule| rule.descriptor().requires(DataKind::Pose));
        Ok(Self {
            rules,
            tracking: cfg.tracking,
            needs_pose,
        })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Start an incremental run.
    pub fn session(&self) -> AnalysisSession<'_> {
        AnalysisSession {
            analyzer: self,
            sequencer: PoseSequencer::new(self.tracking),
            poses: BTreeMap::new(),
            pending: Vec::new(),
            hits: vec![Vec::new(); self.rules.len()],
            stats: RunStats::default(),
        }
    }

    /// Single-pass run over fully materialized streams.
    pub fn analyze(&self, detections: Vec<DetectionFrame>, poses: Vec<PoseFrame>) -> AnalysisReport {
        let mut session = self.session();
        session.push_batch(detections, poses);
        session.finish()
    }
}

/// State of one run fed batch by batch.
pub struct AnalysisSession<'a> {
    analyzer: &'a Analyzer,
    sequencer: PoseSequencer,
    /// Identity-assigned pose frames not yet paired with detections.
    poses: BTreeMap<u64, PoseFrame>,
    /// Detection frames whose pose frame has not arrived yet.
    pending: Vec<DetectionFrame>,
    /// Hits per rule, same order as `analyzer.rules`.
    hits: Vec<Vec<Hit>>,
    stats: RunStats,
}

impl AnalysisSession<'_> {
    /// Feed the next batch of frames.
    ///
    /// Pose frames must not go backwards across batches; a pose frame at or
    /// before the last accepted one is dropped.
    pub fn push_batch(&mut self, detections: Vec<DetectionFrame>, poses: Vec<PoseFrame>) {
        if !self.analyzer.needs_pose {
            for frame in &detections {
                self.correlate(frame, None);
            }
            return;
        }

        for pose in self.sequencer.accept_batch(poses) {
            self.poses.insert(pose.frame_id, pose);
        }

        self.pending.extend(detections);
        let pending = std::mem::take(&mut self.pending);
        for frame in pending {
            match self.poses.remove(&frame.frame_id) {
                Some(pose) => self.correlate(&frame, Some(&pose)),
                None => self.pending.push(frame),
            }
        }
    }

    /// Frames received so far that are waiting for their pose frame.
    pub fn pending_frames(&self) -> usize {
        self.pending.len()
    }

    /// Close the run and segment every rule's hits.
    pub fn finish(mut self) -> AnalysisReport {
        let pending = std::mem::take(&mut self.pending);
        for frame in pending {
            log::debug!("frame {}: no pose frame, no correlation", frame.frame_id);
            self.stats.unmatched_frames += 1;
            self.correlate(&frame, None);
        }

        let mut violations = Vec::new();
        for (rule, hits) in self.analyzer.rules.iter().zip(self.hits.iter_mut()) {
            hits.sort_by_key(|hit| hit.frame_id);
            let groups = group_hits(hits);
            let intervals = rule.segment(&groups);
            log::info!(
                "{}: {} hits across {} people -> {} violations",
                rule.kind(),
                hits.len(),
                groups.len(),
                intervals.len()
            );
            violations.extend(intervals);
        }

        self.stats.dropped_pose_frames = self.sequencer.dropped();
        AnalysisReport {
            violations,
            stats: self.stats,
        }
    }

    fn correlate(&mut self, frame: &DetectionFrame, pose: Option<&PoseFrame>) {
        self.stats.frames += 1;
        for (rule, hits) in self.analyzer.rules.iter().zip(self.hits.iter_mut()) {
            let rule_pose = pose.filter(|_| rule.descriptor().requires(DataKind::Pose));
            let CorrelationOutcome {
                hits: frame_hits,
                skipped,
            } = rule.correlate(frame, rule_pose);
            self.stats.hits += frame_hits.len();
            self.stats.skipped_detections += skipped;
            hits.extend(frame_hits);
        }
    }
}
