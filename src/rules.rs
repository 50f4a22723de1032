//! Violation rules.
//!
//! Rules are a closed set: each one is a `RuleKind` variant with a fixed
//! config key, and a `Rule` value pairs the kind with its configured
//! correlator and segmenter. Unknown rule names never get past config load.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::{AnalyzerConfig, WristUsageSettings};
use crate::correlate::{CorrelationOutcome, SpatialCorrelator};
use crate::detect::DetectionFrame;
use crate::pose::PoseFrame;
use crate::segment::{PersonHits, Segmenter, ViolationInterval};

/// Input streams a rule reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataKind {
    Detection,
    Pose,
}

/// Every rule the kernel knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Watched object held near a wrist for a sustained period.
    WristPhoneUsage,
}

impl RuleKind {
    pub const ALL: &'static [RuleKind] = &[RuleKind::WristPhoneUsage];

    pub fn name(self) -> &'static str {
        match self {
            RuleKind::WristPhoneUsage => "wrist_phone_usage",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name.trim())
    }

    pub fn descriptor(self) -> RuleDescriptor {
        match self {
            RuleKind::WristPhoneUsage => RuleDescriptor {
                id: self.name(),
                required_data: WRIST_USAGE_REQUIRED,
            },
        }
    }
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Rule metadata used when wiring input streams.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleDescriptor {
    pub id: &'static str,
    pub required_data: &'static [DataKind],
}

impl RuleDescriptor {
    pub fn requires(&self, data: DataKind) -> bool {
        self.required_data.contains(&data)
    }
}

const WRIST_USAGE_REQUIRED: &[DataKind] = &[DataKind::Detection, DataKind::Pose];

/// Wrist-proximity phone usage.
#[derive(Clone, Debug)]
pub struct WristPhoneUsageRule {
    correlator: SpatialCorrelator,
    segmenter: Segmenter,
}

impl WristPhoneUsageRule {
    pub fn new(settings: &WristUsageSettings) -> Self {
        Self {
            correlator: SpatialCorrelator::new(
                settings.detected_classes.iter().cloned(),
                settings.max_wrist_dist,
            )
            .with_wrists(settings.wrists),
            segmenter: Segmenter::new(settings.segment, settings.category.clone()),
        }
    }
}

/// A configured rule, dispatched by variant.
#[derive(Clone, Debug)]
pub enum Rule {
    WristPhoneUsage(WristPhoneUsageRule),
}

impl Rule {
    /// Build `kind` from its config section.
    pub fn from_config(kind: RuleKind, cfg: &AnalyzerConfig) -> Result<Self> {
        match kind {
            RuleKind::WristPhoneUsage => Ok(Rule::WristPhoneUsage(WristPhoneUsageRule::new(
                cfg.require(kind)?,
            ))),
        }
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            Rule::WristPhoneUsage(_) => RuleKind::WristPhoneUsage,
        }
    }

    pub fn descriptor(&self) -> RuleDescriptor {
        self.kind().descriptor()
    }

    /// Frame-level hits for one detection frame and its pose frame.
    pub fn correlate(&self, frame: &DetectionFrame, pose: Option<&PoseFrame>) -> CorrelationOutcome {
        match self {
            Rule::WristPhoneUsage(rule) => rule.correlator.correlate(frame, pose),
        }
    }

    /// Intervals for already-grouped hits.
    pub fn segment(&self, groups: &[PersonHits]) -> Vec<ViolationInterval> {
        match self {
            Rule::WristPhoneUsage(rule) => rule.segmenter.segment_all(groups),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_names_round_trip() {
        for kind in RuleKind::ALL {
            assert_eq!(RuleKind::from_name(kind.name()), Some(*kind));
        }
        assert_eq!(RuleKind::from_name(" wrist_phone_usage "), Some(RuleKind::WristPhoneUsage));
        assert_eq!(RuleKind::from_name("wrist_usage"), None);
    }

    #[test]
    fn wrist_rule_requires_detections_and_poses() {
        let desc = RuleKind::WristPhoneUsage.descriptor();
        assert_eq!(desc.id, "wrist_phone_usage");
        assert_eq!(desc.required_data, &[DataKind::Detection, DataKind::Pose]);
        assert!(desc.requires(DataKind::Pose));
    }

    #[test]
    fn rule_without_config_section_is_refused() {
        let cfg = AnalyzerConfig {
            default_rules: Vec::new(),
            wrist_phone_usage: None,
            tracking: Default::default(),
            batch_size: 4,
        };
        let err = Rule::from_config(RuleKind::WristPhoneUsage, &cfg).unwrap_err();
        assert!(err.to_string().contains("rules.wrist_phone_usage"));
    }
}
