use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::pose::WristPair;
use crate::rules::RuleKind;
use crate::segment::SegmentParams;
use crate::tracking::TrackingMode;

const DEFAULT_CATEGORY: &str = "phone usage";
const DEFAULT_BATCH_SIZE: usize = 4;
const DEFAULT_MAX_MATCH_DIST: f64 = 150.0;
const DEFAULT_MAX_IDLE_FRAMES: u64 = 30;

pub const ENV_CONFIG: &str = "DMS_CONFIG";
pub const ENV_MAX_WRIST_DIST: &str = "DMS_MAX_WRIST_DIST";
pub const ENV_MIN_DURATION: &str = "DMS_MIN_DURATION_MS";
pub const ENV_MAX_SHORT_DIFF: &str = "DMS_MAX_SHORT_DIFF_MS";
pub const ENV_MAX_LONG_DIFF: &str = "DMS_MAX_LONG_DIFF_MS";
pub const ENV_DETECTED_CLASSES: &str = "DMS_DETECTED_CLASSES";
pub const ENV_BATCH_SIZE: &str = "DMS_BATCH_SIZE";

/// Configuration problems. All of them stop the run before any frame is read.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing configuration key `{0}`")]
    Missing(String),
    #[error("invalid configuration key `{key}`: {reason}")]
    Invalid { key: String, reason: String },
    #[error("unknown violation rule `{0}`")]
    UnknownRule(String),
}

impl ConfigError {
    fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct AnalyzerConfigFile {
    default_rules: Option<Vec<String>>,
    rules: Option<BTreeMap<String, RuleConfigFile>>,
    tracking: Option<TrackingConfigFile>,
    processing: Option<ProcessingConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct RuleConfigFile {
    max_wrist_dist: Option<f64>,
    min_duration: Option<i64>,
    max_short_diff: Option<i64>,
    max_long_diff: Option<i64>,
    detected_classes: Option<Vec<String>>,
    category: Option<String>,
    wrist_indices: Option<Vec<usize>>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackingConfigFile {
    mode: Option<String>,
    max_match_dist: Option<f64>,
    max_idle_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ProcessingConfigFile {
    batch_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerConfig {
    /// Rules run when the caller does not pick any.
    pub default_rules: Vec<RuleKind>,
    pub wrist_phone_usage: Option<WristUsageSettings>,
    pub tracking: TrackingMode,
    /// Frames per batch when streaming input.
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WristUsageSettings {
    pub max_wrist_dist: f64,
    pub segment: SegmentParams,
    pub detected_classes: Vec<String>,
    pub category: String,
    pub wrists: WristPair,
}

impl AnalyzerConfig {
    /// Load from the file named by `DMS_CONFIG` (if set) plus env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(ENV_CONFIG)
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (or none) plus env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => AnalyzerConfigFile::default(),
        };
        apply_env(&mut file_cfg)?;
        let cfg = Self::from_file(file_cfg)?;
        cfg.warn_on_suspicious_values();
        Ok(cfg)
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.default_rules.iter().map(|rule| rule.name()).collect()
    }

    fn from_file(file: AnalyzerConfigFile) -> Result<Self, ConfigError> {
        let mut wrist_phone_usage = None;
        for (name, rule) in file.rules.unwrap_or_default() {
            match RuleKind::from_name(&name) {
                Some(RuleKind::WristPhoneUsage) => {
                    wrist_phone_usage = Some(WristUsageSettings::from_file(&name, rule)?);
                }
                None => return Err(ConfigError::UnknownRule(name)),
            }
        }

        let default_rules = match file.default_rules {
            Some(names) => names
                .iter()
                .map(|name| {
                    RuleKind::from_name(name).ok_or_else(|| ConfigError::UnknownRule(name.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => wrist_phone_usage
                .iter()
                .map(|_| RuleKind::WristPhoneUsage)
                .collect(),
        };
        if default_rules.is_empty() {
            return Err(ConfigError::Missing(format!(
                "rules.{}",
                RuleKind::WristPhoneUsage.name()
            )));
        }

        let cfg = Self {
            default_rules,
            wrist_phone_usage,
            tracking: tracking_from_file(file.tracking.unwrap_or_default())?,
            batch_size: file
                .processing
                .and_then(|processing| processing.batch_size)
                .unwrap_or(DEFAULT_BATCH_SIZE),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for rule in &self.default_rules {
            self.require(*rule)?;
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid(
                "processing.batch_size",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Settings for `rule`, or a missing-key error naming its section.
    pub fn require(&self, rule: RuleKind) -> Result<&WristUsageSettings, ConfigError> {
        match rule {
            RuleKind::WristPhoneUsage => self
                .wrist_phone_usage
                .as_ref()
                .ok_or_else(|| ConfigError::Missing(format!("rules.{}", rule.name()))),
        }
    }

    fn warn_on_suspicious_values(&self) {
        if let Some(settings) = &self.wrist_phone_usage {
            if settings.segment.max_long_diff < settings.segment.max_short_diff {
                log::warn!(
                    "max_long_diff ({}ms) is below max_short_diff ({}ms); sustained episodes will fragment sooner than new ones",
                    settings.segment.max_long_diff,
                    settings.segment.max_short_diff
                );
            }
        }
    }
}

impl WristUsageSettings {
    fn from_file(rule: &str, file: RuleConfigFile) -> Result<Self, ConfigError> {
        let key = |field: &str| format!("rules.{}.{}", rule, field);

        let max_wrist_dist = file
            .max_wrist_dist
            .ok_or_else(|| ConfigError::Missing(key("max_wrist_dist")))?;
        if !max_wrist_dist.is_finite() || max_wrist_dist <= 0.0 {
            return Err(ConfigError::invalid(
                key("max_wrist_dist"),
                "must be a finite number greater than zero",
            ));
        }

        let segment = SegmentParams {
            min_duration: millis(key("min_duration"), file.min_duration)?,
            max_short_diff: millis(key("max_short_diff"), file.max_short_diff)?,
            max_long_diff: millis(key("max_long_diff"), file.max_long_diff)?,
        };

        let detected_classes: Vec<String> = file
            .detected_classes
            .ok_or_else(|| ConfigError::Missing(key("detected_classes")))?
            .into_iter()
            .map(|class| class.trim().to_string())
            .filter(|class| !class.is_empty())
            .collect();
        if detected_classes.is_empty() {
            return Err(ConfigError::invalid(
                key("detected_classes"),
                "must name at least one class",
            ));
        }

        let wrists = match file.wrist_indices.as_deref() {
            None => WristPair::default(),
            Some(&[first, second]) if first != second => WristPair::new(first, second),
            Some(_) => {
                return Err(ConfigError::invalid(
                    key("wrist_indices"),
                    "must list exactly two distinct keypoint indices",
                ))
            }
        };

        let category = file
            .category
            .filter(|category| !category.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        Ok(Self {
            max_wrist_dist,
            segment,
            detected_classes,
            category,
            wrists,
        })
    }
}

fn millis(key: String, value: Option<i64>) -> Result<u64, ConfigError> {
    let value = value.ok_or_else(|| ConfigError::Missing(key.clone()))?;
    u64::try_from(value)
        .map_err(|_| ConfigError::invalid(key, "must be a non-negative number of milliseconds"))
}

fn tracking_from_file(file: TrackingConfigFile) -> Result<TrackingMode, ConfigError> {
    match file.mode.as_deref().map(str::trim) {
        None | Some("pass_through") => Ok(TrackingMode::PassThrough),
        Some("nearest_keypoint") => {
            let max_match_dist = file.max_match_dist.unwrap_or(DEFAULT_MAX_MATCH_DIST);
            if !max_match_dist.is_finite() || max_match_dist <= 0.0 {
                return Err(ConfigError::invalid(
                    "tracking.max_match_dist",
                    "must be a finite number greater than zero",
                ));
            }
            Ok(TrackingMode::NearestKeypoint {
                max_match_dist,
                max_idle_frames: file.max_idle_frames.unwrap_or(DEFAULT_MAX_IDLE_FRAMES),
            })
        }
        Some(other) => Err(ConfigError::invalid(
            "tracking.mode",
            format!("unknown mode '{}' (expected pass_through or nearest_keypoint)", other),
        )),
    }
}

fn apply_env(file: &mut AnalyzerConfigFile) -> Result<()> {
    let rule_name = RuleKind::WristPhoneUsage.name();
    let touches_rule = [
        ENV_MAX_WRIST_DIST,
        ENV_MIN_DURATION,
        ENV_MAX_SHORT_DIFF,
        ENV_MAX_LONG_DIFF,
        ENV_DETECTED_CLASSES,
    ]
    .iter()
    .any(|key| env_value(key).is_some());

    if touches_rule {
        let rule = file
            .rules
            .get_or_insert_with(BTreeMap::new)
            .entry(rule_name.to_string())
            .or_default();
        if let Some(value) = env_value(ENV_MAX_WRIST_DIST) {
            rule.max_wrist_dist = Some(parse_env(ENV_MAX_WRIST_DIST, &value)?);
        }
        if let Some(value) = env_value(ENV_MIN_DURATION) {
            rule.min_duration = Some(parse_env(ENV_MIN_DURATION, &value)?);
        }
        if let Some(value) = env_value(ENV_MAX_SHORT_DIFF) {
            rule.max_short_diff = Some(parse_env(ENV_MAX_SHORT_DIFF, &value)?);
        }
        if let Some(value) = env_value(ENV_MAX_LONG_DIFF) {
            rule.max_long_diff = Some(parse_env(ENV_MAX_LONG_DIFF, &value)?);
        }
        if let Some(value) = env_value(ENV_DETECTED_CLASSES) {
            let parsed = split_csv(&value);
            if !parsed.is_empty() {
                rule.detected_classes = Some(parsed);
            }
        }
    }

    if let Some(value) = env_value(ENV_BATCH_SIZE) {
        file.processing
            .get_or_insert_with(ProcessingConfigFile::default)
            .batch_size = Some(parse_env(ENV_BATCH_SIZE, &value)?);
    }
    Ok(())
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        anyhow::Error::new(ConfigError::invalid(
            key,
            format!("could not parse '{}'", value),
        ))
    })
}

fn read_config_file(path: &Path) -> Result<AnalyzerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
