use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use url::Url;

use crate::rules::Severity;

/// Application configuration module
/// This module handles loading, validating and defaulting the settings
/// of the validation and moderation pipeline.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// SQLite database path (defaults to the user's data directory)
    #[serde(default)]
    pub database_path: Option<String>,

    /// Validation engine settings
    #[serde(default)]
    pub validation: ValidationSettings,

    /// Rule cache settings
    #[serde(default)]
    pub rule_cache: RuleCacheSettings,

    /// Quality-assessment batch settings
    #[serde(default)]
    pub assessment: AssessmentSettings,

    /// Moderation queue settings
    #[serde(default)]
    pub moderation: ModerationSettings,

    /// External collaborator endpoints
    #[serde(default)]
    pub collaborators: CollaboratorSettings,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Validation engine configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ValidationSettings {
    /// Safety matches at or above this severity fail the check
    #[serde(default = "default_severity_threshold")]
    pub severity_threshold: Severity,

    /// Minimum number of words for a passing quality check
    #[serde(default = "default_min_words")]
    pub min_words: usize,

    /// Minimum number of paragraphs for a passing quality check
    #[serde(default = "default_min_paragraphs")]
    pub min_paragraphs: usize,

    /// Longest tolerated run of one repeated character
    #[serde(default = "default_max_repeated_char_run")]
    pub max_repeated_char_run: usize,

    /// Maximum share of all-caps words before flagging
    #[serde(default = "default_max_caps_ratio")]
    pub max_caps_ratio: f64,

    /// Largest accepted text in characters
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    /// Weight of the safety component in the composite score
    #[serde(default = "default_safety_weight")]
    pub safety_weight: f64,

    /// Weight of the quality component in the composite score
    #[serde(default = "default_quality_weight")]
    pub quality_weight: f64,

    /// Weight of the originality component in the composite score
    #[serde(default = "default_originality_weight")]
    pub originality_weight: f64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            severity_threshold: default_severity_threshold(),
            min_words: default_min_words(),
            min_paragraphs: default_min_paragraphs(),
            max_repeated_char_run: default_max_repeated_char_run(),
            max_caps_ratio: default_max_caps_ratio(),
            max_text_chars: default_max_text_chars(),
            safety_weight: default_safety_weight(),
            quality_weight: default_quality_weight(),
            originality_weight: default_originality_weight(),
        }
    }
}

/// Rule cache configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RuleCacheSettings {
    /// Safety-net expiry; explicit invalidation is the primary mechanism
    #[serde(default = "default_rule_cache_ttl_secs")]
    pub ttl_secs: Option<u64>,
}

impl Default for RuleCacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_rule_cache_ttl_secs(),
        }
    }
}

/// Quality-assessment batch processor configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AssessmentSettings {
    /// Jobs claimed per scheduler tick
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Attempts before a job is left for manual triage
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wall-clock budget of one batch invocation
    #[serde(default = "default_time_budget_secs")]
    pub time_budget_secs: u64,

    /// Scheduler tick interval
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Jobs in `processing` longer than this are returned to `pending`
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Immediate re-triggers allowed per tick while backlog remains
    #[serde(default = "default_max_catchup_runs")]
    pub max_catchup_runs: u32,

    /// Shared secret for external triggers (empty disables them)
    #[serde(default = "String::new")]
    pub scheduler_token: String,
}

impl Default for AssessmentSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            time_budget_secs: default_time_budget_secs(),
            interval_secs: default_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
            max_catchup_runs: default_max_catchup_runs(),
            scheduler_token: String::new(),
        }
    }
}

/// Moderation queue configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ModerationSettings {
    /// Require a passing validation newer than the queue entry before approval
    #[serde(default)]
    pub require_fresh_validation: bool,
}

/// External collaborator configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CollaboratorSettings {
    /// Similarity/plagiarism service base URL
    #[serde(default = "String::new")]
    pub similarity_endpoint: String,

    /// Image-analysis service base URL
    #[serde(default = "String::new")]
    pub image_endpoint: String,

    /// API key sent to both services
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CollaboratorSettings {
    fn default() -> Self {
        Self {
            similarity_endpoint: String::new(),
            image_endpoint: String::new(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_severity_threshold() -> Severity {
    Severity::Medium
}

fn default_min_words() -> usize {
    50
}

fn default_min_paragraphs() -> usize {
    1
}

fn default_max_repeated_char_run() -> usize {
    8
}

fn default_max_caps_ratio() -> f64 {
    0.3
}

fn default_max_text_chars() -> usize {
    500_000
}

fn default_safety_weight() -> f64 {
    0.5
}

fn default_quality_weight() -> f64 {
    0.3
}

fn default_originality_weight() -> f64 {
    0.2
}

fn default_rule_cache_ttl_secs() -> Option<u64> {
    Some(300)
}

fn default_batch_size() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_time_budget_secs() -> u64 {
    240 // leaves headroom inside a 5 minute scheduler slot
}

fn default_interval_secs() -> u64 {
    300
}

fn default_stale_after_secs() -> u64 {
    900
}

fn default_max_catchup_runs() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        let v = &self.validation;
        for (name, weight) in [
            ("safety_weight", v.safety_weight),
            ("quality_weight", v.quality_weight),
            ("originality_weight", v.originality_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, weight));
            }
        }
        if v.safety_weight + v.quality_weight + v.originality_weight <= 0.0 {
            return Err(anyhow!("At least one score weight must be positive"));
        }
        if !(0.0..=1.0).contains(&v.max_caps_ratio) {
            return Err(anyhow!("max_caps_ratio must be within [0, 1]"));
        }

        if self.assessment.batch_size == 0 {
            return Err(anyhow!("assessment.batch_size must be at least 1"));
        }
        if self.assessment.max_attempts == 0 {
            return Err(anyhow!("assessment.max_attempts must be at least 1"));
        }
        if self.assessment.interval_secs == 0 {
            return Err(anyhow!("assessment.interval_secs must be at least 1"));
        }
        // A live batch must never look stale to a concurrent reclaim
        if self.assessment.stale_after_secs <= self.assessment.time_budget_secs {
            return Err(anyhow!(
                "assessment.stale_after_secs ({}) must exceed time_budget_secs ({})",
                self.assessment.stale_after_secs,
                self.assessment.time_budget_secs
            ));
        }

        for (name, endpoint) in [
            ("similarity_endpoint", &self.collaborators.similarity_endpoint),
            ("image_endpoint", &self.collaborators.image_endpoint),
        ] {
            if !endpoint.is_empty() {
                Url::parse(endpoint)
                    .with_context(|| format!("Invalid {}: {}", name, endpoint))?;
            }
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: None,
            validation: ValidationSettings::default(),
            rule_cache: RuleCacheSettings::default(),
            assessment: AssessmentSettings::default(),
            moderation: ModerationSettings::default(),
            collaborators: CollaboratorSettings::default(),
            log_level: LogLevel::default(),
        }
    }
}
