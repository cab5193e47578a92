/*!
 * Validation rule model.
 *
 * A rule's JSON parameters are parsed into a typed `RuleConfig` variant
 * when the rule is read from the store, and safety patterns are compiled
 * into case-insensitive regexes when the cache builds a snapshot.
 */

use anyhow::{anyhow, Context, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rule category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Safety,
    Quality,
    Plagiarism,
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleType::Safety => write!(f, "safety"),
            RuleType::Quality => write!(f, "quality"),
            RuleType::Plagiarism => write!(f, "plagiarism"),
        }
    }
}

impl std::str::FromStr for RuleType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "safety" => Ok(RuleType::Safety),
            "quality" => Ok(RuleType::Quality),
            "plagiarism" => Ok(RuleType::Plagiarism),
            _ => Err(anyhow!("Invalid rule type: {}", s)),
        }
    }
}

/// Rule severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Rating suggested for a matched safety rule without an explicit one
    pub fn default_rating(&self) -> MaturityRating {
        match self {
            Severity::Low => MaturityRating::PG,
            Severity::Medium => MaturityRating::PG13,
            Severity::High => MaturityRating::R,
            Severity::Critical => MaturityRating::NC17,
        }
    }

    /// Penalty applied to the safety score for a match of this severity
    pub fn penalty(&self) -> f64 {
        match self {
            Severity::Low => 0.1,
            Severity::Medium => 0.35,
            Severity::High => 0.7,
            Severity::Critical => 1.0,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(anyhow!("Invalid severity: {}", s)),
        }
    }
}

/// Audience maturity rating, ordered from most to least permissive audience
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MaturityRating {
    G,
    PG,
    PG13,
    R,
    NC17,
}

impl fmt::Display for MaturityRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaturityRating::G => write!(f, "G"),
            MaturityRating::PG => write!(f, "PG"),
            MaturityRating::PG13 => write!(f, "PG-13"),
            MaturityRating::R => write!(f, "R"),
            MaturityRating::NC17 => write!(f, "NC-17"),
        }
    }
}

/// How safety patterns are matched against text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Case-insensitive substring
    #[default]
    Substring,
    /// Case-insensitive regular expression
    Regex,
}

/// Parameters of a safety rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyRuleConfig {
    /// Patterns that trigger the rule
    pub patterns: Vec<String>,
    #[serde(default)]
    pub match_mode: MatchMode,
    /// Overrides the severity-derived rating suggestion
    #[serde(default)]
    pub suggested_rating: Option<MaturityRating>,
}

/// Parameters of a quality rule; unset fields keep the configured defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QualityRuleConfig {
    #[serde(default)]
    pub min_words: Option<usize>,
    #[serde(default)]
    pub min_paragraphs: Option<usize>,
    #[serde(default)]
    pub max_repeated_char_run: Option<usize>,
}

/// Parameters of a plagiarism rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlagiarismRuleConfig {
    /// Similarity at or above which a corpus match counts
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

fn default_similarity_threshold() -> f64 {
    0.8
}

impl Default for PlagiarismRuleConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Typed rule parameters, keyed by rule type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleConfig {
    Safety(SafetyRuleConfig),
    Quality(QualityRuleConfig),
    Plagiarism(PlagiarismRuleConfig),
}

impl RuleConfig {
    /// Parse the stored parameter JSON of a rule of the given type
    pub fn parse(rule_type: RuleType, params: &str) -> Result<Self> {
        let params = if params.trim().is_empty() { "{}" } else { params };
        let config = match rule_type {
            RuleType::Safety => RuleConfig::Safety(
                serde_json::from_str(params).context("Invalid safety rule config")?,
            ),
            RuleType::Quality => RuleConfig::Quality(
                serde_json::from_str(params).context("Invalid quality rule config")?,
            ),
            RuleType::Plagiarism => RuleConfig::Plagiarism(
                serde_json::from_str(params).context("Invalid plagiarism rule config")?,
            ),
        };
        Ok(config)
    }

    pub fn rule_type(&self) -> RuleType {
        match self {
            RuleConfig::Safety(_) => RuleType::Safety,
            RuleConfig::Quality(_) => RuleType::Quality,
            RuleConfig::Plagiarism(_) => RuleType::Plagiarism,
        }
    }

    /// Parameter JSON without the type tag, as stored in the rule table
    pub fn params_json(&self) -> Result<String> {
        let json = match self {
            RuleConfig::Safety(c) => serde_json::to_string(c)?,
            RuleConfig::Quality(c) => serde_json::to_string(c)?,
            RuleConfig::Plagiarism(c) => serde_json::to_string(c)?,
        };
        Ok(json)
    }

    /// Check the parameters are usable
    pub fn check(&self) -> Result<()> {
        match self {
            RuleConfig::Safety(c) => {
                if c.patterns.iter().all(|p| p.trim().is_empty()) {
                    return Err(anyhow!("Safety rule needs at least one pattern"));
                }
                compile_patterns(c).map(|_| ())
            }
            RuleConfig::Quality(_) => Ok(()),
            RuleConfig::Plagiarism(c) => {
                if !(0.0..=1.0).contains(&c.similarity_threshold) {
                    return Err(anyhow!(
                        "similarity_threshold must be within [0, 1], got {}",
                        c.similarity_threshold
                    ));
                }
                Ok(())
            }
        }
    }
}

/// A named, persisted validation rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub id: String,
    /// Unique rule name, also used as the flag emitted on a match
    pub name: String,
    pub is_active: bool,
    pub severity: Severity,
    pub config: RuleConfig,
}

impl ValidationRule {
    /// Create an active rule with a fresh id
    pub fn new(name: impl Into<String>, severity: Severity, config: RuleConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            is_active: true,
            severity,
            config,
        }
    }

    /// Convenience constructor for substring safety rules
    pub fn safety(name: impl Into<String>, severity: Severity, patterns: &[&str]) -> Self {
        Self::new(
            name,
            severity,
            RuleConfig::Safety(SafetyRuleConfig {
                patterns: patterns.iter().map(|p| p.to_string()).collect(),
                match_mode: MatchMode::Substring,
                suggested_rating: None,
            }),
        )
    }

    pub fn rule_type(&self) -> RuleType {
        self.config.rule_type()
    }
}

/// A rule ready for evaluation
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: ValidationRule,
    /// Case-insensitive matchers (safety rules only)
    matchers: Vec<Regex>,
}

impl CompiledRule {
    pub fn compile(rule: ValidationRule) -> Result<Self> {
        let matchers = match &rule.config {
            RuleConfig::Safety(c) => compile_patterns(c)
                .with_context(|| format!("Rule '{}' has an invalid pattern", rule.name))?,
            _ => Vec::new(),
        };
        Ok(Self { rule, matchers })
    }

    /// First pattern of this rule found in the text
    pub fn first_match<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.matchers
            .iter()
            .find_map(|m| m.find(text).map(|found| found.as_str()))
    }

    /// Rating this rule suggests when it matches
    pub fn suggested_rating(&self) -> MaturityRating {
        match &self.rule.config {
            RuleConfig::Safety(c) => c
                .suggested_rating
                .unwrap_or_else(|| self.rule.severity.default_rating()),
            _ => self.rule.severity.default_rating(),
        }
    }
}

fn compile_patterns(config: &SafetyRuleConfig) -> Result<Vec<Regex>> {
    config
        .patterns
        .iter()
        .filter(|p| !p.trim().is_empty())
        .map(|p| {
            let source = match config.match_mode {
                MatchMode::Substring => regex::escape(p),
                MatchMode::Regex => p.clone(),
            };
            RegexBuilder::new(&source)
                .case_insensitive(true)
                .build()
                .map_err(|e| anyhow!("Invalid pattern '{}': {}", p, e))
        })
        .collect()
}
