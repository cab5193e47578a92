/*!
 * Validation engine.
 *
 * Evaluates one piece of content against the active rules and the
 * external collaborators and produces a structured verdict:
 * - Safety: active safety rules from the rule cache
 * - Quality: heuristics, tightened by active quality rules
 * - Originality: similarity collaborator, first chapters only
 * - Image: image-analysis collaborator, soft failure when unreachable
 *
 * `passed` is the conjunction of the requested checks and `score` is the
 * weighted mean of the component scores that could be computed.
 */

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::app_config::ValidationSettings;
use crate::database::models::{now_timestamp, SubjectRef, ValidationResultRecord};
use crate::database::Repository;
use crate::errors::{CollaboratorError, ModerationError, ModerationResult};
use crate::providers::{ImageSafetyChecker, ImageSafetyReport, SimilarityChecker, SimilarityReport};
use crate::rules::{PlagiarismRuleConfig, RuleCache, RuleConfig, RuleSnapshot, RuleType};

use super::quality::{self, QualityThresholds};
use super::safety;

pub const FLAG_DUPLICATE_CONTENT: &str = "duplicate_content";
pub const FLAG_POSSIBLE_PLAGIARISM: &str = "possible_plagiarism";
pub const FLAG_SIMILARITY_UNAVAILABLE: &str = "similarity_check_unavailable";
pub const FLAG_IMAGE_UNSAFE: &str = "image_unsafe";
pub const FLAG_IMAGE_UNAVAILABLE: &str = "image_check_unavailable";

/// Content submitted for validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationContent {
    pub text: Option<String>,
    pub image_url: Option<String>,
    /// Work or section the verdict is recorded against
    pub target: Option<SubjectRef>,
}

impl ValidationContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn for_subject(mut self, subject: SubjectRef) -> Self {
        self.target = Some(subject);
        self
    }

    fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

/// Which checks to run and whether to record the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOptions {
    pub check_safety: bool,
    pub check_quality: bool,
    pub check_plagiarism: bool,
    pub check_duplicates: bool,
    /// Originality checks only run for a work's first chapter
    pub is_first_chapter: bool,
    /// Dry run: no database side effect at all
    pub skip_persistence: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            check_safety: true,
            check_quality: true,
            check_plagiarism: true,
            check_duplicates: true,
            is_first_chapter: false,
            skip_persistence: false,
        }
    }
}

impl ValidationOptions {
    /// Only the safety check
    pub fn safety_only() -> Self {
        Self {
            check_safety: true,
            check_quality: false,
            check_plagiarism: false,
            check_duplicates: false,
            is_first_chapter: false,
            skip_persistence: false,
        }
    }

    pub fn first_chapter(mut self) -> Self {
        self.is_first_chapter = true;
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.skip_persistence = true;
        self
    }
}

/// Verdict of one validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    /// Weighted composite in [0, 1]
    pub score: f64,
    /// Ordered, without duplicates
    pub flags: Vec<String>,
    pub details: Value,
    pub created_at: String,
    /// Row id when the verdict was persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_id: Option<i64>,
}

impl ValidationResult {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    /// Suggested maturity rating, if any safety rule matched
    pub fn suggested_rating(&self) -> Option<&str> {
        self.details.get("suggested_rating").and_then(Value::as_str)
    }

    /// Storage form of this verdict for a subject
    pub fn to_record(&self, subject: SubjectRef) -> ValidationResultRecord {
        ValidationResultRecord {
            id: self.result_id.unwrap_or_default(),
            subject,
            passed: self.passed,
            score: self.score,
            flags: self.flags.clone(),
            details: self.details.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

/// Accumulates sub-check outcomes
struct Verdict {
    passed: bool,
    flags: Vec<String>,
    details: Map<String, Value>,
    weighted: f64,
    weights: f64,
}

impl Verdict {
    fn new() -> Self {
        Self {
            passed: true,
            flags: Vec::new(),
            details: Map::new(),
            weighted: 0.0,
            weights: 0.0,
        }
    }

    fn flag(&mut self, flag: &str) {
        if !self.flags.iter().any(|f| f == flag) {
            self.flags.push(flag.to_string());
        }
    }

    fn fail(&mut self, flag: &str) {
        self.passed = false;
        self.flag(flag);
    }

    fn component(&mut self, weight: f64, score: f64) {
        self.weighted += weight * score;
        self.weights += weight;
    }

    fn detail(&mut self, key: &str, value: Value) {
        self.details.insert(key.to_string(), value);
    }

    fn score(&self) -> f64 {
        if self.weights > 0.0 {
            f64::clamp(self.weighted / self.weights, 0.0, 1.0)
        } else if self.passed {
            1.0
        } else {
            0.0
        }
    }
}

/// Content validation engine
pub struct ValidationEngine {
    cache: Arc<RuleCache>,
    similarity: Arc<dyn SimilarityChecker>,
    image: Arc<dyn ImageSafetyChecker>,
    repo: Repository,
    settings: ValidationSettings,
}

impl ValidationEngine {
    pub fn new(
        cache: Arc<RuleCache>,
        similarity: Arc<dyn SimilarityChecker>,
        image: Arc<dyn ImageSafetyChecker>,
        repo: Repository,
        settings: ValidationSettings,
    ) -> Self {
        Self {
            cache,
            similarity,
            image,
            repo,
            settings,
        }
    }

    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    /// Validate content and, unless it is a dry run, record the verdict
    pub async fn validate(
        &self,
        content: &ValidationContent,
        options: ValidationOptions,
    ) -> ModerationResult<ValidationResult> {
        if !content.has_text() && content.image_url.is_none() {
            return Err(ModerationError::Validation(
                "content must include text or an image".to_string(),
            ));
        }
        if let Some(text) = &content.text {
            let chars = text.chars().count();
            if chars > self.settings.max_text_chars {
                return Err(ModerationError::Validation(format!(
                    "text is {} characters, the limit is {}",
                    chars, self.settings.max_text_chars
                )));
            }
        }

        let snapshot = self.cache.snapshot().await?;
        let mut verdict = Verdict::new();
        verdict.detail("rule_generation", json!(snapshot.generation()));

        let text = content.text.as_deref().filter(|t| !t.trim().is_empty());
        let wants_originality = options.check_plagiarism || options.check_duplicates;
        let originality_text = text.filter(|_| wants_originality && options.is_first_chapter);

        // Both collaborators are remote; query them side by side
        let (similarity, image) = futures::join!(
            async {
                match originality_text {
                    Some(t) => Some(self.similarity.check_similarity(t).await),
                    None => None,
                }
            },
            async {
                match content.image_url.as_deref() {
                    Some(url) => Some(self.image.check_image_safety(url).await),
                    None => None,
                }
            }
        );

        if let Some(text) = text {
            if options.check_safety {
                self.check_safety(&snapshot, text, &mut verdict);
            }
            if options.check_quality {
                self.check_quality(&snapshot, text, &mut verdict);
            }
            match similarity {
                Some(response) => self.apply_originality(&snapshot, response, options, &mut verdict),
                None if wants_originality => verdict.detail("originality_skipped", json!(true)),
                None => {}
            }
        }

        if let (Some(url), Some(response)) = (content.image_url.as_deref(), image) {
            self.apply_image(url, response, &mut verdict);
        }

        let result = ValidationResult {
            passed: verdict.passed,
            score: verdict.score(),
            flags: verdict.flags,
            details: Value::Object(verdict.details),
            created_at: now_timestamp(),
            result_id: None,
        };

        self.record(content, options, result).await
    }

    /// Persisted verdicts of a subject, newest first
    pub async fn results_for(&self, subject: &SubjectRef) -> ModerationResult<Vec<ValidationResultRecord>> {
        Ok(self.repo.get_validation_results(subject).await?)
    }

    fn check_safety(&self, snapshot: &RuleSnapshot, text: &str, verdict: &mut Verdict) {
        let outcome = safety::scan(
            snapshot.of_type(RuleType::Safety),
            text,
            self.settings.severity_threshold,
        );

        for rule in outcome.blocking_rules() {
            verdict.fail(rule);
        }
        let warnings: Vec<&str> = outcome.warnings().collect();
        if !warnings.is_empty() {
            verdict.detail("safety_warnings", json!(warnings));
        }
        if let Some(rating) = outcome.suggested_rating() {
            verdict.detail("suggested_rating", json!(rating.to_string()));
        }
        verdict.detail("safety_score", json!(outcome.score));
        verdict.component(self.settings.safety_weight, outcome.score);
    }

    fn check_quality(&self, snapshot: &RuleSnapshot, text: &str, verdict: &mut Verdict) {
        let thresholds = snapshot
            .of_type(RuleType::Quality)
            .fold(QualityThresholds::from_settings(&self.settings), |t, rule| {
                match &rule.rule.config {
                    RuleConfig::Quality(config) => t.tighten(config),
                    _ => t,
                }
            });

        let report = quality::assess(text, &thresholds);
        let passed = report.passed();
        for flag in &report.flags {
            verdict.flag(flag);
        }
        if !passed {
            verdict.passed = false;
        }

        verdict.detail("quality_score", json!(report.score));
        verdict.detail("word_count", json!(report.word_count));
        verdict.detail("paragraph_count", json!(report.paragraph_count));
        verdict.component(self.settings.quality_weight, report.score);
    }

    fn apply_originality(
        &self,
        snapshot: &RuleSnapshot,
        response: Result<SimilarityReport, CollaboratorError>,
        options: ValidationOptions,
        verdict: &mut Verdict,
    ) {
        // The strictest active plagiarism rule wins
        let threshold = snapshot
            .of_type(RuleType::Plagiarism)
            .filter_map(|rule| match &rule.rule.config {
                RuleConfig::Plagiarism(config) => Some(config.similarity_threshold),
                _ => None,
            })
            .reduce(f64::min)
            .unwrap_or_else(|| PlagiarismRuleConfig::default().similarity_threshold);

        match response {
            Ok(report) => {
                let max_similarity = report.max_similarity();
                debug!(
                    "Similarity check: duplicate={} max={:.3} threshold={:.3}",
                    report.is_duplicate, max_similarity, threshold
                );
                if options.check_duplicates && report.is_duplicate {
                    verdict.fail(FLAG_DUPLICATE_CONTENT);
                }
                if options.check_plagiarism && max_similarity >= threshold {
                    verdict.fail(FLAG_POSSIBLE_PLAGIARISM);
                }
                let originality = if report.is_duplicate { 0.0 } else { 1.0 - max_similarity };
                verdict.detail("max_similarity", json!(max_similarity));
                verdict.component(self.settings.originality_weight, originality.clamp(0.0, 1.0));
            }
            Err(e) => {
                warn!("Similarity check unavailable: {}", e);
                verdict.flag(FLAG_SIMILARITY_UNAVAILABLE);
                verdict.detail("similarity_error", json!(e.to_string()));
            }
        }
    }

    fn apply_image(
        &self,
        url: &str,
        response: Result<ImageSafetyReport, CollaboratorError>,
        verdict: &mut Verdict,
    ) {
        match response {
            Ok(report) => {
                if !report.passed {
                    verdict.fail(FLAG_IMAGE_UNSAFE);
                }
                verdict.detail("image_score", json!(report.score));
                if !report.flags.is_empty() {
                    verdict.detail("image_flags", json!(report.flags));
                }
                verdict.component(self.settings.safety_weight, report.score.clamp(0.0, 1.0));
            }
            Err(e) => {
                warn!("Image safety check unavailable for {}: {}", url, e);
                verdict.flag(FLAG_IMAGE_UNAVAILABLE);
                verdict.detail("image_error", json!(e.to_string()));
            }
        }
    }

    async fn record(
        &self,
        content: &ValidationContent,
        options: ValidationOptions,
        mut result: ValidationResult,
    ) -> ModerationResult<ValidationResult> {
        let target = match (&content.target, options.skip_persistence) {
            (Some(target), false) => target,
            _ => {
                debug!(
                    "Validation (not recorded): passed={} score={:.3} flags={:?}",
                    result.passed, result.score, result.flags
                );
                return Ok(result);
            }
        };

        let id = self
            .repo
            .insert_validation_result(&result.to_record(target.clone()))
            .await?;
        result.result_id = Some(id);

        info!(
            "Validated {}: passed={} score={:.3} flags={:?}",
            target, result.passed, result.score, result.flags
        );
        Ok(result)
    }
}
