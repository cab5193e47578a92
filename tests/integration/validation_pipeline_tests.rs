/*!
 * Integration tests for the validation engine over SQLite-backed rules
 */

use anyhow::Result;

use storyguard::database::models::SubjectRef;
use storyguard::providers::mock::{MockImageChecker, MockSimilarity};
use storyguard::rules::{
    MatchMode, MaturityRating, PlagiarismRuleConfig, QualityRuleConfig, RuleConfig, SafetyRuleConfig,
    Severity, ValidationRule,
};
use storyguard::validation::engine::{
    FLAG_DUPLICATE_CONTENT, FLAG_IMAGE_UNAVAILABLE, FLAG_IMAGE_UNSAFE, FLAG_POSSIBLE_PLAGIARISM,
    FLAG_SIMILARITY_UNAVAILABLE,
};
use storyguard::validation::{ValidationContent, ValidationOptions};
use storyguard::ModerationError;

use crate::common;

#[tokio::test]
async fn test_validate_withHighSeverityPattern_shouldFailWithRuleFlag() -> Result<()> {
    let controller = common::seeded_controller().await?;
    controller
        .rule_admin()
        .create_rule(&common::admin(), ValidationRule::safety("badword-rule", Severity::High, &["badword"]))
        .await?;

    let result = controller
        .engine()
        .validate(&ValidationContent::text("this is badword"), ValidationOptions::safety_only())
        .await?;

    assert!(!result.passed);
    assert!(result.has_flag("badword-rule"));
    assert_eq!(result.suggested_rating(), Some(MaturityRating::R.to_string().as_str()));
    Ok(())
}

#[tokio::test]
async fn test_validate_withLowSeverityPattern_shouldWarnOnly() -> Result<()> {
    let controller = common::seeded_controller().await?;
    controller
        .rule_admin()
        .create_rule(&common::admin(), ValidationRule::safety("mild", Severity::Low, &["darn"]))
        .await?;

    let text = format!("{} darn", common::sample_chapter());
    let result = controller
        .engine()
        .validate(&ValidationContent::text(text), ValidationOptions::default())
        .await?;

    assert!(result.passed);
    assert!(!result.has_flag("mild"));
    assert_eq!(result.details["safety_warnings"][0], "mild");
    Ok(())
}

#[tokio::test]
async fn test_validate_afterRuleDeactivated_shouldPass() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let rule = controller
        .rule_admin()
        .create_rule(&common::admin(), ValidationRule::safety("gore", Severity::Critical, &["entrails"]))
        .await?;
    let content = ValidationContent::text(format!("{} entrails", common::sample_chapter()));

    let before = controller.engine().validate(&content, ValidationOptions::default()).await?;
    assert!(!before.passed);

    controller.rule_admin().set_rule_active(&common::admin(), &rule.id, false).await?;
    let after = controller.engine().validate(&content, ValidationOptions::default()).await?;
    assert!(after.passed, "flags: {:?}", after.flags);
    Ok(())
}

#[tokio::test]
async fn test_validate_afterRuleUpdated_shouldApplyNewPatternsAndSeverity() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let rule = controller
        .rule_admin()
        .create_rule(&common::admin(), ValidationRule::safety("watchlist", Severity::Low, &["alpha"]))
        .await?;
    let content = ValidationContent::text(format!("{} omega", common::sample_chapter()));

    let before = controller.engine().validate(&content, ValidationOptions::default()).await?;
    assert!(before.passed, "flags: {:?}", before.flags);
    assert!(!before.has_flag("watchlist"));

    let replacement = ValidationRule::safety("ignored", Severity::High, &["omega"]).config;
    let updated = controller
        .rule_admin()
        .update_rule(&common::admin(), &rule.id, Severity::High, replacement)
        .await?;
    assert_eq!(updated.name, "watchlist");

    let after = controller.engine().validate(&content, ValidationOptions::default()).await?;
    assert!(!after.passed);
    assert!(after.has_flag("watchlist"));
    Ok(())
}

#[tokio::test]
async fn test_validate_withRegexRuleAndSuggestedRating_shouldUseRuleRating() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let rule = ValidationRule::new(
        "violence",
        Severity::Medium,
        RuleConfig::Safety(SafetyRuleConfig {
            patterns: vec![r"\bstab(bed|bing)?\b".to_string()],
            match_mode: MatchMode::Regex,
            suggested_rating: Some(MaturityRating::NC17),
        }),
    );
    controller.rule_admin().create_rule(&common::admin(), rule).await?;

    let result = controller
        .engine()
        .validate(&ValidationContent::text("He was STABBED twice."), ValidationOptions::safety_only())
        .await?;

    assert!(result.has_flag("violence"));
    assert_eq!(result.suggested_rating(), Some("NC-17"));
    Ok(())
}

#[tokio::test]
async fn test_validate_withQualityRule_shouldTightenThresholds() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let content = ValidationContent::text(common::sample_chapter());
    assert!(controller.engine().validate(&content, ValidationOptions::default()).await?.passed);

    let rule = ValidationRule::new(
        "long-chapters",
        Severity::Medium,
        RuleConfig::Quality(QualityRuleConfig {
            min_words: Some(1000),
            ..Default::default()
        }),
    );
    controller.rule_admin().create_rule(&common::admin(), rule).await?;

    let result = controller.engine().validate(&content, ValidationOptions::default()).await?;
    assert!(!result.passed);
    assert!(result.has_flag("too_short"));
    Ok(())
}

#[tokio::test]
async fn test_validate_firstChapterDuplicate_shouldFail() -> Result<()> {
    let similarity = MockSimilarity::duplicate();
    let controller = common::controller_with(similarity.clone(), MockImageChecker::safe())?;

    let content = ValidationContent::text(common::sample_chapter());
    let result = controller
        .engine()
        .validate(&content, ValidationOptions::default().first_chapter())
        .await?;

    assert!(!result.passed);
    assert!(result.has_flag(FLAG_DUPLICATE_CONTENT));
    assert_eq!(similarity.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_validate_laterChapter_shouldSkipSimilarityService() -> Result<()> {
    let similarity = MockSimilarity::duplicate();
    let controller = common::controller_with(similarity.clone(), MockImageChecker::safe())?;

    let result = controller
        .engine()
        .validate(&ValidationContent::text(common::sample_chapter()), ValidationOptions::default())
        .await?;

    assert!(result.passed);
    assert_eq!(result.details["originality_skipped"], true);
    assert_eq!(similarity.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_validate_plagiarismThresholdFromRule_shouldApply() -> Result<()> {
    let controller = common::controller_with(MockSimilarity::similar(0.6), MockImageChecker::safe())?;
    let content = ValidationContent::text(common::sample_chapter());
    let options = ValidationOptions::default().first_chapter();

    assert!(controller.engine().validate(&content, options).await?.passed);

    let rule = ValidationRule::new(
        "strict-originality",
        Severity::High,
        RuleConfig::Plagiarism(PlagiarismRuleConfig {
            similarity_threshold: 0.5,
        }),
    );
    controller.rule_admin().create_rule(&common::admin(), rule).await?;

    let result = controller.engine().validate(&content, options).await?;
    assert!(!result.passed);
    assert!(result.has_flag(FLAG_POSSIBLE_PLAGIARISM));
    Ok(())
}

#[tokio::test]
async fn test_validate_withUnreachableCollaborators_shouldDegradeToFlags() -> Result<()> {
    let controller = common::controller_with(MockSimilarity::failing(), MockImageChecker::failing())?;
    let content = ValidationContent::text(common::sample_chapter()).with_image("https://cdn.example/cover.png");

    let result = controller
        .engine()
        .validate(&content, ValidationOptions::default().first_chapter())
        .await?;

    assert!(result.passed);
    assert!(result.has_flag(FLAG_SIMILARITY_UNAVAILABLE));
    assert!(result.has_flag(FLAG_IMAGE_UNAVAILABLE));
    Ok(())
}

#[tokio::test]
async fn test_validate_withUnsafeImage_shouldFail() -> Result<()> {
    let controller = common::controller_with(MockSimilarity::clean(), MockImageChecker::unsafe_image())?;
    let content = ValidationContent::text(common::sample_chapter()).with_image("https://cdn.example/cover.png");

    let result = controller.engine().validate(&content, ValidationOptions::default()).await?;
    assert!(!result.passed);
    assert!(result.has_flag(FLAG_IMAGE_UNSAFE));
    Ok(())
}

#[tokio::test]
async fn test_validate_withTarget_shouldRecordUnlessDryRun() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let subject = SubjectRef::Section("s1".to_string());
    let content = ValidationContent::text(common::sample_chapter()).for_subject(subject.clone());

    let dry = controller
        .engine()
        .validate(&content, ValidationOptions::default().dry_run())
        .await?;
    assert!(dry.result_id.is_none());
    assert!(controller.engine().results_for(&subject).await?.is_empty());

    let recorded = controller.engine().validate(&content, ValidationOptions::default()).await?;
    assert!(recorded.result_id.is_some());

    let history = controller.engine().results_for(&subject).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].passed, recorded.passed);
    assert_eq!(history[0].flags, recorded.flags);
    Ok(())
}

#[tokio::test]
async fn test_validate_withEmptyContent_shouldBeValidationError() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let result = controller
        .engine()
        .validate(&ValidationContent::text("   "), ValidationOptions::default())
        .await;
    assert!(matches!(result, Err(ModerationError::Validation(_))));
    Ok(())
}

#[tokio::test]
async fn test_validate_score_shouldStayWithinUnitRange() -> Result<()> {
    let controller = common::controller_with(MockSimilarity::similar(0.3), MockImageChecker::safe())?;
    controller
        .rule_admin()
        .create_rule(&common::admin(), ValidationRule::safety("x", Severity::Critical, &["lantern"]))
        .await?;

    let result = controller
        .engine()
        .validate(
            &ValidationContent::text(common::sample_chapter()).with_image("https://cdn.example/a.png"),
            ValidationOptions::default().first_chapter(),
        )
        .await?;
    assert!((0.0..=1.0).contains(&result.score));
    assert!(!result.passed);
    Ok(())
}
