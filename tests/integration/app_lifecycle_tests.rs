/*!
 * End-to-end tests for controller setup, rule import and operator stats
 */

use anyhow::Result;

use storyguard::app_config::Config;
use storyguard::database::models::{Priority, SubjectRef};
use storyguard::rules::{ImportSummary, RuleDefinition};
use storyguard::Controller;

use crate::common;

const RULES_JSON: &str = r#"[
    {
        "name": "profanity",
        "severity": "high",
        "config": { "type": "safety", "patterns": ["frak"] }
    },
    {
        "name": "short-chapters",
        "severity": "medium",
        "is_active": false,
        "config": { "type": "quality", "min_words": 5000 }
    }
]"#;

fn read_definitions(path: &std::path::Path) -> Result<Vec<RuleDefinition>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[tokio::test]
async fn test_withConfig_fileDatabase_shouldPersistAcrossControllers() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let mut config = Config::default();
    config.database_path = Some(temp_dir.path().join("storyguard.db").to_string_lossy().to_string());

    {
        let controller = Controller::with_config(config.clone())?;
        common::seed_work(controller.repository(), false).await?;
        controller
            .queue()
            .enqueue_for_moderation(SubjectRef::Section("s1".to_string()), Priority::Normal)
            .await?;
    }

    let reopened = Controller::with_config(config)?;
    let queued = reopened.queue().list_queued(&common::moderator(), 10).await?;
    assert_eq!(queued.len(), 1);
    assert!(reopened.repository().connection().path().ends_with("storyguard.db"));
    Ok(())
}

#[tokio::test]
async fn test_importRulesFromFile_shouldApplyToDryRun() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let file = common::create_test_file(temp_dir.path(), "rules.json", RULES_JSON)?;
    let controller = Controller::new_for_test()?;

    let summary = controller
        .rule_admin()
        .import_rules(&common::admin(), read_definitions(&file)?)
        .await?;
    assert_eq!(summary, ImportSummary { created: 2, updated: 0 });

    let flagged = controller
        .dry_run(&format!("{} frak", common::sample_chapter()), None, false)
        .await?;
    assert!(!flagged.passed);
    assert!(flagged.has_flag("profanity"));

    // Inactive quality rule leaves the chapter passing
    let clean = controller.dry_run(&common::sample_chapter(), None, false).await?;
    assert!(clean.passed, "flags: {:?}", clean.flags);
    Ok(())
}

#[tokio::test]
async fn test_importRules_twice_shouldUpdateByName() -> Result<()> {
    let controller = Controller::new_for_test()?;
    let definitions: Vec<RuleDefinition> = serde_json::from_str(RULES_JSON)?;

    controller
        .rule_admin()
        .import_rules(&common::admin(), definitions.clone())
        .await?;
    let summary = controller
        .rule_admin()
        .import_rules(&common::admin(), definitions)
        .await?;

    assert_eq!(summary, ImportSummary { created: 0, updated: 2 });
    assert_eq!(controller.rule_admin().list_rules(&common::admin()).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_importRules_byModerator_shouldBeRejected() -> Result<()> {
    let controller = Controller::new_for_test()?;
    let definitions: Vec<RuleDefinition> = serde_json::from_str(RULES_JSON)?;

    let result = controller
        .rule_admin()
        .import_rules(&common::moderator(), definitions)
        .await;
    assert!(result.is_err());
    assert!(controller.rule_admin().list_rules(&common::admin()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_stats_shouldReflectQueueAndJobs() -> Result<()> {
    let controller = common::seeded_controller().await?;
    controller
        .queue()
        .enqueue_for_moderation(SubjectRef::Section("s1".to_string()), Priority::Urgent)
        .await?;
    controller
        .processor()
        .enqueue_assessment(storyguard::database::models::AssessmentJobRecord::new(
            None,
            Some(common::sample_chapter()),
            None,
        ))
        .await?;

    let stats = controller.stats(&common::moderator()).await?;
    assert_eq!(stats.queue.queued, 1);
    assert_eq!(stats.jobs.pending, 1);
    assert_eq!(stats.database.queued_entries, 1);

    let rendered = stats.to_string();
    assert!(rendered.contains("Queue: 1 queued"));
    assert!(rendered.contains("Jobs: 1 pending"));
    Ok(())
}

#[test]
fn test_newForTest_shouldStartWithEmptyQueueAndRules() {
    let result = tokio_test::block_on(async {
        let controller = Controller::new_for_test()?;
        let rules = controller.rule_admin().list_rules(&common::admin()).await?;
        let queued = controller.queue().list_queued(&common::moderator(), 10).await?;
        anyhow::Ok((rules.len(), queued.len()))
    });
    assert_eq!(result.unwrap(), (0, 0));
}

#[test]
fn test_withConfig_invalidEndpoint_shouldFail() {
    let mut config = Config::default();
    config.collaborators.similarity_endpoint = "not a url".to_string();
    assert!(Controller::with_config(config).is_err());
}

#[test]
fn test_loadOrDefault_missingFile_shouldUseDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let config = Config::load_or_default(temp_dir.path().join("absent.json"))?;
    assert_eq!(config.assessment.batch_size, Config::default().assessment.batch_size);
    Ok(())
}
