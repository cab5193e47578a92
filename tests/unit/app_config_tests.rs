/*!
 * Tests for configuration loading and validation
 */

use anyhow::Result;
use storyguard::app_config::{Config, LogLevel};
use storyguard::rules::Severity;

use crate::common;

#[test]
fn test_loadOrDefault_withMissingFile_shouldUseDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let config = Config::load_or_default(temp_dir.path().join("missing.json"))?;

    assert!(config.database_path.is_none());
    assert_eq!(config.assessment.batch_size, 10);
    assert_eq!(config.log_level, LogLevel::Info);
    assert!(!config.moderation.require_fresh_validation);
    Ok(())
}

#[test]
fn test_fromFile_withPartialConfig_shouldMergeDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "conf.json",
        r#"{
            "database_path": "/tmp/storyguard-test.db",
            "validation": { "severity_threshold": "critical", "min_words": 10 },
            "moderation": { "require_fresh_validation": true },
            "log_level": "debug"
        }"#,
    )?;

    let config = Config::from_file(&path)?;
    assert_eq!(config.database_path.as_deref(), Some("/tmp/storyguard-test.db"));
    assert_eq!(config.validation.severity_threshold, Severity::Critical);
    assert_eq!(config.validation.min_words, 10);
    assert_eq!(config.validation.min_paragraphs, 1);
    assert!(config.moderation.require_fresh_validation);
    assert_eq!(config.log_level.to_level_filter(), log::LevelFilter::Debug);
    Ok(())
}

#[test]
fn test_fromFile_withInvalidWeights_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "conf.json",
        r#"{ "validation": { "safety_weight": 0.0, "quality_weight": 0.0, "originality_weight": 0.0 } }"#,
    )?;

    assert!(Config::from_file(&path).is_err());
    Ok(())
}

#[test]
fn test_fromFile_withMalformedJson_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(temp_dir.path(), "conf.json", "{ not json")?;

    let error = Config::from_file(&path).unwrap_err();
    assert!(error.to_string().contains("Failed to parse config file"));
    Ok(())
}

#[test]
fn test_config_roundTripThroughJson_shouldKeepValues() -> Result<()> {
    let mut config = Config::default();
    config.assessment.scheduler_token = "secret".to_string();
    config.rule_cache.ttl_secs = None;

    let json = serde_json::to_string_pretty(&config)?;
    let parsed: Config = serde_json::from_str(&json)?;
    assert_eq!(parsed.assessment.scheduler_token, "secret");
    assert_eq!(parsed.rule_cache.ttl_secs, None);
    Ok(())
}
