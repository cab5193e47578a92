/*!
 * Tests for the rule cache over the SQLite rule store
 */

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use storyguard::database::Repository;
use storyguard::rules::{RuleAdmin, RuleCache, RuleStore, RuleType, Severity, ValidationRule};

use crate::common;

fn cache_over(repo: &Repository, ttl: Option<Duration>) -> Arc<RuleCache> {
    let store: Arc<dyn RuleStore> = Arc::new(repo.clone());
    Arc::new(RuleCache::with_ttl(store, ttl))
}

#[tokio::test]
async fn test_adminChange_shouldBeVisibleOnNextRead() -> Result<()> {
    let repo = Repository::new_in_memory()?;
    let cache = cache_over(&repo, None);
    let admin = RuleAdmin::new(cache.clone());

    assert!(cache.get_active_rules(None).await?.is_empty());

    let rule = admin
        .create_rule(&common::admin(), ValidationRule::safety("gore", Severity::High, &["gore"]))
        .await?;
    assert_eq!(cache.get_active_rules(Some(RuleType::Safety)).await?.len(), 1);

    admin.delete_rule(&common::admin(), &rule.id).await?;
    assert!(cache.get_active_rules(None).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_otherProcessWrite_shouldStayStaleUntilInvalidated() -> Result<()> {
    let repo = Repository::new_in_memory()?;
    let ours = cache_over(&repo, None);
    let theirs = RuleAdmin::new(cache_over(&repo, None));

    assert!(ours.get_active_rules(None).await?.is_empty());
    theirs
        .create_rule(&common::admin(), ValidationRule::safety("slur", Severity::Critical, &["x"]))
        .await?;

    // Only the writer's cache was invalidated
    assert!(ours.get_active_rules(None).await?.is_empty());

    ours.invalidate();
    assert_eq!(ours.get_active_rules(None).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_invalidate_shouldBumpGeneration() -> Result<()> {
    let repo = Repository::new_in_memory()?;
    let cache = cache_over(&repo, None);

    let first = cache.snapshot().await?.generation();
    cache.invalidate();
    let second = cache.snapshot().await?.generation();
    assert!(second > first);
    Ok(())
}

#[tokio::test]
async fn test_stats_shouldCountHitsAndReloads() -> Result<()> {
    let repo = Repository::new_in_memory()?;
    let cache = cache_over(&repo, None);

    cache.snapshot().await?;
    cache.snapshot().await?;
    cache.snapshot().await?;

    let stats = cache.stats();
    assert_eq!(stats.reloads, 1);
    assert_eq!(stats.hits, 2);
    Ok(())
}

#[tokio::test]
async fn test_concurrentReadersDuringInvalidation_shouldSeeWholeRuleSets() -> Result<()> {
    let repo = Repository::new_in_memory()?;
    let cache = cache_over(&repo, None);
    let admin = RuleAdmin::new(cache.clone());
    for i in 0..5 {
        admin
            .create_rule(
                &common::admin(),
                ValidationRule::safety(format!("rule-{}", i), Severity::Medium, &["x"]),
            )
            .await?;
    }

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            let mut sizes = Vec::new();
            for _ in 0..20 {
                sizes.push(cache.snapshot().await.map(|s| s.len()).unwrap_or(0));
                tokio::task::yield_now().await;
            }
            sizes
        }));
    }
    for _ in 0..10 {
        cache.invalidate();
        tokio::task::yield_now().await;
    }

    for handle in handles {
        for size in handle.await? {
            assert_eq!(size, 5);
        }
    }
    Ok(())
}
