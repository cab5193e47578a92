/*!
 * Integration tests for the moderation queue workflow
 */

use anyhow::Result;
use chrono::{TimeZone, Utc};

use storyguard::app_config::Config;
use storyguard::database::models::{Priority, PublishStatus, QueueEntryRecord, QueueStatus, SubjectRef};
use storyguard::database::Repository;
use storyguard::moderation::ReviewAction;
use storyguard::providers::Unconfigured;
use storyguard::validation::{ValidationContent, ValidationOptions};
use storyguard::{Controller, ModerationError};
use std::sync::Arc;

use crate::common;

fn section(id: &str) -> SubjectRef {
    SubjectRef::Section(id.to_string())
}

#[tokio::test]
async fn test_listQueued_urgentCreatedLater_shouldPrecedeHigh() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let repo = controller.repository();
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
    let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

    let high = QueueEntryRecord::created_at(section("s1"), Priority::High, t0);
    let urgent = QueueEntryRecord::created_at(section("s2"), Priority::Urgent, t1);
    repo.enqueue_entry(&high).await?;
    repo.enqueue_entry(&urgent).await?;

    let listed = controller.queue().list_queued(&common::moderator(), 10).await?;
    let ids: Vec<&str> = listed.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![urgent.id.as_str(), high.id.as_str()]);
    Ok(())
}

#[tokio::test]
async fn test_listQueued_samePriority_shouldBeFirstInFirstOut() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let repo = controller.repository();
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

    let mut expected = Vec::new();
    for (i, priority) in [Priority::Normal, Priority::Low, Priority::Normal, Priority::Urgent]
        .into_iter()
        .enumerate()
    {
        let subject = if i % 2 == 0 { section("s1") } else { section("s2") };
        let entry = QueueEntryRecord::created_at(subject, priority, base + chrono::Duration::minutes(i as i64));
        repo.enqueue_entry(&entry).await?;
        expected.push(entry);
    }

    let listed = controller.queue().list_queued(&common::moderator(), 10).await?;
    let order: Vec<&str> = listed.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(
        order,
        vec![
            expected[3].id.as_str(),
            expected[0].id.as_str(),
            expected[2].id.as_str(),
            expected[1].id.as_str(),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_approve_shouldPublishSection() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let entry_id = controller
        .queue()
        .enqueue_for_moderation(section("s1"), Priority::Normal)
        .await?;

    let entry = controller
        .queue()
        .review_item(&common::moderator(), &entry_id, ReviewAction::Approve, Some("clean".to_string()))
        .await?;

    assert_eq!(entry.status, QueueStatus::Approved);
    assert!(entry.completed_at.is_some());
    assert_eq!(entry.reviewed_by.as_deref(), Some("mod-1"));

    let section = controller.repository().get_section("s1").await?.unwrap();
    assert_eq!(section.status, PublishStatus::Published);
    assert!(section.published_at.is_some());
    Ok(())
}

#[tokio::test]
async fn test_reject_shouldRevertWorkToDraft() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let work = SubjectRef::Work("w1".to_string());
    let entry_id = controller.queue().enqueue_for_moderation(work.clone(), Priority::High).await?;
    assert_eq!(
        controller.repository().get_publish_status(&work).await?,
        Some(PublishStatus::PendingReview)
    );

    controller
        .queue()
        .review_item(&common::admin(), &entry_id, ReviewAction::Reject, None)
        .await?;

    assert_eq!(controller.repository().get_publish_status(&work).await?, Some(PublishStatus::Draft));
    Ok(())
}

#[tokio::test]
async fn test_reviewItem_afterTerminalTransition_shouldFailForEveryAction() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let entry_id = controller
        .queue()
        .enqueue_for_moderation(section("s1"), Priority::Normal)
        .await?;
    controller
        .queue()
        .review_item(&common::moderator(), &entry_id, ReviewAction::Reject, None)
        .await?;

    for action in [ReviewAction::Approve, ReviewAction::Reject, ReviewAction::Flag] {
        let result = controller
            .queue()
            .review_item(&common::moderator(), &entry_id, action, None)
            .await;
        assert!(
            matches!(result, Err(ModerationError::InvalidTransition { .. })),
            "{} should be refused",
            action
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_flag_shouldKeepEntryQueuedAndAppendNotes() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let queue = controller.queue();
    let entry_id = queue.enqueue_for_moderation(section("s1"), Priority::Low).await?;

    queue
        .review_item(&common::moderator(), &entry_id, ReviewAction::Flag, Some("check ch. 3".to_string()))
        .await?;
    let entry = queue
        .review_item(&common::moderator(), &entry_id, ReviewAction::Flag, Some("second look".to_string()))
        .await?;

    assert_eq!(entry.status, QueueStatus::Queued);
    assert!(entry.flagged);
    let notes = entry.notes.unwrap();
    assert!(notes.contains("check ch. 3") && notes.contains("second look"));
    assert!(entry.completed_at.is_none());
    Ok(())
}

#[tokio::test]
async fn test_reviewItem_withoutModeratorCapability_shouldBeRejected() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let entry_id = controller
        .queue()
        .enqueue_for_moderation(section("s1"), Priority::Normal)
        .await?;

    for actor in [storyguard::Actor::anonymous(), common::reader("r1"), common::creator()] {
        let result = controller
            .queue()
            .review_item(&actor, &entry_id, ReviewAction::Approve, None)
            .await;
        assert!(matches!(result, Err(ModerationError::Authorization(_))));
    }

    let entry = controller.queue().get_entry(&common::moderator(), &entry_id).await?;
    assert_eq!(entry.status, QueueStatus::Queued);
    Ok(())
}

#[tokio::test]
async fn test_rejectedSubject_shouldBeResubmittedAsNewEntry() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let queue = controller.queue();
    let first = queue.enqueue_for_moderation(section("s1"), Priority::Normal).await?;
    queue
        .review_item(&common::moderator(), &first, ReviewAction::Reject, None)
        .await?;

    let second = queue.enqueue_for_moderation(section("s1"), Priority::Normal).await?;
    assert_ne!(first, second);

    let history = queue.history_for(&common::moderator(), &section("s1")).await?;
    assert_eq!(history.len(), 2);
    assert_eq!(queue.queue_stats(&common::moderator()).await?.rejected, 1);
    Ok(())
}

#[tokio::test]
async fn test_approve_withFreshValidationRequired_shouldNeedPassingVerdict() -> Result<()> {
    let mut config = Config::default();
    config.moderation.require_fresh_validation = true;
    let controller = Controller::with_collaborators(
        config,
        Repository::new_in_memory()?,
        Arc::new(Unconfigured),
        Arc::new(Unconfigured),
    );
    common::seed_work(controller.repository(), false).await?;

    let entry_id = controller
        .queue()
        .enqueue_for_moderation(section("s1"), Priority::Normal)
        .await?;
    let refused = controller
        .queue()
        .review_item(&common::moderator(), &entry_id, ReviewAction::Approve, None)
        .await;
    assert!(matches!(refused, Err(ModerationError::Validation(_))));

    let content = ValidationContent::text(common::sample_chapter()).for_subject(section("s1"));
    controller.engine().validate(&content, ValidationOptions::default()).await?;

    let approved = controller
        .queue()
        .review_item(&common::moderator(), &entry_id, ReviewAction::Approve, None)
        .await?;
    assert_eq!(approved.status, QueueStatus::Approved);
    Ok(())
}
