/*!
 * Integration tests for fan content votes, default selection and deals
 */

use anyhow::Result;

use storyguard::database::models::{DealStatus, VariantKind, VariantRecord, VariantStatus};
use storyguard::fan_content::{DealAction, Ratings, VariantSubmission};
use storyguard::{Actor, Controller, ModerationError, Role};

use crate::common;

fn translation(language: &str) -> VariantSubmission {
    VariantSubmission {
        kind: VariantKind::Translation,
        section_id: "s1".to_string(),
        language: language.to_string(),
        revenue_share_percent: None,
    }
}

async fn submit(controller: &Controller, contributor: &str, language: &str) -> Result<VariantRecord> {
    let (variant, _) = controller
        .variants()
        .submit_variant(&Actor::new(contributor, Role::Creator), translation(language))
        .await?;
    Ok(variant)
}

#[tokio::test]
async fn test_vote_fiveAndThree_shouldAverageToFour() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let variant = submit(&controller, "fan-1", "fr").await?;

    controller
        .ratings()
        .vote(&common::reader("u1"), &variant.id, Ratings::new(5, 5, 5))
        .await?;
    let aggregate = controller
        .ratings()
        .vote(&common::reader("u2"), &variant.id, Ratings::new(3, 3, 3))
        .await?;

    assert_eq!(aggregate.quality_overall, 4.0);
    assert_eq!(aggregate.rating_count, 2);

    let stored = controller.variants().get_variant(&variant.id).await?;
    assert_eq!(stored.aggregate, aggregate);
    Ok(())
}

#[tokio::test]
async fn test_vote_revote_shouldReplaceNotAccumulate() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let variant = submit(&controller, "fan-1", "fr").await?;
    let ratings = controller.ratings();

    ratings.vote(&common::reader("u1"), &variant.id, Ratings::new(1, 2, 3)).await?;
    ratings.vote(&common::reader("u2"), &variant.id, Ratings::new(5, 5, 5)).await?;
    let aggregate = ratings
        .vote(&common::reader("u1"), &variant.id, Ratings::new(3, 4, 5))
        .await?;

    assert_eq!(aggregate.rating_count, 2);
    assert_eq!(aggregate.readability_avg, 4.0);
    assert_eq!(aggregate.comprehension_avg, 4.5);
    assert_eq!(aggregate.polish_avg, 5.0);
    let mean = (aggregate.readability_avg + aggregate.comprehension_avg + aggregate.polish_avg) / 3.0;
    assert!((aggregate.quality_overall - mean).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn test_removeVote_shouldRecomputeFromRemaining() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let variant = submit(&controller, "fan-1", "fr").await?;
    let ratings = controller.ratings();

    ratings.vote(&common::reader("u1"), &variant.id, Ratings::new(5, 5, 5)).await?;
    ratings.vote(&common::reader("u2"), &variant.id, Ratings::new(1, 1, 1)).await?;

    let aggregate = ratings.remove_vote(&common::reader("u2"), &variant.id).await?;
    assert_eq!(aggregate.rating_count, 1);
    assert_eq!(aggregate.quality_overall, 5.0);
    assert_eq!(ratings.my_vote(&common::reader("u2"), &variant.id).await?, None);
    Ok(())
}

#[tokio::test]
async fn test_rankVariants_shouldOrderByQualityThenAge() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let older = submit(&controller, "fan-1", "fr").await?;
    let newer = submit(&controller, "fan-2", "fre").await?;
    let best = submit(&controller, "fan-3", "French").await?;
    // Same slot only
    submit(&controller, "fan-4", "de").await?;

    controller
        .ratings()
        .vote(&common::reader("u1"), &best.id, Ratings::new(4, 4, 4))
        .await?;

    let ranked: Vec<String> = controller
        .variants()
        .rank_variants("s1", VariantKind::Translation, "fra")
        .await?
        .into_iter()
        .map(|v| v.id)
        .collect();
    assert_eq!(ranked, vec![best.id.clone(), older.id, newer.id]);

    let suggestion = controller
        .variants()
        .suggest_default("s1", VariantKind::Translation, "fr")
        .await?;
    assert_eq!(suggestion.map(|v| v.id), Some(best.id));
    Ok(())
}

#[tokio::test]
async fn test_assignDefault_shouldKeepOneDefaultPerSlot() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let first = submit(&controller, "fan-1", "fr").await?;
    let second = submit(&controller, "fan-2", "fr").await?;
    let german = submit(&controller, "fan-3", "de").await?;

    controller.variants().assign_default(&common::creator(), &first.id).await?;
    controller.variants().assign_default(&common::creator(), &german.id).await?;
    controller.variants().assign_default(&common::moderator(), &second.id).await?;

    assert!(!controller.variants().get_variant(&first.id).await?.is_default);
    assert!(controller.variants().get_variant(&second.id).await?.is_default);
    assert!(controller.variants().get_variant(&german.id).await?.is_default);
    Ok(())
}

#[tokio::test]
async fn test_assignDefault_byReader_shouldBeRejected() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let variant = submit(&controller, "fan-1", "fr").await?;

    let result = controller
        .variants()
        .assign_default(&common::reader("u1"), &variant.id)
        .await;
    assert!(matches!(result, Err(ModerationError::Authorization(_))));
    Ok(())
}

#[tokio::test]
async fn test_dealFlow_approve_shouldOpenVariantForVotes() -> Result<()> {
    let controller = common::controller_with(
        storyguard::providers::mock::MockSimilarity::clean(),
        storyguard::providers::mock::MockImageChecker::safe(),
    )?;
    common::seed_work(controller.repository(), true).await?;

    let mut submission = translation("es");
    submission.revenue_share_percent = Some(40.0);
    let (variant, deal) = controller
        .variants()
        .submit_variant(&Actor::new("fan-1", Role::Creator), submission)
        .await?;
    let deal = deal.expect("deal required by the work");
    assert_eq!(variant.status, VariantStatus::PendingDeal);

    let early = controller
        .ratings()
        .vote(&common::reader("u1"), &variant.id, Ratings::new(4, 4, 4))
        .await;
    assert!(matches!(early, Err(ModerationError::Validation(_))));

    let pending = controller
        .deals()
        .deals_for_creator(&common::creator(), "creator-1", Some(DealStatus::PendingCreator))
        .await?;
    assert_eq!(pending.len(), 1);

    let decided = controller
        .deals()
        .decide_deal(&common::creator(), &deal.id, DealAction::Approve, None)
        .await?;
    assert_eq!(decided.status, DealStatus::Active);
    assert!(decided.accepted_at.is_some());

    let aggregate = controller
        .ratings()
        .vote(&common::reader("u1"), &variant.id, Ratings::new(4, 4, 4))
        .await?;
    assert_eq!(aggregate.rating_count, 1);
    Ok(())
}

#[tokio::test]
async fn test_dealFlow_onlyDesignatedCreatorMayDecide() -> Result<()> {
    let controller = common::controller_with(
        storyguard::providers::mock::MockSimilarity::clean(),
        storyguard::providers::mock::MockImageChecker::safe(),
    )?;
    common::seed_work(controller.repository(), true).await?;

    let mut submission = translation("es");
    submission.revenue_share_percent = Some(10.0);
    let (_, deal) = controller
        .variants()
        .submit_variant(&Actor::new("fan-1", Role::Creator), submission)
        .await?;
    let deal = deal.expect("deal required by the work");

    for actor in [Actor::new("fan-1", Role::Creator), common::moderator(), common::admin()] {
        let result = controller
            .deals()
            .decide_deal(&actor, &deal.id, DealAction::Reject, Some("no".to_string()))
            .await;
        assert!(matches!(result, Err(ModerationError::Authorization(_))));
    }

    let rejected = controller
        .deals()
        .decide_deal(&common::creator(), &deal.id, DealAction::Reject, Some("share too high".to_string()))
        .await?;
    assert_eq!(rejected.status, DealStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("share too high"));

    let variant = controller.variants().get_variant(&deal.variant_id).await?;
    assert_eq!(variant.status, VariantStatus::Rejected);
    Ok(())
}

#[tokio::test]
async fn test_submitVariant_withoutDealRequirement_shouldSkipDeal() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let mut submission = translation("it");
    submission.revenue_share_percent = Some(150.0);

    // The share is ignored when the work does not gate fan content
    let (variant, deal) = controller
        .variants()
        .submit_variant(&Actor::new("fan-1", Role::Creator), submission)
        .await?;
    assert_eq!(variant.status, VariantStatus::Active);
    assert!(deal.is_none());
    Ok(())
}
