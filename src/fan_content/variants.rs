/*!
 * Variant submission, ranking and default selection.
 */

use log::info;
use serde::{Deserialize, Serialize};

use crate::access::Actor;
use crate::database::models::{
    now_timestamp, DealRecord, DealStatus, RatingAggregate, VariantKind, VariantRecord,
    VariantStatus,
};
use crate::database::Repository;
use crate::errors::{ModerationError, ModerationResult};
use crate::language_utils::normalize_to_part2t;

/// A fan contribution offered for one section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantSubmission {
    pub kind: VariantKind,
    pub section_id: String,
    /// Any ISO 639 code or English language name
    pub language: String,
    /// Required when the work gates fan content behind a deal
    pub revenue_share_percent: Option<f64>,
}

/// Variant catalog service
#[derive(Clone)]
pub struct VariantCatalog {
    repo: Repository,
}

impl VariantCatalog {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Register a contribution by the acting user
    ///
    /// Works with `require_deal_approval` get a `pending_deal` variant plus a
    /// deal addressed to the owner; other works activate it right away.
    pub async fn submit_variant(
        &self,
        actor: &Actor,
        submission: VariantSubmission,
    ) -> ModerationResult<(VariantRecord, Option<DealRecord>)> {
        if actor.is_anonymous() {
            return Err(ModerationError::Authorization(
                "sign in to submit fan content".to_string(),
            ));
        }
        let language = normalize_to_part2t(&submission.language)
            .map_err(|e| ModerationError::Validation(e.to_string()))?;

        let section = self
            .repo
            .get_section(&submission.section_id)
            .await?
            .ok_or_else(|| ModerationError::not_found("section", &submission.section_id))?;
        let work = self
            .repo
            .get_work(&section.work_id)
            .await?
            .ok_or_else(|| ModerationError::not_found("work", &section.work_id))?;

        let now = now_timestamp();
        let mut variant = VariantRecord {
            id: uuid::Uuid::new_v4().to_string(),
            kind: submission.kind,
            work_id: work.id.clone(),
            section_id: section.id,
            language,
            contributor_id: actor.user_id.clone(),
            status: VariantStatus::Active,
            is_default: false,
            aggregate: RatingAggregate::default(),
            created_at: now.clone(),
        };

        let deal = if work.require_deal_approval {
            let percent = check_revenue_share(submission.revenue_share_percent)?;
            variant.status = VariantStatus::PendingDeal;
            Some(DealRecord {
                id: uuid::Uuid::new_v4().to_string(),
                work_id: work.id.clone(),
                variant_id: variant.id.clone(),
                creator_id: work.owner_id.clone(),
                contributor_id: actor.user_id.clone(),
                content_type: variant.kind,
                revenue_share_percent: percent,
                status: DealStatus::PendingCreator,
                rejection_reason: None,
                created_at: now,
                accepted_at: None,
                decided_at: None,
            })
        } else {
            None
        };

        self.repo.insert_variant(&variant, deal.as_ref()).await?;
        match &deal {
            Some(deal) => info!(
                "{} {} submitted by {} awaits deal {} ({}% share)",
                variant.kind, variant.id, actor.user_id, deal.id, deal.revenue_share_percent
            ),
            None => info!("{} {} submitted by {} is active", variant.kind, variant.id, actor.user_id),
        }
        Ok((variant, deal))
    }

    pub async fn get_variant(&self, variant_id: &str) -> ModerationResult<VariantRecord> {
        self.repo
            .get_variant(variant_id)
            .await?
            .ok_or_else(|| ModerationError::not_found("variant", variant_id))
    }

    /// Active variants of a slot, best `quality_overall` first, oldest first on ties
    pub async fn rank_variants(
        &self,
        section_id: &str,
        kind: VariantKind,
        language: &str,
    ) -> ModerationResult<Vec<VariantRecord>> {
        let language = normalize_to_part2t(language)
            .map_err(|e| ModerationError::Validation(e.to_string()))?;
        Ok(self.repo.list_active_variants(section_id, kind, &language).await?)
    }

    /// Top-ranked variant of a slot, if any is active
    pub async fn suggest_default(
        &self,
        section_id: &str,
        kind: VariantKind,
        language: &str,
    ) -> ModerationResult<Option<VariantRecord>> {
        Ok(self
            .rank_variants(section_id, kind, language)
            .await?
            .into_iter()
            .next())
    }

    /// Make a variant the default of its slot
    ///
    /// Allowed for the owner of the work and for moderators.
    pub async fn assign_default(&self, actor: &Actor, variant_id: &str) -> ModerationResult<VariantRecord> {
        let variant = self.get_variant(variant_id).await?;
        let work = self
            .repo
            .get_work(&variant.work_id)
            .await?
            .ok_or_else(|| ModerationError::not_found("work", &variant.work_id))?;

        if !actor.can_moderate() {
            actor.require_identity(&work.owner_id)?;
        }
        if variant.status != VariantStatus::Active {
            return Err(ModerationError::Validation(format!(
                "variant {} is {} and cannot be the default",
                variant.id, variant.status
            )));
        }

        let updated = self
            .repo
            .set_default_variant(variant_id)
            .await?
            .ok_or_else(|| ModerationError::not_found("variant", variant_id))?;
        info!(
            "Variant {} is the default {} ({}) of section {}",
            updated.id, updated.kind, updated.language, updated.section_id
        );
        Ok(updated)
    }
}

fn check_revenue_share(percent: Option<f64>) -> ModerationResult<f64> {
    match percent {
        Some(p) if (0.0..=100.0).contains(&p) => Ok(p),
        Some(p) => Err(ModerationError::Validation(format!(
            "revenue share must be between 0 and 100, got {}",
            p
        ))),
        None => Err(ModerationError::Validation(
            "this work requires a revenue share proposal".to_string(),
        )),
    }
}
