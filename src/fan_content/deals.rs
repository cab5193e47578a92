/*!
 * Tier 3 revenue-share deals.
 *
 * ```text
 * pending_creator --approve--> active    (variant -> active, accepted_at set)
 * pending_creator --reject---> rejected  (variant -> rejected, reason kept)
 * ```
 *
 * Only the creator named on the deal may decide it.
 */

use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::access::Actor;
use crate::database::models::{DealRecord, DealStatus};
use crate::database::Repository;
use crate::errors::{ModerationError, ModerationResult};

/// Creator decision on a pending deal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealAction {
    Approve,
    Reject,
}

impl DealAction {
    fn target(self) -> DealStatus {
        match self {
            DealAction::Approve => DealStatus::Active,
            DealAction::Reject => DealStatus::Rejected,
        }
    }
}

impl fmt::Display for DealAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DealAction::Approve => write!(f, "approve"),
            DealAction::Reject => write!(f, "reject"),
        }
    }
}

impl std::str::FromStr for DealAction {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approve" => Ok(DealAction::Approve),
            "reject" => Ok(DealAction::Reject),
            _ => Err(ModerationError::Validation(format!("unknown deal action: {}", s))),
        }
    }
}

#[derive(Clone)]
pub struct DealService {
    repo: Repository,
}

impl DealService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub async fn decide_deal(
        &self,
        actor: &Actor,
        deal_id: &str,
        action: DealAction,
        reason: Option<String>,
    ) -> ModerationResult<DealRecord> {
        let deal = self.load(deal_id).await?;
        actor.require_identity(&deal.creator_id)?;
        if deal.status != DealStatus::PendingCreator {
            return Err(invalid_transition(&deal, action));
        }

        // A reason only makes sense on rejection
        let reason = match action {
            DealAction::Reject => reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
            DealAction::Approve => None,
        };

        match self.repo.decide_deal(deal_id, action.target(), reason).await? {
            Some(updated) => {
                info!(
                    "Deal {} {} by {}; variant {} follows",
                    deal_id, updated.status, actor.user_id, updated.variant_id
                );
                Ok(updated)
            }
            None => {
                let current = self.load(deal_id).await?;
                Err(invalid_transition(&current, action))
            }
        }
    }

    /// Deals addressed to a creator, optionally narrowed to one status
    pub async fn deals_for_creator(
        &self,
        actor: &Actor,
        creator_id: &str,
        status: Option<DealStatus>,
    ) -> ModerationResult<Vec<DealRecord>> {
        if !actor.is_admin() {
            actor.require_identity(creator_id)?;
        }
        Ok(self.repo.list_deals_for_creator(creator_id, status).await?)
    }

    async fn load(&self, deal_id: &str) -> ModerationResult<DealRecord> {
        self.repo
            .get_deal(deal_id)
            .await?
            .ok_or_else(|| ModerationError::not_found("deal", deal_id))
    }
}

fn invalid_transition(deal: &DealRecord, action: DealAction) -> ModerationError {
    ModerationError::InvalidTransition {
        entity: "deal",
        id: deal.id.clone(),
        from: deal.status.to_string(),
        action: action.to_string(),
    }
}
