/*!
 * Quality votes on fan variants.
 *
 * Each vote is upserted per (user, variant) and the variant's averages are
 * recomputed from every current vote in the same transaction, so edits and
 * removals never leave drift behind.
 */

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::access::Actor;
use crate::database::models::{now_timestamp, RatingAggregate, VariantStatus, VoteRecord};
use crate::database::Repository;
use crate::errors::{ModerationError, ModerationResult};

/// Lowest and highest accepted rating
pub const RATING_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

/// One reader's ratings of a variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratings {
    pub readability: u8,
    pub comprehension: u8,
    pub polish: u8,
}

impl Ratings {
    pub fn new(readability: u8, comprehension: u8, polish: u8) -> Self {
        Self {
            readability,
            comprehension,
            polish,
        }
    }

    fn check(&self) -> ModerationResult<()> {
        for (name, value) in [
            ("readability", self.readability),
            ("comprehension", self.comprehension),
            ("polish", self.polish),
        ] {
            if !RATING_RANGE.contains(&value) {
                return Err(ModerationError::Validation(format!(
                    "{} rating must be between {} and {}, got {}",
                    name,
                    RATING_RANGE.start(),
                    RATING_RANGE.end(),
                    value
                )));
            }
        }
        Ok(())
    }
}

/// Vote intake and aggregate maintenance
#[derive(Clone)]
pub struct RatingAggregator {
    repo: Repository,
}

impl RatingAggregator {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Record the actor's vote, overwriting any earlier one, and return the
    /// recomputed aggregate
    pub async fn vote(
        &self,
        actor: &Actor,
        variant_id: &str,
        ratings: Ratings,
    ) -> ModerationResult<RatingAggregate> {
        if actor.is_anonymous() {
            return Err(ModerationError::Authorization("sign in to vote".to_string()));
        }
        ratings.check()?;

        let variant = self
            .repo
            .get_variant(variant_id)
            .await?
            .ok_or_else(|| ModerationError::not_found("variant", variant_id))?;
        if variant.status != VariantStatus::Active {
            return Err(ModerationError::Validation(format!(
                "variant {} is {} and not open for votes",
                variant_id, variant.status
            )));
        }

        let now = now_timestamp();
        let vote = VoteRecord {
            user_id: actor.user_id.clone(),
            variant_id: variant_id.to_string(),
            readability: ratings.readability,
            comprehension: ratings.comprehension,
            polish: ratings.polish,
            created_at: now.clone(),
            updated_at: now,
        };
        let aggregate = self.repo.upsert_vote(&vote).await?;

        debug!(
            "Vote by {} on {}: {}/{}/{}",
            actor.user_id, variant_id, ratings.readability, ratings.comprehension, ratings.polish
        );
        info!(
            "Variant {} quality {:.2} over {} vote(s)",
            variant_id, aggregate.quality_overall, aggregate.rating_count
        );
        Ok(aggregate)
    }

    /// Withdraw the actor's vote
    pub async fn remove_vote(&self, actor: &Actor, variant_id: &str) -> ModerationResult<RatingAggregate> {
        if actor.is_anonymous() {
            return Err(ModerationError::Authorization("sign in to vote".to_string()));
        }
        let aggregate = self
            .repo
            .delete_vote(&actor.user_id, variant_id)
            .await?
            .ok_or_else(|| ModerationError::not_found("vote", format!("{}/{}", actor.user_id, variant_id)))?;

        info!(
            "Vote by {} on {} removed; {} vote(s) remain",
            actor.user_id, variant_id, aggregate.rating_count
        );
        Ok(aggregate)
    }

    /// The actor's current ratings of a variant
    pub async fn my_vote(&self, actor: &Actor, variant_id: &str) -> ModerationResult<Option<Ratings>> {
        Ok(self
            .repo
            .get_vote(&actor.user_id, variant_id)
            .await?
            .map(|v| Ratings::new(v.readability, v.comprehension, v.polish)))
    }
}
