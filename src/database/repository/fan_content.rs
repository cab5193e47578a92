//! Fan variants, votes and revenue-share deals.

use anyhow::Result;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

use super::{column_from_row, Repository};
use crate::database::models::{
    now_timestamp, DealRecord, DealStatus, RatingAggregate, VariantKind, VariantRecord,
    VariantStatus, VoteRecord,
};

const VARIANT_COLUMNS: &str = "id, kind, work_id, section_id, language, contributor_id, status, is_default, readability_avg, comprehension_avg, polish_avg, quality_overall, rating_count, created_at";

const DEAL_COLUMNS: &str = "id, work_id, variant_id, creator_id, contributor_id, content_type, revenue_share_percent, status, rejection_reason, created_at, accepted_at, decided_at";

fn parse_variant_row(row: &rusqlite::Row) -> rusqlite::Result<VariantRecord> {
    Ok(VariantRecord {
        id: row.get(0)?,
        kind: column_from_row(row, 1)?,
        work_id: row.get(2)?,
        section_id: row.get(3)?,
        language: row.get(4)?,
        contributor_id: row.get(5)?,
        status: column_from_row(row, 6)?,
        is_default: row.get(7)?,
        aggregate: RatingAggregate {
            readability_avg: row.get(8)?,
            comprehension_avg: row.get(9)?,
            polish_avg: row.get(10)?,
            quality_overall: row.get(11)?,
            rating_count: row.get(12)?,
        },
        created_at: row.get(13)?,
    })
}

fn parse_deal_row(row: &rusqlite::Row) -> rusqlite::Result<DealRecord> {
    Ok(DealRecord {
        id: row.get(0)?,
        work_id: row.get(1)?,
        variant_id: row.get(2)?,
        creator_id: row.get(3)?,
        contributor_id: row.get(4)?,
        content_type: column_from_row(row, 5)?,
        revenue_share_percent: row.get(6)?,
        status: column_from_row(row, 7)?,
        rejection_reason: row.get(8)?,
        created_at: row.get(9)?,
        accepted_at: row.get(10)?,
        decided_at: row.get(11)?,
    })
}

impl Repository {
    // =========================================================================
    // Variant Operations
    // =========================================================================

    /// Insert a variant and, when given, its gating deal in one transaction
    pub async fn insert_variant(&self, variant: &VariantRecord, deal: Option<&DealRecord>) -> Result<()> {
        let variant = variant.clone();
        let deal = deal.cloned();

        self.db
            .transaction_async(move |tx| {
                tx.execute(
                    r#"
                    INSERT INTO fan_variants (
                        id, kind, work_id, section_id, language, contributor_id, status, is_default,
                        readability_avg, comprehension_avg, polish_avg, quality_overall, rating_count, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                    "#,
                    params![
                        variant.id,
                        variant.kind.to_string(),
                        variant.work_id,
                        variant.section_id,
                        variant.language,
                        variant.contributor_id,
                        variant.status.to_string(),
                        variant.is_default,
                        variant.aggregate.readability_avg,
                        variant.aggregate.comprehension_avg,
                        variant.aggregate.polish_avg,
                        variant.aggregate.quality_overall,
                        variant.aggregate.rating_count,
                        variant.created_at,
                    ],
                )?;

                if let Some(deal) = deal {
                    tx.execute(
                        r#"
                        INSERT INTO tier3_deals (
                            id, work_id, variant_id, creator_id, contributor_id, content_type,
                            revenue_share_percent, status, rejection_reason, created_at, accepted_at, decided_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                        "#,
                        params![
                            deal.id,
                            deal.work_id,
                            deal.variant_id,
                            deal.creator_id,
                            deal.contributor_id,
                            deal.content_type.to_string(),
                            deal.revenue_share_percent,
                            deal.status.to_string(),
                            deal.rejection_reason,
                            deal.created_at,
                            deal.accepted_at,
                            deal.decided_at,
                        ],
                    )?;
                }
                Ok(())
            })
            .await
    }

    /// Get a variant by ID
    pub async fn get_variant(&self, variant_id: &str) -> Result<Option<VariantRecord>> {
        let variant_id = variant_id.to_string();

        self.db
            .execute_async(move |conn| Self::get_variant_sync(conn, &variant_id))
            .await
    }

    fn get_variant_sync(conn: &Connection, variant_id: &str) -> Result<Option<VariantRecord>> {
        let sql = format!("SELECT {} FROM fan_variants WHERE id = ?1", VARIANT_COLUMNS);
        Ok(conn.query_row(&sql, [variant_id], parse_variant_row).optional()?)
    }

    /// Active variants competing for one (section, kind, language) slot,
    /// best quality first and oldest first on ties
    pub async fn list_active_variants(
        &self,
        section_id: &str,
        kind: VariantKind,
        language: &str,
    ) -> Result<Vec<VariantRecord>> {
        let section_id = section_id.to_string();
        let language = language.to_string();

        self.db
            .execute_async(move |conn| {
                let sql = format!(
                    r#"
                    SELECT {} FROM fan_variants
                    WHERE section_id = ?1 AND kind = ?2 AND language = ?3 AND status = 'active'
                    ORDER BY quality_overall DESC, created_at ASC, id ASC
                    "#,
                    VARIANT_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let variants = stmt
                    .query_map(params![section_id, kind.to_string(), language], parse_variant_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(variants)
            })
            .await
    }

    /// Make a variant the only default of its (section, kind, language) slot
    pub async fn set_default_variant(&self, variant_id: &str) -> Result<Option<VariantRecord>> {
        let variant_id = variant_id.to_string();

        self.db
            .transaction_async(move |tx| {
                let Some(variant) = Self::get_variant_sync(tx, &variant_id)? else {
                    return Ok(None);
                };

                let cleared = tx.execute(
                    r#"
                    UPDATE fan_variants SET is_default = 0
                    WHERE section_id = ?1 AND kind = ?2 AND language = ?3 AND id != ?4 AND is_default = 1
                    "#,
                    params![
                        variant.section_id,
                        variant.kind.to_string(),
                        variant.language,
                        variant.id,
                    ],
                )?;
                tx.execute("UPDATE fan_variants SET is_default = 1 WHERE id = ?1", [&variant.id])?;
                debug!("Variant {} is now default ({} previous default cleared)", variant.id, cleared);

                Self::get_variant_sync(tx, &variant_id)
            })
            .await
    }

    // =========================================================================
    // Vote Operations
    // =========================================================================

    /// Insert or overwrite a user's vote, then recompute the variant aggregate
    pub async fn upsert_vote(&self, vote: &VoteRecord) -> Result<RatingAggregate> {
        let vote = vote.clone();

        self.db
            .transaction_async(move |tx| {
                tx.execute(
                    r#"
                    INSERT INTO fan_votes (user_id, variant_id, readability, comprehension, polish, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ON CONFLICT(user_id, variant_id) DO UPDATE SET
                        readability = excluded.readability,
                        comprehension = excluded.comprehension,
                        polish = excluded.polish,
                        updated_at = excluded.updated_at
                    "#,
                    params![
                        vote.user_id,
                        vote.variant_id,
                        vote.readability,
                        vote.comprehension,
                        vote.polish,
                        vote.created_at,
                        vote.updated_at,
                    ],
                )?;
                Self::recompute_aggregate_sync(tx, &vote.variant_id)
            })
            .await
    }

    /// Remove a user's vote; `None` if there was none
    pub async fn delete_vote(&self, user_id: &str, variant_id: &str) -> Result<Option<RatingAggregate>> {
        let user_id = user_id.to_string();
        let variant_id = variant_id.to_string();

        self.db
            .transaction_async(move |tx| {
                let removed = tx.execute(
                    "DELETE FROM fan_votes WHERE user_id = ?1 AND variant_id = ?2",
                    params![user_id, variant_id],
                )?;
                if removed == 0 {
                    return Ok(None);
                }
                Ok(Some(Self::recompute_aggregate_sync(tx, &variant_id)?))
            })
            .await
    }

    /// A user's current vote on a variant
    pub async fn get_vote(&self, user_id: &str, variant_id: &str) -> Result<Option<VoteRecord>> {
        let user_id = user_id.to_string();
        let variant_id = variant_id.to_string();

        self.db
            .execute_async(move |conn| {
                let vote = conn
                    .query_row(
                        r#"
                        SELECT user_id, variant_id, readability, comprehension, polish, created_at, updated_at
                        FROM fan_votes WHERE user_id = ?1 AND variant_id = ?2
                        "#,
                        params![user_id, variant_id],
                        |row| {
                            Ok(VoteRecord {
                                user_id: row.get(0)?,
                                variant_id: row.get(1)?,
                                readability: row.get(2)?,
                                comprehension: row.get(3)?,
                                polish: row.get(4)?,
                                created_at: row.get(5)?,
                                updated_at: row.get(6)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(vote)
            })
            .await
    }

    /// Rebuild the aggregate from every current vote of the variant
    fn recompute_aggregate_sync(conn: &Connection, variant_id: &str) -> Result<RatingAggregate> {
        let (readability, comprehension, polish, count): (Option<f64>, Option<f64>, Option<f64>, i64) =
            conn.query_row(
                r#"
                SELECT AVG(readability), AVG(comprehension), AVG(polish), COUNT(*)
                FROM fan_votes WHERE variant_id = ?1
                "#,
                [variant_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        let readability_avg = readability.unwrap_or(0.0);
        let comprehension_avg = comprehension.unwrap_or(0.0);
        let polish_avg = polish.unwrap_or(0.0);
        let aggregate = RatingAggregate {
            readability_avg,
            comprehension_avg,
            polish_avg,
            quality_overall: (readability_avg + comprehension_avg + polish_avg) / 3.0,
            rating_count: count,
        };

        conn.execute(
            r#"
            UPDATE fan_variants
            SET readability_avg = ?1, comprehension_avg = ?2, polish_avg = ?3,
                quality_overall = ?4, rating_count = ?5
            WHERE id = ?6
            "#,
            params![
                aggregate.readability_avg,
                aggregate.comprehension_avg,
                aggregate.polish_avg,
                aggregate.quality_overall,
                aggregate.rating_count,
                variant_id,
            ],
        )?;
        debug!(
            "Variant {} aggregate: overall {:.3} over {} votes",
            variant_id, aggregate.quality_overall, aggregate.rating_count
        );
        Ok(aggregate)
    }

    // =========================================================================
    // Deal Operations
    // =========================================================================

    /// Get a deal by ID
    pub async fn get_deal(&self, deal_id: &str) -> Result<Option<DealRecord>> {
        let deal_id = deal_id.to_string();

        self.db
            .execute_async(move |conn| Self::get_deal_sync(conn, &deal_id))
            .await
    }

    fn get_deal_sync(conn: &Connection, deal_id: &str) -> Result<Option<DealRecord>> {
        let sql = format!("SELECT {} FROM tier3_deals WHERE id = ?1", DEAL_COLUMNS);
        Ok(conn.query_row(&sql, [deal_id], parse_deal_row).optional()?)
    }

    /// Decide a pending deal and carry the outcome to its variant
    ///
    /// Returns `None` when the deal was no longer `pending_creator`.
    pub async fn decide_deal(
        &self,
        deal_id: &str,
        status: DealStatus,
        rejection_reason: Option<String>,
    ) -> Result<Option<DealRecord>> {
        let deal_id = deal_id.to_string();
        let now = now_timestamp();
        let accepted_at = (status == DealStatus::Active).then(|| now.clone());
        let variant_status = match status {
            DealStatus::Active => VariantStatus::Active,
            _ => VariantStatus::Rejected,
        };

        self.db
            .transaction_async(move |tx| {
                let changed = tx.execute(
                    r#"
                    UPDATE tier3_deals
                    SET status = ?1, rejection_reason = ?2, accepted_at = ?3, decided_at = ?4
                    WHERE id = ?5 AND status = 'pending_creator'
                    "#,
                    params![status.to_string(), rejection_reason, accepted_at, now, deal_id],
                )?;
                if changed == 0 {
                    return Ok(None);
                }

                tx.execute(
                    r#"
                    UPDATE fan_variants SET status = ?1
                    WHERE id = (SELECT variant_id FROM tier3_deals WHERE id = ?2)
                      AND status = 'pending_deal'
                    "#,
                    params![variant_status.to_string(), deal_id],
                )?;

                Self::get_deal_sync(tx, &deal_id)
            })
            .await
    }

    /// Deals addressed to a creator, newest first
    pub async fn list_deals_for_creator(
        &self,
        creator_id: &str,
        status: Option<DealStatus>,
    ) -> Result<Vec<DealRecord>> {
        let creator_id = creator_id.to_string();

        self.db
            .execute_async(move |conn| {
                let sql = format!(
                    r#"
                    SELECT {} FROM tier3_deals
                    WHERE creator_id = ?1 AND (?2 IS NULL OR status = ?2)
                    ORDER BY created_at DESC, id DESC
                    "#,
                    DEAL_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let deals = stmt
                    .query_map(params![creator_id, status.map(|s| s.to_string())], parse_deal_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(deals)
            })
            .await
    }
}
