//! Moderation queue persistence.

use anyhow::Result;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

use super::{column_from_row, subject_from_row, Repository};
use crate::database::models::{
    now_timestamp, Priority, PublishStatus, QueueEntryRecord, QueueStatus, SubjectRef,
};

const ENTRY_COLUMNS: &str = "id, subject_kind, subject_id, status, priority, flagged, notes, reviewed_by, created_at, completed_at";

/// Outcome of a conditional review update
#[derive(Debug, Clone)]
pub enum ReviewApplied {
    /// The entry moved to its terminal state and the subject was updated
    Applied(QueueEntryRecord),
    /// The entry was no longer queued (or does not exist)
    NotQueued,
    /// The subject row the entry points at is gone
    SubjectMissing,
}

/// Queue counts for moderator dashboards
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub queued: i64,
    pub approved: i64,
    pub rejected: i64,
    pub flagged: i64,
    /// Queued entries per priority, most urgent first
    pub queued_by_priority: Vec<(Priority, i64)>,
}

fn parse_entry_row(row: &rusqlite::Row) -> rusqlite::Result<QueueEntryRecord> {
    Ok(QueueEntryRecord {
        id: row.get(0)?,
        subject: subject_from_row(row, 1, 2)?,
        status: column_from_row(row, 3)?,
        priority: column_from_row(row, 4)?,
        flagged: row.get(5)?,
        notes: row.get(6)?,
        reviewed_by: row.get(7)?,
        created_at: row.get(8)?,
        completed_at: row.get(9)?,
    })
}

impl Repository {
    // =========================================================================
    // Moderation Queue Operations
    // =========================================================================

    /// Insert a queue entry and mark its subject `pending_review`
    ///
    /// Returns false (and inserts nothing) when the subject does not exist.
    pub async fn enqueue_entry(&self, entry: &QueueEntryRecord) -> Result<bool> {
        let entry = entry.clone();

        self.db
            .transaction_async(move |tx| {
                if !Self::set_publish_status_sync(tx, &entry.subject, PublishStatus::PendingReview)? {
                    return Ok(false);
                }
                tx.execute(
                    r#"
                    INSERT INTO moderation_queue (
                        id, subject_kind, subject_id, status, priority, priority_rank,
                        flagged, notes, reviewed_by, created_at, completed_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                    "#,
                    params![
                        entry.id,
                        entry.subject.kind(),
                        entry.subject.id(),
                        entry.status.to_string(),
                        entry.priority.to_string(),
                        entry.priority.rank(),
                        entry.flagged,
                        entry.notes,
                        entry.reviewed_by,
                        entry.created_at,
                        entry.completed_at,
                    ],
                )?;
                debug!("Queued {} for moderation as {}", entry.subject, entry.id);
                Ok(true)
            })
            .await
    }

    /// Get a queue entry by ID
    pub async fn get_queue_entry(&self, entry_id: &str) -> Result<Option<QueueEntryRecord>> {
        let entry_id = entry_id.to_string();

        self.db
            .execute_async(move |conn| Self::get_queue_entry_sync(conn, &entry_id))
            .await
    }

    fn get_queue_entry_sync(conn: &Connection, entry_id: &str) -> Result<Option<QueueEntryRecord>> {
        let sql = format!("SELECT {} FROM moderation_queue WHERE id = ?1", ENTRY_COLUMNS);
        Ok(conn.query_row(&sql, [entry_id], parse_entry_row).optional()?)
    }

    /// Queued entries, most urgent first and oldest first within a priority
    pub async fn list_queued_entries(&self, limit: usize) -> Result<Vec<QueueEntryRecord>> {
        self.db
            .execute_async(move |conn| {
                let sql = format!(
                    r#"
                    SELECT {} FROM moderation_queue
                    WHERE status = 'queued'
                    ORDER BY priority_rank DESC, created_at ASC, id ASC
                    LIMIT ?1
                    "#,
                    ENTRY_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let entries = stmt
                    .query_map([limit as i64], parse_entry_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(entries)
            })
            .await
    }

    /// All entries ever created for a subject, newest first
    pub async fn list_entries_for_subject(
        &self,
        subject: &SubjectRef,
    ) -> Result<Vec<QueueEntryRecord>> {
        let subject = subject.clone();

        self.db
            .execute_async(move |conn| {
                let sql = format!(
                    r#"
                    SELECT {} FROM moderation_queue
                    WHERE subject_kind = ?1 AND subject_id = ?2
                    ORDER BY created_at DESC, id DESC
                    "#,
                    ENTRY_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let entries = stmt
                    .query_map(params![subject.kind(), subject.id()], parse_entry_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(entries)
            })
            .await
    }

    /// Move a queued entry to a terminal status and cascade to its subject
    ///
    /// Both writes happen in one transaction; the entry update only applies
    /// while the entry is still `queued`.
    pub async fn apply_review(
        &self,
        entry_id: &str,
        status: QueueStatus,
        subject_status: PublishStatus,
        reviewer: &str,
        note: Option<String>,
    ) -> Result<ReviewApplied> {
        let entry_id = entry_id.to_string();
        let reviewer = reviewer.to_string();
        let completed_at = now_timestamp();

        self.db
            .transaction_async(move |tx| {
                let Some(entry) = Self::get_queue_entry_sync(tx, &entry_id)? else {
                    return Ok(ReviewApplied::NotQueued);
                };

                let changed = tx.execute(
                    r#"
                    UPDATE moderation_queue
                    SET status = ?1, completed_at = ?2, reviewed_by = ?3,
                        notes = CASE
                            WHEN ?4 IS NULL THEN notes
                            WHEN notes IS NULL OR notes = '' THEN ?4
                            ELSE notes || char(10) || ?4
                        END
                    WHERE id = ?5 AND status = 'queued'
                    "#,
                    params![status.to_string(), completed_at, reviewer, note, entry_id],
                )?;
                if changed == 0 {
                    return Ok(ReviewApplied::NotQueued);
                }

                if !Self::set_publish_status_sync(tx, &entry.subject, subject_status)? {
                    // Dropping the transaction rolls the entry update back
                    return Err(anyhow::Error::new(SubjectGone));
                }

                let updated = Self::get_queue_entry_sync(tx, &entry_id)?
                    .ok_or_else(|| anyhow::anyhow!("Queue entry {} vanished mid-transaction", entry_id))?;
                Ok(ReviewApplied::Applied(updated))
            })
            .await
            .or_else(|e| {
                if e.is::<SubjectGone>() {
                    Ok(ReviewApplied::SubjectMissing)
                } else {
                    Err(e)
                }
            })
    }

    /// Append a note and set the flag on a queued entry; false if not queued
    pub async fn flag_entry(&self, entry_id: &str, note: Option<String>) -> Result<bool> {
        let entry_id = entry_id.to_string();

        self.db
            .execute_async(move |conn| {
                let changed = conn.execute(
                    r#"
                    UPDATE moderation_queue
                    SET flagged = 1,
                        notes = CASE
                            WHEN ?1 IS NULL THEN notes
                            WHEN notes IS NULL OR notes = '' THEN ?1
                            ELSE notes || char(10) || ?1
                        END
                    WHERE id = ?2 AND status = 'queued'
                    "#,
                    params![note, entry_id],
                )?;
                Ok(changed == 1)
            })
            .await
    }

    /// Counts per status and per priority of queued entries
    pub async fn queue_counts(&self) -> Result<QueueCounts> {
        self.db
            .execute_async(move |conn| {
                let mut counts = QueueCounts::default();

                let mut stmt =
                    conn.prepare("SELECT status, COUNT(*) FROM moderation_queue GROUP BY status")?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;
                for row in rows {
                    let (status, count) = row?;
                    match status.parse::<QueueStatus>() {
                        Ok(QueueStatus::Queued) => counts.queued = count,
                        Ok(QueueStatus::Approved) => counts.approved = count,
                        Ok(QueueStatus::Rejected) => counts.rejected = count,
                        Err(_) => {}
                    }
                }

                counts.flagged = conn.query_row(
                    "SELECT COUNT(*) FROM moderation_queue WHERE status = 'queued' AND flagged = 1",
                    [],
                    |row| row.get(0),
                )?;

                let mut stmt = conn.prepare(
                    r#"
                    SELECT priority, COUNT(*) FROM moderation_queue
                    WHERE status = 'queued'
                    GROUP BY priority, priority_rank
                    ORDER BY priority_rank DESC
                    "#,
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;
                for row in rows {
                    let (priority, count) = row?;
                    if let Ok(priority) = priority.parse() {
                        counts.queued_by_priority.push((priority, count));
                    }
                }

                Ok(counts)
            })
            .await
    }

    /// Whether a passing validation for the subject exists at or after `since`
    pub async fn has_passing_result_since(&self, subject: &SubjectRef, since: &str) -> Result<bool> {
        let subject = subject.clone();
        let since = since.to_string();

        self.db
            .execute_async(move |conn| Self::has_passing_result_since_sync(conn, &subject, &since))
            .await
    }
}

/// Marker error used to roll back a review whose subject disappeared
#[derive(Debug)]
struct SubjectGone;

impl std::fmt::Display for SubjectGone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "moderated subject no longer exists")
    }
}

impl std::error::Error for SubjectGone {}
