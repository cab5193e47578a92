//! Quality-assessment job persistence.
//!
//! Claiming is a per-row conditional update, so two concurrent batch runs
//! can both select the same candidate id but only one of them wins it.

use anyhow::Result;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

use super::{column_from_row, optional_subject_from_row, Repository};
use crate::database::models::{
    now_timestamp, AssessmentJobRecord, JobStatus, ValidationResultRecord,
};

const JOB_COLUMNS: &str = "id, subject_kind, subject_id, text, image_url, is_first_chapter, status, attempts, last_error, created_at, claimed_at, finished_at";

/// Per-status job counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub pending: i64,
    pub processing: i64,
    pub done: i64,
    /// Failed jobs that will be retried
    pub retryable: i64,
    /// Failed jobs out of attempts, waiting for manual triage
    pub exhausted: i64,
}

fn parse_job_row(row: &rusqlite::Row) -> rusqlite::Result<AssessmentJobRecord> {
    Ok(AssessmentJobRecord {
        id: row.get(0)?,
        subject: optional_subject_from_row(row, 1, 2)?,
        text: row.get(3)?,
        image_url: row.get(4)?,
        is_first_chapter: row.get(5)?,
        status: column_from_row(row, 6)?,
        attempts: row.get(7)?,
        last_error: row.get(8)?,
        created_at: row.get(9)?,
        claimed_at: row.get(10)?,
        finished_at: row.get(11)?,
    })
}

impl Repository {
    // =========================================================================
    // Assessment Job Operations
    // =========================================================================

    /// Insert a new assessment job
    pub async fn insert_job(&self, job: &AssessmentJobRecord) -> Result<()> {
        let job = job.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO assessment_jobs (
                        id, subject_kind, subject_id, text, image_url, is_first_chapter,
                        status, attempts, last_error, created_at, claimed_at, finished_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                    "#,
                    params![
                        job.id,
                        job.subject.as_ref().map(|s| s.kind()),
                        job.subject.as_ref().map(|s| s.id().to_string()),
                        job.text,
                        job.image_url,
                        job.is_first_chapter,
                        job.status.to_string(),
                        job.attempts,
                        job.last_error,
                        job.created_at,
                        job.claimed_at,
                        job.finished_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Get a job by ID
    pub async fn get_job(&self, job_id: &str) -> Result<Option<AssessmentJobRecord>> {
        let job_id = job_id.to_string();

        self.db
            .execute_async(move |conn| Self::get_job_sync(conn, &job_id))
            .await
    }

    fn get_job_sync(conn: &Connection, job_id: &str) -> Result<Option<AssessmentJobRecord>> {
        let sql = format!("SELECT {} FROM assessment_jobs WHERE id = ?1", JOB_COLUMNS);
        Ok(conn.query_row(&sql, [job_id], parse_job_row).optional()?)
    }

    /// Ids of claimable jobs in FIFO order
    pub async fn list_claimable_job_ids(&self, limit: usize, max_attempts: u32) -> Result<Vec<String>> {
        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id FROM assessment_jobs
                    WHERE status = 'pending' OR (status = 'failed' AND attempts < ?1)
                    ORDER BY created_at ASC, id ASC
                    LIMIT ?2
                    "#,
                )?;
                let ids = stmt
                    .query_map(params![max_attempts, limit as i64], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(ids)
            })
            .await
    }

    /// Atomically move a claimable job to `processing`
    ///
    /// Returns the claimed job, or `None` if another worker got there first
    /// or the job is no longer eligible.
    pub async fn claim_job(&self, job_id: &str, max_attempts: u32) -> Result<Option<AssessmentJobRecord>> {
        let job_id = job_id.to_string();
        let now = now_timestamp();

        self.db
            .execute_async(move |conn| {
                let changed = conn.execute(
                    r#"
                    UPDATE assessment_jobs
                    SET status = 'processing', claimed_at = ?1, finished_at = NULL
                    WHERE id = ?2
                      AND (status = 'pending' OR (status = 'failed' AND attempts < ?3))
                    "#,
                    params![now, job_id, max_attempts],
                )?;
                if changed == 0 {
                    debug!("Job {} already claimed elsewhere", job_id);
                    return Ok(None);
                }
                Self::get_job_sync(conn, &job_id)
            })
            .await
    }

    /// Mark a processing job `done`, storing its verdict in the same transaction
    ///
    /// `claimed_at` identifies the claim; `false` means the job is no longer
    /// held by that claim (reclaimed, or claimed again by another run).
    pub async fn complete_job(
        &self,
        job_id: &str,
        claimed_at: Option<&str>,
        result: Option<ValidationResultRecord>,
    ) -> Result<bool> {
        let job_id = job_id.to_string();
        let claimed_at = claimed_at.map(str::to_string);
        let now = now_timestamp();

        self.db
            .transaction_async(move |tx| {
                let changed = tx.execute(
                    r#"
                    UPDATE assessment_jobs
                    SET status = 'done', finished_at = ?1, last_error = NULL
                    WHERE id = ?2 AND status = 'processing' AND claimed_at IS ?3
                    "#,
                    params![now, job_id, claimed_at],
                )?;
                if changed == 0 {
                    return Ok(false);
                }
                if let Some(result) = &result {
                    Self::insert_validation_result_sync(tx, result)?;
                }
                Ok(true)
            })
            .await
    }

    /// Mark a processing job `failed` and bump its attempt counter
    ///
    /// Returns the attempt count after the increment, `None` if the job is
    /// no longer held by the claim made at `claimed_at`.
    pub async fn fail_job(&self, job_id: &str, claimed_at: Option<&str>, error: &str) -> Result<Option<u32>> {
        let job_id = job_id.to_string();
        let claimed_at = claimed_at.map(str::to_string);
        let error = error.to_string();
        let now = now_timestamp();

        self.db
            .execute_async(move |conn| {
                let changed = conn.execute(
                    r#"
                    UPDATE assessment_jobs
                    SET status = 'failed', attempts = attempts + 1, last_error = ?1, finished_at = ?2
                    WHERE id = ?3 AND status = 'processing' AND claimed_at IS ?4
                    "#,
                    params![error, now, job_id, claimed_at],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                let attempts = conn.query_row(
                    "SELECT attempts FROM assessment_jobs WHERE id = ?1",
                    [&job_id],
                    |row| row.get(0),
                )?;
                Ok(Some(attempts))
            })
            .await
    }

    /// Return jobs stuck in `processing` since before `cutoff` to `pending`
    pub async fn reclaim_stale_jobs(&self, cutoff: &str) -> Result<usize> {
        let cutoff = cutoff.to_string();

        self.db
            .execute_async(move |conn| {
                let changed = conn.execute(
                    r#"
                    UPDATE assessment_jobs
                    SET status = 'pending', claimed_at = NULL
                    WHERE status = 'processing' AND claimed_at < ?1
                    "#,
                    [cutoff],
                )?;
                Ok(changed)
            })
            .await
    }

    /// Failed jobs that have used up their attempts, oldest first
    pub async fn list_exhausted_jobs(&self, max_attempts: u32) -> Result<Vec<AssessmentJobRecord>> {
        self.db
            .execute_async(move |conn| {
                let sql = format!(
                    r#"
                    SELECT {} FROM assessment_jobs
                    WHERE status = 'failed' AND attempts >= ?1
                    ORDER BY created_at ASC, id ASC
                    "#,
                    JOB_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let jobs = stmt
                    .query_map([max_attempts], parse_job_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(jobs)
            })
            .await
    }

    /// Put a failed job back to `pending` with a fresh attempt budget
    pub async fn reset_failed_job(&self, job_id: &str) -> Result<bool> {
        let job_id = job_id.to_string();

        self.db
            .execute_async(move |conn| {
                let changed = conn.execute(
                    r#"
                    UPDATE assessment_jobs
                    SET status = 'pending', attempts = 0, last_error = NULL,
                        claimed_at = NULL, finished_at = NULL
                    WHERE id = ?1 AND status = 'failed'
                    "#,
                    [job_id],
                )?;
                Ok(changed == 1)
            })
            .await
    }

    /// Job counts, splitting failures by whether they will be retried
    pub async fn job_counts(&self, max_attempts: u32) -> Result<JobCounts> {
        self.db
            .execute_async(move |conn| {
                let counts = conn.query_row(
                    r#"
                    SELECT
                        COALESCE(SUM(status = 'pending'), 0),
                        COALESCE(SUM(status = 'processing'), 0),
                        COALESCE(SUM(status = 'done'), 0),
                        COALESCE(SUM(status = 'failed' AND attempts < ?1), 0),
                        COALESCE(SUM(status = 'failed' AND attempts >= ?1), 0)
                    FROM assessment_jobs
                    "#,
                    [max_attempts],
                    |row| {
                        Ok(JobCounts {
                            pending: row.get(0)?,
                            processing: row.get(1)?,
                            done: row.get(2)?,
                            retryable: row.get(3)?,
                            exhausted: row.get(4)?,
                        })
                    },
                )?;
                Ok(counts)
            })
            .await
    }
}
