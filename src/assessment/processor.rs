/*!
 * Batch processor for quality-assessment jobs.
 *
 * Jobs move `pending -> processing -> done | failed`. A failed job is
 * claimable again until it has used `max_attempts` attempts, after which it
 * waits for manual triage. Each job is claimed with a conditional update,
 * so concurrent invocations never process the same attempt twice. Completion
 * and failure are conditional on that claim: a run whose job was reclaimed
 * as stale drops its result instead of overwriting the newer run.
 */

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::access::Actor;
use crate::app_config::AssessmentSettings;
use crate::database::models::{timestamp, AssessmentJobRecord, JobStatus};
use crate::database::{JobCounts, Repository};
use crate::errors::{ModerationError, ModerationResult};
use crate::validation::{ValidationContent, ValidationEngine, ValidationOptions, ValidationResult};

/// Performs the assessment of one job
#[async_trait]
pub trait Assessor: Send + Sync {
    async fn assess(&self, job: &AssessmentJobRecord) -> ModerationResult<ValidationResult>;
}

#[async_trait]
impl Assessor for ValidationEngine {
    async fn assess(&self, job: &AssessmentJobRecord) -> ModerationResult<ValidationResult> {
        let content = ValidationContent {
            text: job.text.clone(),
            image_url: job.image_url.clone(),
            target: job.subject.clone(),
        };
        let mut options = ValidationOptions::default().dry_run();
        options.is_first_chapter = job.is_first_chapter;

        // The processor stores the verdict together with the job transition
        self.validate(&content, options).await
    }
}

/// Result of one batch invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Jobs completed by this invocation
    pub processed: usize,
    /// Jobs that failed in this invocation
    pub failed: usize,
    /// Jobs whose claim was taken over by another run; result dropped
    #[serde(default)]
    pub superseded: usize,
    /// Jobs still `pending` afterwards
    pub remaining: i64,
    /// Failed jobs that will be retried
    pub retryable: i64,
    /// Failed jobs waiting for manual triage
    pub exhausted: i64,
}

/// Drains the assessment backlog
pub struct BatchProcessor {
    repo: Repository,
    assessor: Arc<dyn Assessor>,
    settings: AssessmentSettings,
}

impl BatchProcessor {
    pub fn new(repo: Repository, assessor: Arc<dyn Assessor>, settings: AssessmentSettings) -> Self {
        Self {
            repo,
            assessor,
            settings,
        }
    }

    pub fn settings(&self) -> &AssessmentSettings {
        &self.settings
    }

    /// Add a job to the backlog
    pub async fn enqueue_assessment(&self, job: AssessmentJobRecord) -> ModerationResult<String> {
        let has_text = job.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        if !has_text && job.image_url.is_none() {
            return Err(ModerationError::Validation(
                "assessment job needs text or an image".to_string(),
            ));
        }
        self.repo.insert_job(&job).await?;
        debug!("Queued assessment job {}", job.id);
        Ok(job.id)
    }

    /// Process up to `max_count` claimable jobs in FIFO order
    pub async fn process_batch(&self, max_count: usize) -> ModerationResult<BatchOutcome> {
        let started = Instant::now();
        let budget = Duration::from_secs(self.settings.time_budget_secs);
        let max_attempts = self.settings.max_attempts;
        let mut outcome = BatchOutcome::default();

        let candidates = self.repo.list_claimable_job_ids(max_count, max_attempts).await?;
        debug!("Batch: {} candidate jobs", candidates.len());

        for job_id in candidates {
            if started.elapsed() >= budget {
                info!("Batch time budget of {:?} used up; leaving the rest for the next run", budget);
                break;
            }

            let job = match self.repo.claim_job(&job_id, max_attempts).await {
                Ok(Some(job)) => job,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Could not claim job {}: {:#}", job_id, e);
                    continue;
                }
            };

            match self.run_job(&job).await {
                JobRun::Done => outcome.processed += 1,
                JobRun::Failed => outcome.failed += 1,
                JobRun::Superseded => outcome.superseded += 1,
            }
        }

        let counts = self.repo.job_counts(max_attempts).await?;
        outcome.remaining = counts.pending;
        outcome.retryable = counts.retryable;
        outcome.exhausted = counts.exhausted;

        info!(
            "Batch finished in {:?}: {} processed, {} failed, {} remaining",
            started.elapsed(),
            outcome.processed,
            outcome.failed,
            outcome.remaining
        );
        Ok(outcome)
    }

    /// External trigger guarded by the shared scheduler token
    pub async fn process_batch_with_token(
        &self,
        token: &str,
        max_count: usize,
    ) -> ModerationResult<BatchOutcome> {
        if self.settings.scheduler_token.is_empty() {
            return Err(ModerationError::Authorization(
                "external batch triggers are disabled".to_string(),
            ));
        }
        if Sha256::digest(token.as_bytes()) != Sha256::digest(self.settings.scheduler_token.as_bytes()) {
            warn!("Rejected batch trigger with an invalid token");
            return Err(ModerationError::Authorization("invalid scheduler token".to_string()));
        }
        self.process_batch(max_count).await
    }

    /// Return jobs left in `processing` by interrupted runs to `pending`
    pub async fn reclaim_stale(&self) -> ModerationResult<usize> {
        let stale_after = chrono::Duration::seconds(self.settings.stale_after_secs as i64);
        let cutoff = timestamp(Utc::now() - stale_after);
        let reclaimed = self.repo.reclaim_stale_jobs(&cutoff).await?;
        if reclaimed > 0 {
            warn!("Reclaimed {} stale assessment jobs", reclaimed);
        }
        Ok(reclaimed)
    }

    /// Jobs out of attempts, for moderators to inspect
    pub async fn failed_for_triage(&self, actor: &Actor) -> ModerationResult<Vec<AssessmentJobRecord>> {
        actor.require_moderator()?;
        Ok(self.repo.list_exhausted_jobs(self.settings.max_attempts).await?)
    }

    /// Give a failed job a fresh attempt budget
    pub async fn reset_job(&self, actor: &Actor, job_id: &str) -> ModerationResult<AssessmentJobRecord> {
        actor.require_moderator()?;
        let job = self
            .repo
            .get_job(job_id)
            .await?
            .ok_or_else(|| ModerationError::not_found("assessment job", job_id))?;

        if job.status != JobStatus::Failed || !self.repo.reset_failed_job(job_id).await? {
            return Err(ModerationError::InvalidTransition {
                entity: "assessment job",
                id: job_id.to_string(),
                from: job.status.to_string(),
                action: "reset".to_string(),
            });
        }
        info!("Job {} reset by {}", job_id, actor.user_id);

        self.repo
            .get_job(job_id)
            .await?
            .ok_or_else(|| ModerationError::not_found("assessment job", job_id))
    }

    pub async fn assessment_stats(&self, actor: &Actor) -> ModerationResult<JobCounts> {
        actor.require_moderator()?;
        Ok(self.repo.job_counts(self.settings.max_attempts).await?)
    }

    /// Run one claimed job under the claim it was handed
    async fn run_job(&self, job: &AssessmentJobRecord) -> JobRun {
        let claim = job.claimed_at.as_deref();
        let error = match self.assessor.assess(job).await {
            Ok(result) => {
                let record = job.subject.clone().map(|subject| result.to_record(subject));
                match self.repo.complete_job(&job.id, claim, record).await {
                    Ok(true) => {
                        debug!("Job {} done (passed={})", job.id, result.passed);
                        return JobRun::Done;
                    }
                    Ok(false) => {
                        warn!("Job {} was reclaimed while running; result dropped", job.id);
                        return JobRun::Superseded;
                    }
                    Err(e) => format!("{:#}", e),
                }
            }
            Err(e) => e.to_string(),
        };

        match self.repo.fail_job(&job.id, claim, &error).await {
            Ok(Some(attempts)) if attempts >= self.settings.max_attempts => {
                error!(
                    "Job {} failed permanently after {} attempts: {}",
                    job.id, attempts, error
                );
            }
            Ok(Some(attempts)) => {
                warn!("Job {} failed (attempt {}): {}", job.id, attempts, error);
            }
            Ok(None) => {
                warn!("Job {} was reclaimed while running; failure dropped: {}", job.id, error);
                return JobRun::Superseded;
            }
            Err(e) => error!("Could not record failure of job {}: {:#}", job.id, e),
        }
        JobRun::Failed
    }
}

/// How a claimed job ended for this run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobRun {
    Done,
    Failed,
    /// Another run holds a newer claim on the job
    Superseded,
}
