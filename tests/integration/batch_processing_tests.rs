/*!
 * Integration tests for batch assessment processing
 */

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use storyguard::app_config::AssessmentSettings;
use storyguard::assessment::{Assessor, BatchOutcome, BatchProcessor, Scheduler};
use storyguard::database::models::{now_timestamp, AssessmentJobRecord, JobStatus, SubjectRef};
use storyguard::database::Repository;
use storyguard::validation::ValidationResult;
use storyguard::{ModerationError, ModerationResult};

use crate::common;

/// Records every job it sees, fails texts containing "throw", optionally slow
struct RecordingAssessor {
    seen: Mutex<Vec<String>>,
    delay: Duration,
}

impl RecordingAssessor {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            delay,
        })
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Assessor for RecordingAssessor {
    async fn assess(&self, job: &AssessmentJobRecord) -> ModerationResult<ValidationResult> {
        self.seen.lock().push(job.id.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if job.text.as_deref().is_some_and(|t| t.contains("throw")) {
            return Err(ModerationError::Persistence("assessor blew up".to_string()));
        }
        Ok(ValidationResult {
            passed: true,
            score: 0.9,
            flags: vec![],
            details: serde_json::json!({ "assessed_by": "test" }),
            created_at: now_timestamp(),
            result_id: None,
        })
    }
}

fn text_job(text: &str) -> AssessmentJobRecord {
    AssessmentJobRecord::new(None, Some(text.to_string()), None)
}

#[tokio::test]
async fn test_processBatch_threeJobsWithSecondThrowing_shouldReportTwoOneZero() -> Result<()> {
    let repo = Repository::new_in_memory()?;
    let assessor = RecordingAssessor::new(Duration::ZERO);
    let processor = BatchProcessor::new(repo.clone(), assessor.clone(), AssessmentSettings::default());

    let first = processor.enqueue_assessment(text_job("job one")).await?;
    let second = processor.enqueue_assessment(text_job("job two will throw")).await?;
    let third = processor.enqueue_assessment(text_job("job three")).await?;

    let outcome = processor.process_batch(10).await?;
    assert_eq!((outcome.processed, outcome.failed, outcome.remaining), (2, 1, 0));

    let failed = repo.get_job(&second).await?.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.attempts, 1);
    for id in [&first, &third] {
        assert_eq!(repo.get_job(id).await?.unwrap().status, JobStatus::Done);
    }
    Ok(())
}

#[tokio::test]
async fn test_concurrentBatches_shouldNeverProcessAJobTwice() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let db_path = temp_dir.path().join("jobs.db");
    let repo_a = Repository::new(storyguard::database::DatabaseConnection::new(&db_path)?);
    let repo_b = Repository::new(storyguard::database::DatabaseConnection::new(&db_path)?);

    let assessor = RecordingAssessor::new(Duration::from_millis(5));
    let worker_a = BatchProcessor::new(repo_a.clone(), assessor.clone(), AssessmentSettings::default());
    let worker_b = BatchProcessor::new(repo_b, assessor.clone(), AssessmentSettings::default());

    for i in 0..12 {
        worker_a.enqueue_assessment(text_job(&format!("job {}", i))).await?;
    }

    let (a, b) = tokio::join!(worker_a.process_batch(12), worker_b.process_batch(12));
    let (a, b) = (a?, b?);

    assert_eq!(a.processed + b.processed, 12);
    let seen = assessor.seen();
    let unique: HashSet<&String> = seen.iter().collect();
    assert_eq!(seen.len(), unique.len(), "a job was assessed twice");
    assert_eq!(repo_a.job_counts(3).await?.done, 12);
    Ok(())
}

#[tokio::test]
async fn test_reclaimDuringSlowAssessment_shouldKeepOnlyNewClaimResult() -> Result<()> {
    let repo = Repository::new_in_memory()?;
    common::seed_work(&repo, false).await?;
    let subject = SubjectRef::Section("s1".to_string());

    // Every claim looks stale immediately
    let settings = AssessmentSettings {
        stale_after_secs: 0,
        ..Default::default()
    };
    let assessor = RecordingAssessor::new(Duration::from_millis(300));
    let worker_a = BatchProcessor::new(repo.clone(), assessor.clone(), settings.clone());
    let worker_b = BatchProcessor::new(repo.clone(), assessor.clone(), settings);

    let job_id = worker_a
        .enqueue_assessment(AssessmentJobRecord::new(
            Some(subject.clone()),
            Some(common::sample_chapter()),
            None,
        ))
        .await?;

    let late_run = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let reclaimed = worker_b.reclaim_stale().await?;
        let outcome = worker_b.process_batch(5).await?;
        anyhow::Ok((reclaimed, outcome))
    };
    let (a, late) = tokio::join!(worker_a.process_batch(5), late_run);
    let (a, (reclaimed, b)) = (a?, late?);

    assert_eq!(reclaimed, 1);
    assert_eq!(assessor.seen().len(), 2);
    assert_eq!((a.processed, a.failed, a.superseded), (0, 0, 1));
    assert_eq!((b.processed, b.failed, b.superseded), (1, 0, 0));

    let job = repo.get_job(&job_id).await?.unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.attempts, 0);
    assert_eq!(repo.get_validation_results(&subject).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_processBatch_shouldStoreVerdictForSubjectJobs() -> Result<()> {
    let controller = common::seeded_controller().await?;
    let subject = SubjectRef::Section("s1".to_string());
    let job = AssessmentJobRecord::new(Some(subject.clone()), Some(common::sample_chapter()), None);
    controller.processor().enqueue_assessment(job).await?;

    let outcome = controller.processor().process_batch(5).await?;
    assert_eq!(outcome.processed, 1);

    let results = controller.engine().results_for(&subject).await?;
    assert_eq!(results.len(), 1);
    assert!(results[0].passed);
    Ok(())
}

#[tokio::test]
async fn test_processBatch_withSmallMax_shouldLeaveRemainder() -> Result<()> {
    let repo = Repository::new_in_memory()?;
    let processor = BatchProcessor::new(
        repo,
        RecordingAssessor::new(Duration::ZERO),
        AssessmentSettings::default(),
    );
    for i in 0..5 {
        processor.enqueue_assessment(text_job(&format!("job {}", i))).await?;
    }

    let outcome = processor.process_batch(2).await?;
    assert_eq!(outcome, BatchOutcome { processed: 2, remaining: 3, ..Default::default() });
    Ok(())
}

#[tokio::test]
async fn test_processBatchWithToken_shouldCheckSharedSecret() -> Result<()> {
    let settings = AssessmentSettings {
        scheduler_token: "s3cret".to_string(),
        ..Default::default()
    };
    let processor = BatchProcessor::new(
        Repository::new_in_memory()?,
        RecordingAssessor::new(Duration::ZERO),
        settings,
    );

    let refused = processor.process_batch_with_token("guess", 10).await;
    assert!(matches!(refused, Err(ModerationError::Authorization(_))));
    assert!(processor.process_batch_with_token("s3cret", 10).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_processBatchWithToken_withoutConfiguredToken_shouldBeDisabled() -> Result<()> {
    let processor = BatchProcessor::new(
        Repository::new_in_memory()?,
        RecordingAssessor::new(Duration::ZERO),
        AssessmentSettings::default(),
    );
    let result = processor.process_batch_with_token("", 10).await;
    assert!(matches!(result, Err(ModerationError::Authorization(_))));
    Ok(())
}

#[tokio::test]
async fn test_exhaustedJob_shouldBeTriagedAndReset() -> Result<()> {
    let settings = AssessmentSettings {
        max_attempts: 1,
        ..Default::default()
    };
    let repo = Repository::new_in_memory()?;
    let processor = BatchProcessor::new(repo.clone(), RecordingAssessor::new(Duration::ZERO), settings);
    let job_id = processor.enqueue_assessment(text_job("always throw")).await?;

    let outcome = processor.process_batch(10).await?;
    assert_eq!(outcome.exhausted, 1);

    let triage = processor.failed_for_triage(&common::moderator()).await?;
    assert_eq!(triage.len(), 1);
    assert!(processor.failed_for_triage(&common::reader("r1")).await.is_err());

    let reset = processor.reset_job(&common::moderator(), &job_id).await?;
    assert_eq!(reset.status, JobStatus::Pending);
    assert_eq!(reset.attempts, 0);
    Ok(())
}

#[tokio::test]
async fn test_enqueueAssessment_withoutContent_shouldFailValidation() -> Result<()> {
    let processor = BatchProcessor::new(
        Repository::new_in_memory()?,
        RecordingAssessor::new(Duration::ZERO),
        AssessmentSettings::default(),
    );
    let result = processor
        .enqueue_assessment(AssessmentJobRecord::new(None, Some("  ".to_string()), None))
        .await;
    assert!(matches!(result, Err(ModerationError::Validation(_))));
    Ok(())
}

#[tokio::test]
async fn test_schedulerTick_shouldCatchUpInBoundedRuns() -> Result<()> {
    let settings = AssessmentSettings {
        batch_size: 2,
        max_catchup_runs: 1,
        ..Default::default()
    };
    let processor = Arc::new(BatchProcessor::new(
        Repository::new_in_memory()?,
        RecordingAssessor::new(Duration::ZERO),
        settings,
    ));
    for i in 0..7 {
        processor.enqueue_assessment(text_job(&format!("job {}", i))).await?;
    }

    let summary = Scheduler::new(processor).tick().await;
    assert_eq!(summary.runs, 2);
    assert_eq!(summary.processed, 4);
    assert_eq!(summary.remaining, 3);
    Ok(())
}

#[tokio::test]
async fn test_schedulerRun_shouldStopOnShutdown() -> Result<()> {
    let processor = Arc::new(BatchProcessor::new(
        Repository::new_in_memory()?,
        RecordingAssessor::new(Duration::ZERO),
        AssessmentSettings::default(),
    ));
    processor.enqueue_assessment(text_job("job")).await?;

    let scheduler = Scheduler::new(processor.clone()).with_interval(Duration::from_millis(10));
    let ticks = scheduler
        .run(tokio::time::sleep(Duration::from_millis(55)))
        .await;

    assert!(ticks >= 1);
    let outcome = processor.process_batch(10).await?;
    assert_eq!(outcome.remaining, 0);
    Ok(())
}
