/*!
 * Moderation queue state machine.
 *
 * ```text
 * queued --approve--> approved   (subject -> published)
 * queued --reject---> rejected   (subject -> draft)
 * queued --flag-----> queued     (note appended, flagged)
 * ```
 *
 * `approved` and `rejected` are terminal. A rejected subject is resubmitted
 * through a new entry. Entries are never deleted.
 */

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::access::Actor;
use crate::app_config::ModerationSettings;
use crate::database::models::{Priority, PublishStatus, QueueEntryRecord, QueueStatus, SubjectRef};
use crate::database::{QueueCounts, Repository, ReviewApplied};
use crate::errors::{ModerationError, ModerationResult};

/// Moderator decision on a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
    /// Annotate without resolving
    Flag,
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewAction::Approve => write!(f, "approve"),
            ReviewAction::Reject => write!(f, "reject"),
            ReviewAction::Flag => write!(f, "flag"),
        }
    }
}

impl std::str::FromStr for ReviewAction {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approve" => Ok(ReviewAction::Approve),
            "reject" => Ok(ReviewAction::Reject),
            "flag" => Ok(ReviewAction::Flag),
            _ => Err(ModerationError::Validation(format!("unknown review action: {}", s))),
        }
    }
}

/// What a review action does to a queued entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    /// Terminal: entry status plus the cascade onto the subject
    Resolve {
        entry: QueueStatus,
        subject: PublishStatus,
    },
    Annotate,
}

impl ReviewAction {
    fn transition(self) -> Transition {
        match self {
            ReviewAction::Approve => Transition::Resolve {
                entry: QueueStatus::Approved,
                subject: PublishStatus::Published,
            },
            ReviewAction::Reject => Transition::Resolve {
                entry: QueueStatus::Rejected,
                subject: PublishStatus::Draft,
            },
            ReviewAction::Flag => Transition::Annotate,
        }
    }
}

/// Moderation queue service
#[derive(Clone)]
pub struct ModerationQueue {
    repo: Repository,
    settings: ModerationSettings,
}

impl ModerationQueue {
    pub fn new(repo: Repository, settings: ModerationSettings) -> Self {
        Self { repo, settings }
    }

    /// Queue a work or section for review and mark it `pending_review`
    pub async fn enqueue_for_moderation(
        &self,
        subject: SubjectRef,
        priority: Priority,
    ) -> ModerationResult<String> {
        let entry = QueueEntryRecord::new(subject, priority);
        if !self.repo.enqueue_entry(&entry).await? {
            return Err(ModerationError::not_found(entry.subject.kind(), entry.subject.id()));
        }
        info!("Queued {} for moderation ({} priority)", entry.subject, entry.priority);
        Ok(entry.id)
    }

    /// Apply a moderator decision to a queued entry
    pub async fn review_item(
        &self,
        actor: &Actor,
        entry_id: &str,
        action: ReviewAction,
        notes: Option<String>,
    ) -> ModerationResult<QueueEntryRecord> {
        actor.require_moderator()?;
        let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

        let entry = self.load(entry_id).await?;
        if entry.status.is_terminal() {
            return Err(invalid_transition(&entry, action));
        }

        match action.transition() {
            Transition::Annotate => {
                if !self.repo.flag_entry(entry_id, notes).await? {
                    return Err(self.lost_race(entry_id, action).await);
                }
                info!("Entry {} flagged by {}", entry_id, actor.user_id);
                self.load(entry_id).await
            }
            Transition::Resolve { entry: status, subject } => {
                if action == ReviewAction::Approve && self.settings.require_fresh_validation {
                    self.require_fresh_validation(&entry).await?;
                }

                match self
                    .repo
                    .apply_review(entry_id, status, subject, &actor.user_id, notes)
                    .await?
                {
                    ReviewApplied::Applied(updated) => {
                        info!(
                            "Entry {} {} by {}; {} is now {}",
                            entry_id, updated.status, actor.user_id, updated.subject, subject
                        );
                        Ok(updated)
                    }
                    ReviewApplied::NotQueued => Err(self.lost_race(entry_id, action).await),
                    ReviewApplied::SubjectMissing => Err(ModerationError::not_found(
                        entry.subject.kind(),
                        entry.subject.id(),
                    )),
                }
            }
        }
    }

    /// Queued entries in review order: priority descending, then oldest first
    pub async fn list_queued(&self, actor: &Actor, limit: usize) -> ModerationResult<Vec<QueueEntryRecord>> {
        actor.require_moderator()?;
        Ok(self.repo.list_queued_entries(limit).await?)
    }

    pub async fn get_entry(&self, actor: &Actor, entry_id: &str) -> ModerationResult<QueueEntryRecord> {
        actor.require_moderator()?;
        self.load(entry_id).await
    }

    /// Every entry ever created for a subject, newest first
    pub async fn history_for(
        &self,
        actor: &Actor,
        subject: &SubjectRef,
    ) -> ModerationResult<Vec<QueueEntryRecord>> {
        actor.require_moderator()?;
        Ok(self.repo.list_entries_for_subject(subject).await?)
    }

    pub async fn queue_stats(&self, actor: &Actor) -> ModerationResult<QueueCounts> {
        actor.require_moderator()?;
        Ok(self.repo.queue_counts().await?)
    }

    async fn load(&self, entry_id: &str) -> ModerationResult<QueueEntryRecord> {
        self.repo
            .get_queue_entry(entry_id)
            .await?
            .ok_or_else(|| ModerationError::not_found("queue entry", entry_id))
    }

    async fn require_fresh_validation(&self, entry: &QueueEntryRecord) -> ModerationResult<()> {
        if self
            .repo
            .has_passing_result_since(&entry.subject, &entry.created_at)
            .await?
        {
            return Ok(());
        }
        debug!("No passing validation for {} since {}", entry.subject, entry.created_at);
        Err(ModerationError::Validation(format!(
            "{} has no passing validation since it was queued",
            entry.subject
        )))
    }

    /// Error for a conditional update that matched nothing
    async fn lost_race(&self, entry_id: &str, action: ReviewAction) -> ModerationError {
        match self.repo.get_queue_entry(entry_id).await {
            Ok(Some(current)) => invalid_transition(&current, action),
            Ok(None) => ModerationError::not_found("queue entry", entry_id),
            Err(e) => e.into(),
        }
    }
}

fn invalid_transition(entry: &QueueEntryRecord, action: ReviewAction) -> ModerationError {
    ModerationError::InvalidTransition {
        entity: "queue entry",
        id: entry.id.clone(),
        from: entry.status.to_string(),
        action: action.to_string(),
    }
}
