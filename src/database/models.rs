/*!
 * Database entity models.
 *
 * These structures map directly to database tables and provide
 * type-safe access to persisted data.
 */

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Format a timestamp so that lexical order equals chronological order
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time in storage format
pub fn now_timestamp() -> String {
    timestamp(Utc::now())
}

/// Parse a stored timestamp
pub fn parse_timestamp(value: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

/// Reference to a moderated subject: a whole work or one section (chapter)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SubjectRef {
    Work(String),
    Section(String),
}

impl SubjectRef {
    pub fn kind(&self) -> &'static str {
        match self {
            SubjectRef::Work(_) => "work",
            SubjectRef::Section(_) => "section",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SubjectRef::Work(id) | SubjectRef::Section(id) => id,
        }
    }

    /// Rebuild from the stored (kind, id) columns
    pub fn from_parts(kind: &str, id: String) -> anyhow::Result<Self> {
        match kind {
            "work" => Ok(SubjectRef::Work(id)),
            "section" => Ok(SubjectRef::Section(id)),
            _ => Err(anyhow::anyhow!("Invalid subject kind: {}", kind)),
        }
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// Publish status of a work or section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Draft,
    PendingReview,
    Published,
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishStatus::Draft => write!(f, "draft"),
            PublishStatus::PendingReview => write!(f, "pending_review"),
            PublishStatus::Published => write!(f, "published"),
        }
    }
}

impl std::str::FromStr for PublishStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(PublishStatus::Draft),
            "pending_review" => Ok(PublishStatus::PendingReview),
            "published" => Ok(PublishStatus::Published),
            _ => Err(anyhow::anyhow!("Invalid publish status: {}", s)),
        }
    }
}

/// A serialized work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkRecord {
    pub id: String,
    /// Creator who owns the work
    pub owner_id: String,
    pub title: String,
    pub status: PublishStatus,
    /// Fan content for this work needs a creator-approved deal
    pub require_deal_approval: bool,
    pub published_at: Option<String>,
    pub created_at: String,
}

impl WorkRecord {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            title: title.into(),
            status: PublishStatus::Draft,
            require_deal_approval: false,
            published_at: None,
            created_at: now_timestamp(),
        }
    }
}

/// A section (chapter) of a work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionRecord {
    pub id: String,
    pub work_id: String,
    pub title: String,
    pub status: PublishStatus,
    pub published_at: Option<String>,
    pub created_at: String,
}

impl SectionRecord {
    pub fn new(id: impl Into<String>, work_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            work_id: work_id.into(),
            title: title.into(),
            status: PublishStatus::Draft,
            published_at: None,
            created_at: now_timestamp(),
        }
    }
}

/// Moderation queue entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Queued,
    Approved,
    Rejected,
}

impl QueueStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, QueueStatus::Queued)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueStatus::Queued => write!(f, "queued"),
            QueueStatus::Approved => write!(f, "approved"),
            QueueStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(QueueStatus::Queued),
            "approved" => Ok(QueueStatus::Approved),
            "rejected" => Ok(QueueStatus::Rejected),
            _ => Err(anyhow::anyhow!("Invalid queue status: {}", s)),
        }
    }
}

/// Review priority, ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Numeric rank stored alongside the entry for ordering
    pub fn rank(&self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Urgent => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Urgent => write!(f, "urgent"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            _ => Err(anyhow::anyhow!("Invalid priority: {}", s)),
        }
    }
}

/// Moderation queue entry record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntryRecord {
    pub id: String,
    pub subject: SubjectRef,
    pub status: QueueStatus,
    pub priority: Priority,
    /// Set when a moderator flagged the entry without resolving it
    pub flagged: bool,
    pub notes: Option<String>,
    pub reviewed_by: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl QueueEntryRecord {
    pub fn new(subject: SubjectRef, priority: Priority) -> Self {
        Self::created_at(subject, priority, Utc::now())
    }

    /// Entry with an explicit creation time
    pub fn created_at(subject: SubjectRef, priority: Priority, at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject,
            status: QueueStatus::Queued,
            priority,
            flagged: false,
            notes: None,
            reviewed_by: None,
            created_at: timestamp(at),
            completed_at: None,
        }
    }
}

/// Quality-assessment job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// A unit of automated quality assessment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentJobRecord {
    pub id: String,
    pub subject: Option<SubjectRef>,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub is_first_chapter: bool,
    pub status: JobStatus,
    /// Failed attempts so far
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: String,
    pub claimed_at: Option<String>,
    pub finished_at: Option<String>,
}

impl AssessmentJobRecord {
    pub fn new(subject: Option<SubjectRef>, text: Option<String>, image_url: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject,
            text,
            image_url,
            is_first_chapter: false,
            status: JobStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now_timestamp(),
            claimed_at: None,
            finished_at: None,
        }
    }

    pub fn first_chapter(mut self) -> Self {
        self.is_first_chapter = true;
        self
    }
}

/// Persisted validation verdict (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResultRecord {
    pub id: i64,
    pub subject: SubjectRef,
    pub passed: bool,
    pub score: f64,
    pub flags: Vec<String>,
    pub details: serde_json::Value,
    pub created_at: String,
}

/// Fan content kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    Translation,
    Audiobook,
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantKind::Translation => write!(f, "translation"),
            VariantKind::Audiobook => write!(f, "audiobook"),
        }
    }
}

impl std::str::FromStr for VariantKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "translation" => Ok(VariantKind::Translation),
            "audiobook" => Ok(VariantKind::Audiobook),
            _ => Err(anyhow::anyhow!("Invalid variant kind: {}", s)),
        }
    }
}

/// Fan content lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantStatus {
    /// Waiting for the creator to decide on the revenue-share deal
    PendingDeal,
    Active,
    Rejected,
}

impl fmt::Display for VariantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantStatus::PendingDeal => write!(f, "pending_deal"),
            VariantStatus::Active => write!(f, "active"),
            VariantStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for VariantStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending_deal" => Ok(VariantStatus::PendingDeal),
            "active" => Ok(VariantStatus::Active),
            "rejected" => Ok(VariantStatus::Rejected),
            _ => Err(anyhow::anyhow!("Invalid variant status: {}", s)),
        }
    }
}

/// Rolling vote aggregates of a variant
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RatingAggregate {
    pub readability_avg: f64,
    pub comprehension_avg: f64,
    pub polish_avg: f64,
    pub quality_overall: f64,
    pub rating_count: i64,
}

/// A fan translation or audiobook of one section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantRecord {
    pub id: String,
    pub kind: VariantKind,
    pub work_id: String,
    pub section_id: String,
    /// ISO 639-2/T language code
    pub language: String,
    pub contributor_id: String,
    pub status: VariantStatus,
    pub is_default: bool,
    pub aggregate: RatingAggregate,
    pub created_at: String,
}

/// One user's vote on one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub user_id: String,
    pub variant_id: String,
    pub readability: u8,
    pub comprehension: u8,
    pub polish: u8,
    pub created_at: String,
    pub updated_at: String,
}

/// Revenue-share deal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    PendingCreator,
    Active,
    Rejected,
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DealStatus::PendingCreator => write!(f, "pending_creator"),
            DealStatus::Active => write!(f, "active"),
            DealStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for DealStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending_creator" => Ok(DealStatus::PendingCreator),
            "active" => Ok(DealStatus::Active),
            "rejected" => Ok(DealStatus::Rejected),
            _ => Err(anyhow::anyhow!("Invalid deal status: {}", s)),
        }
    }
}

/// Tier 3 revenue-share deal gating a fan contribution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealRecord {
    pub id: String,
    pub work_id: String,
    pub variant_id: String,
    /// The only actor allowed to decide the deal
    pub creator_id: String,
    pub contributor_id: String,
    pub content_type: VariantKind,
    pub revenue_share_percent: f64,
    pub status: DealStatus,
    pub rejection_reason: Option<String>,
    pub created_at: String,
    pub accepted_at: Option<String>,
    pub decided_at: Option<String>,
}
