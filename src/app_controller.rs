use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::access::Actor;
use crate::app_config::Config;
use crate::assessment::{BatchProcessor, Scheduler};
use crate::database::{DatabaseConnection, DatabaseStats, JobCounts, QueueCounts, Repository};
use crate::errors::ModerationResult;
use crate::fan_content::{DealService, RatingAggregator, VariantCatalog};
use crate::moderation::ModerationQueue;
use crate::providers::http::{HttpImageSafetyChecker, HttpSimilarityChecker};
use crate::providers::{ImageSafetyChecker, SimilarityChecker, Unconfigured};
use crate::rules::{RuleAdmin, RuleCache, RuleCacheStats, RuleStore};
use crate::validation::{ValidationContent, ValidationEngine, ValidationOptions, ValidationResult};

/// Combined counters for operators
#[derive(Debug, Clone)]
pub struct ServiceStats {
    pub rule_cache: RuleCacheStats,
    pub queue: QueueCounts,
    pub jobs: JobCounts,
    pub database: DatabaseStats,
}

impl fmt::Display for ServiceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Rule cache: generation {}, {} rules cached, {} hits, {} reloads",
            self.rule_cache.generation,
            self.rule_cache.cached_rules,
            self.rule_cache.hits,
            self.rule_cache.reloads
        )?;
        let by_priority = self
            .queue
            .queued_by_priority
            .iter()
            .map(|(priority, count)| format!("{} {}", count, priority))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(
            f,
            "Queue: {} queued ({}), {} approved, {} rejected, {} flagged",
            self.queue.queued, by_priority, self.queue.approved, self.queue.rejected, self.queue.flagged
        )?;
        writeln!(
            f,
            "Jobs: {} pending, {} processing, {} done, {} retryable, {} exhausted",
            self.jobs.pending, self.jobs.processing, self.jobs.done, self.jobs.retryable, self.jobs.exhausted
        )?;
        write!(f, "Database: {}", self.database)
    }
}

/// Wires configuration, storage and services together
pub struct Controller {
    config: Config,
    repo: Repository,
    rule_cache: Arc<RuleCache>,
    rule_admin: RuleAdmin,
    engine: Arc<ValidationEngine>,
    queue: ModerationQueue,
    processor: Arc<BatchProcessor>,
    variants: VariantCatalog,
    ratings: RatingAggregator,
    deals: DealService,
}

impl Controller {
    /// Create a controller over an in-memory database with default configuration
    pub fn new_for_test() -> Result<Self> {
        Self::new_in_memory(Config::default())
    }

    /// Open the configured database and collaborator clients
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;

        let db = match &config.database_path {
            Some(path) => DatabaseConnection::new(path)?,
            None => DatabaseConnection::new_default()?,
        };
        info!("Using database at {}", db.path().display());

        let similarity: Arc<dyn SimilarityChecker> =
            match HttpSimilarityChecker::from_settings(&config.collaborators)? {
                Some(client) => Arc::new(client),
                None => {
                    warn!("No similarity service configured; originality checks will be reported unavailable");
                    Arc::new(Unconfigured)
                }
            };
        let image: Arc<dyn ImageSafetyChecker> =
            match HttpImageSafetyChecker::from_settings(&config.collaborators)? {
                Some(client) => Arc::new(client),
                None => {
                    debug!("No image-analysis service configured");
                    Arc::new(Unconfigured)
                }
            };

        Ok(Self::with_collaborators(config, Repository::new(db), similarity, image))
    }

    /// In-memory database, no external collaborators
    pub fn new_in_memory(config: Config) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        Ok(Self::with_collaborators(
            config,
            Repository::new_in_memory()?,
            Arc::new(Unconfigured),
            Arc::new(Unconfigured),
        ))
    }

    /// Assemble services over an existing repository and collaborators
    pub fn with_collaborators(
        config: Config,
        repo: Repository,
        similarity: Arc<dyn SimilarityChecker>,
        image: Arc<dyn ImageSafetyChecker>,
    ) -> Self {
        let store: Arc<dyn RuleStore> = Arc::new(repo.clone());
        let ttl = config.rule_cache.ttl_secs.map(Duration::from_secs);
        let rule_cache = Arc::new(RuleCache::with_ttl(store, ttl));

        let engine = Arc::new(ValidationEngine::new(
            rule_cache.clone(),
            similarity,
            image,
            repo.clone(),
            config.validation.clone(),
        ));
        let processor = Arc::new(BatchProcessor::new(
            repo.clone(),
            engine.clone(),
            config.assessment.clone(),
        ));

        Self {
            rule_admin: RuleAdmin::new(rule_cache.clone()),
            queue: ModerationQueue::new(repo.clone(), config.moderation.clone()),
            variants: VariantCatalog::new(repo.clone()),
            ratings: RatingAggregator::new(repo.clone()),
            deals: DealService::new(repo.clone()),
            config,
            repo,
            rule_cache,
            engine,
            processor,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn rule_cache(&self) -> &Arc<RuleCache> {
        &self.rule_cache
    }

    pub fn rule_admin(&self) -> &RuleAdmin {
        &self.rule_admin
    }

    pub fn engine(&self) -> &Arc<ValidationEngine> {
        &self.engine
    }

    pub fn queue(&self) -> &ModerationQueue {
        &self.queue
    }

    pub fn processor(&self) -> &Arc<BatchProcessor> {
        &self.processor
    }

    /// A scheduler driving this controller's batch processor
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.processor.clone())
    }

    pub fn variants(&self) -> &VariantCatalog {
        &self.variants
    }

    pub fn ratings(&self) -> &RatingAggregator {
        &self.ratings
    }

    pub fn deals(&self) -> &DealService {
        &self.deals
    }

    /// Validate free text without recording anything
    pub async fn dry_run(
        &self,
        text: &str,
        image_url: Option<String>,
        is_first_chapter: bool,
    ) -> ModerationResult<ValidationResult> {
        let mut content = ValidationContent::text(text);
        if let Some(url) = image_url {
            content = content.with_image(url);
        }
        let mut options = ValidationOptions::default().dry_run();
        options.is_first_chapter = is_first_chapter;
        self.engine.validate(&content, options).await
    }

    pub async fn stats(&self, actor: &Actor) -> ModerationResult<ServiceStats> {
        let queue = self.queue.queue_stats(actor).await?;
        let jobs = self.processor.assessment_stats(actor).await?;
        Ok(ServiceStats {
            rule_cache: self.rule_cache.stats(),
            queue,
            jobs,
            database: self.repo.connection().stats().await?,
        })
    }
}
