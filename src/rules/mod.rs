/*!
 * Validation rules: model, store seam, cache and administration.
 *
 * - `model`: typed rule definitions and compiled matchers
 * - `cache`: generation-counted snapshot cache of active rules
 * - `admin`: rule CRUD that invalidates the cache before returning
 * - `memory`: an in-process `RuleStore` for tests and dry runs
 */

use anyhow::Result;
use async_trait::async_trait;

pub mod admin;
pub mod cache;
pub mod memory;
pub mod model;

pub use admin::{ImportSummary, RuleAdmin, RuleDefinition};
pub use cache::{RuleCache, RuleCacheStats, RuleSnapshot};
pub use memory::InMemoryRuleStore;
pub use model::{
    CompiledRule, MatchMode, MaturityRating, PlagiarismRuleConfig, QualityRuleConfig, RuleConfig,
    RuleType, SafetyRuleConfig, Severity, ValidationRule,
};

/// Returned (inside `anyhow::Error`) by `RuleStore::create` when the name is taken
#[derive(Debug, thiserror::Error)]
#[error("a rule named '{0}' already exists")]
pub struct DuplicateRuleName(pub String);

/// Persistent storage of validation rules
///
/// The SQLite repository is the production implementation; tests can
/// substitute `InMemoryRuleStore` or their own fake.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Active rules, optionally of one type
    async fn list_active(&self, rule_type: Option<RuleType>) -> Result<Vec<ValidationRule>>;

    /// Every rule, active or not
    async fn list_all(&self) -> Result<Vec<ValidationRule>>;

    async fn get(&self, id: &str) -> Result<Option<ValidationRule>>;

    async fn find_by_name(&self, name: &str) -> Result<Option<ValidationRule>>;

    async fn create(&self, rule: &ValidationRule) -> Result<()>;

    /// Returns false when no rule has the given id
    async fn update(&self, rule: &ValidationRule) -> Result<bool>;

    /// Returns false when no rule has the given id
    async fn delete(&self, id: &str) -> Result<bool>;
}
