/*!
 * Administrative rule management.
 *
 * Every successful mutation invalidates the rule cache before returning,
 * so the next validation in this process sees the change.
 */

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::access::Actor;
use crate::errors::{ModerationError, ModerationResult};

use super::cache::RuleCache;
use super::model::{RuleConfig, Severity, ValidationRule};
use super::DuplicateRuleName;

/// A rule as written in an import file; the id is assigned on creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    pub severity: Severity,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub config: RuleConfig,
}

fn default_active() -> bool {
    true
}

/// Outcome of a bulk import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
}

/// Admin-facing rule operations
#[derive(Clone)]
pub struct RuleAdmin {
    cache: Arc<RuleCache>,
}

impl RuleAdmin {
    pub fn new(cache: Arc<RuleCache>) -> Self {
        Self { cache }
    }

    /// All rules including inactive ones
    pub async fn list_rules(&self, actor: &Actor) -> ModerationResult<Vec<ValidationRule>> {
        actor.require_admin()?;
        Ok(self.cache.store().list_all().await?)
    }

    pub async fn create_rule(
        &self,
        actor: &Actor,
        rule: ValidationRule,
    ) -> ModerationResult<ValidationRule> {
        actor.require_admin()?;
        check_rule(&rule)?;

        let store = self.cache.store();
        if store.find_by_name(&rule.name).await?.is_some() {
            return Err(ModerationError::Validation(format!(
                "a rule named '{}' already exists",
                rule.name
            )));
        }
        // A concurrent writer can still take the name between the check and the insert
        store.create(&rule).await.map_err(store_error)?;
        self.cache.invalidate();

        info!("Rule '{}' ({}) created by {}", rule.name, rule.rule_type(), actor.user_id);
        Ok(rule)
    }

    /// Replace the severity and parameters of an existing rule
    pub async fn update_rule(
        &self,
        actor: &Actor,
        rule_id: &str,
        severity: Severity,
        config: RuleConfig,
    ) -> ModerationResult<ValidationRule> {
        actor.require_admin()?;
        let mut rule = self.load(rule_id).await?;
        rule.severity = severity;
        rule.config = config;
        check_rule(&rule)?;

        self.save(&rule).await?;
        info!("Rule '{}' updated by {}", rule.name, actor.user_id);
        Ok(rule)
    }

    pub async fn set_rule_active(
        &self,
        actor: &Actor,
        rule_id: &str,
        is_active: bool,
    ) -> ModerationResult<ValidationRule> {
        actor.require_admin()?;
        let mut rule = self.load(rule_id).await?;
        rule.is_active = is_active;

        self.save(&rule).await?;
        info!(
            "Rule '{}' {} by {}",
            rule.name,
            if is_active { "activated" } else { "deactivated" },
            actor.user_id
        );
        Ok(rule)
    }

    pub async fn delete_rule(&self, actor: &Actor, rule_id: &str) -> ModerationResult<()> {
        actor.require_admin()?;
        if !self.cache.store().delete(rule_id).await? {
            return Err(ModerationError::not_found("rule", rule_id));
        }
        self.cache.invalidate();
        info!("Rule {} deleted by {}", rule_id, actor.user_id);
        Ok(())
    }

    /// Create or update rules by name
    ///
    /// Every definition is checked before anything is written, so a bad
    /// file leaves the rule table untouched.
    pub async fn import_rules(
        &self,
        actor: &Actor,
        definitions: Vec<RuleDefinition>,
    ) -> ModerationResult<ImportSummary> {
        actor.require_admin()?;
        let rules: Vec<ValidationRule> = definitions
            .into_iter()
            .map(|d| {
                let mut rule = ValidationRule::new(d.name, d.severity, d.config);
                rule.is_active = d.is_active;
                rule
            })
            .collect();
        for rule in &rules {
            check_rule(rule)?;
        }

        let store = self.cache.store();
        let mut summary = ImportSummary::default();
        let written = async {
            for mut rule in rules {
                match store.find_by_name(&rule.name).await? {
                    Some(existing) => {
                        rule.id = existing.id;
                        store.update(&rule).await?;
                        summary.updated += 1;
                    }
                    None => {
                        store.create(&rule).await.map_err(store_error)?;
                        summary.created += 1;
                    }
                }
                debug!("Imported rule '{}'", rule.name);
            }
            Ok::<(), ModerationError>(())
        }
        .await;

        // Rules written before a failure are live and must be visible
        if summary.created + summary.updated > 0 {
            self.cache.invalidate();
        }
        if let Err(e) = written {
            warn!(
                "Rule import by {} stopped after {} created, {} updated: {}",
                actor.user_id, summary.created, summary.updated, e
            );
            return Err(e);
        }

        info!(
            "Rule import by {}: {} created, {} updated",
            actor.user_id, summary.created, summary.updated
        );
        Ok(summary)
    }

    /// Explicit invalidation, e.g. after editing rules from another process
    pub fn invalidate_rule_cache(&self, actor: &Actor) -> ModerationResult<u64> {
        actor.require_admin()?;
        self.cache.invalidate();
        Ok(self.cache.generation())
    }

    async fn load(&self, rule_id: &str) -> ModerationResult<ValidationRule> {
        self.cache
            .store()
            .get(rule_id)
            .await?
            .ok_or_else(|| ModerationError::not_found("rule", rule_id))
    }

    async fn save(&self, rule: &ValidationRule) -> ModerationResult<()> {
        if !self.cache.store().update(rule).await? {
            return Err(ModerationError::not_found("rule", rule.id.clone()));
        }
        self.cache.invalidate();
        Ok(())
    }
}

/// A name taken by a concurrent writer is a caller error, not a store outage
fn store_error(e: anyhow::Error) -> ModerationError {
    match e.downcast_ref::<DuplicateRuleName>() {
        Some(duplicate) => ModerationError::Validation(duplicate.to_string()),
        None => e.into(),
    }
}

fn check_rule(rule: &ValidationRule) -> ModerationResult<()> {
    if rule.name.trim().is_empty() {
        return Err(ModerationError::Validation("rule name is required".to_string()));
    }
    rule.config
        .check()
        .map_err(|e| ModerationError::Validation(format!("{:#}", e)))
}
