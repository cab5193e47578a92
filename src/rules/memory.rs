/*!
 * In-process rule store.
 */

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::model::{RuleType, ValidationRule};
use super::{DuplicateRuleName, RuleStore};

/// Rule store backed by a vector, counting list calls
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<Vec<ValidationRule>>,
    list_calls: AtomicUsize,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<ValidationRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Number of `list_active` calls served so far
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn list_active(&self, rule_type: Option<RuleType>) -> Result<Vec<ValidationRule>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rules
            .read()
            .iter()
            .filter(|r| r.is_active && rule_type.is_none_or(|t| r.rule_type() == t))
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<ValidationRule>> {
        Ok(self.rules.read().clone())
    }

    async fn get(&self, id: &str) -> Result<Option<ValidationRule>> {
        Ok(self.rules.read().iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ValidationRule>> {
        Ok(self.rules.read().iter().find(|r| r.name == name).cloned())
    }

    async fn create(&self, rule: &ValidationRule) -> Result<()> {
        let mut rules = self.rules.write();
        if rules.iter().any(|r| r.name == rule.name) {
            return Err(DuplicateRuleName(rule.name.clone()).into());
        }
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(anyhow!("Rule id {} already exists", rule.id));
        }
        rules.push(rule.clone());
        Ok(())
    }

    async fn update(&self, rule: &ValidationRule) -> Result<bool> {
        let mut rules = self.rules.write();
        match rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => {
                *existing = rule.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| r.id != id);
        Ok(rules.len() != before)
    }
}
