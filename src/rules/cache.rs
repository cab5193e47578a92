/*!
 * Process-wide cache of active validation rules.
 *
 * Readers get an immutable `Arc<RuleSnapshot>`; a reload builds a complete
 * new snapshot and swaps it in, so nobody ever observes a partial rule set.
 * `invalidate()` bumps the generation counter and the next read reloads.
 * The optional TTL is only a safety net for changes made by other processes.
 */

use anyhow::Result;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::model::{CompiledRule, RuleType, ValidationRule};
use super::RuleStore;

/// An immutable set of compiled active rules
#[derive(Debug)]
pub struct RuleSnapshot {
    generation: u64,
    loaded_at: Instant,
    rules: Vec<CompiledRule>,
}

impl RuleSnapshot {
    fn new(generation: u64, mut rules: Vec<CompiledRule>) -> Self {
        // Most severe first, then by name, so evaluation order is stable
        rules.sort_by(|a, b| {
            b.rule
                .severity
                .cmp(&a.rule.severity)
                .then_with(|| a.rule.name.cmp(&b.rule.name))
        });
        Self {
            generation,
            loaded_at: Instant::now(),
            rules,
        }
    }

    /// Generation this snapshot was loaded under
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Rules of one type, in snapshot order
    pub fn of_type(&self, rule_type: RuleType) -> impl Iterator<Item = &CompiledRule> {
        self.rules
            .iter()
            .filter(move |r| r.rule.rule_type() == rule_type)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleCacheStats {
    pub generation: u64,
    pub hits: u64,
    pub reloads: u64,
    pub cached_rules: usize,
}

/// Lazily populated, explicitly invalidated cache of active rules
pub struct RuleCache {
    store: Arc<dyn RuleStore>,
    snapshot: RwLock<Option<Arc<RuleSnapshot>>>,
    generation: AtomicU64,
    reload_lock: Mutex<()>,
    ttl: Option<Duration>,
    hits: AtomicU64,
    reloads: AtomicU64,
}

impl RuleCache {
    /// Create a cache without expiry
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self::with_ttl(store, None)
    }

    /// Create a cache whose snapshots also expire after `ttl`
    pub fn with_ttl(store: Arc<dyn RuleStore>, ttl: Option<Duration>) -> Self {
        Self {
            store,
            snapshot: RwLock::new(None),
            generation: AtomicU64::new(0),
            reload_lock: Mutex::new(()),
            ttl,
            hits: AtomicU64::new(0),
            reloads: AtomicU64::new(0),
        }
    }

    /// The underlying rule store
    pub fn store(&self) -> &Arc<dyn RuleStore> {
        &self.store
    }

    /// Current generation; incremented by every invalidation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Force the next read to reload from the rule store
    pub fn invalidate(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.snapshot.write() = None;
        info!("Rule cache invalidated (generation {})", generation);
    }

    /// Current snapshot of all active rules, reloading if needed
    pub async fn snapshot(&self) -> Result<Arc<RuleSnapshot>> {
        if let Some(snapshot) = self.fresh_snapshot() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(snapshot);
        }

        // One reload at a time; late arrivals reuse the winner's snapshot
        let _guard = self.reload_lock.lock().await;
        if let Some(snapshot) = self.fresh_snapshot() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(snapshot);
        }

        let generation = self.generation();
        let rules = self.store.list_active(None).await?;
        let snapshot = Arc::new(RuleSnapshot::new(generation, compile_all(rules)));
        self.reloads.fetch_add(1, Ordering::Relaxed);

        // An invalidation during the load means this data may predate it
        if self.generation() == generation {
            *self.snapshot.write() = Some(snapshot.clone());
            debug!(
                "Rule cache loaded {} active rules (generation {})",
                snapshot.len(),
                generation
            );
        } else {
            debug!("Rule cache invalidated during reload; snapshot not retained");
        }

        Ok(snapshot)
    }

    /// Active rules, optionally restricted to one type
    pub async fn get_active_rules(&self, rule_type: Option<RuleType>) -> Result<Vec<ValidationRule>> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot
            .rules()
            .iter()
            .filter(|r| rule_type.is_none_or(|t| r.rule.rule_type() == t))
            .map(|r| r.rule.clone())
            .collect())
    }

    pub fn stats(&self) -> RuleCacheStats {
        RuleCacheStats {
            generation: self.generation(),
            hits: self.hits.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            cached_rules: self.snapshot.read().as_ref().map_or(0, |s| s.len()),
        }
    }

    fn fresh_snapshot(&self) -> Option<Arc<RuleSnapshot>> {
        let slot = self.snapshot.read();
        let snapshot = slot.as_ref()?;
        if snapshot.generation != self.generation() {
            return None;
        }
        if let Some(ttl) = self.ttl {
            if snapshot.loaded_at.elapsed() >= ttl {
                return None;
            }
        }
        Some(snapshot.clone())
    }
}

fn compile_all(rules: Vec<ValidationRule>) -> Vec<CompiledRule> {
    rules
        .into_iter()
        .filter_map(|rule| {
            let name = rule.name.clone();
            match CompiledRule::compile(rule) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    warn!("Skipping rule '{}': {:#}", name, e);
                    None
                }
            }
        })
        .collect()
}
