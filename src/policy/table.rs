//! In-memory rule list backed by the shared rules collection.
//!
//! The matching path runs once per outbound flow, so [`RuleTable::reload`]
//! normally costs a single metadata probe: the collection is only re-read
//! when its modification time differs from the last one this table observed.
//! Writes made by this table move the baseline forward so it never re-reads
//! its own data.
//!
//! Storage failures are handled fail-safe: a read or decode failure keeps the
//! current list, and a write failure keeps the in-memory change without
//! advancing the baseline.

use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info, warn};

use super::matcher::{find_best_match, FlowInfo, PatternCache};
use super::rule::Rule;
use crate::store::{load_records, save_records, Collection, RecordStore};

pub struct RuleTable {
    store: Arc<dyn RecordStore>,
    rules: Vec<Rule>,
    patterns: PatternCache,
    baseline: Option<SystemTime>,
}

impl RuleTable {
    /// An empty table that has not read the store yet.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            rules: Vec::new(),
            patterns: PatternCache::default(),
            baseline: None,
        }
    }

    /// A table hydrated from the store.
    pub fn open(store: Arc<dyn RecordStore>) -> Self {
        let mut table = Self::new(store);
        table.reload(true);
        table
    }

    /// Refresh from the store.
    ///
    /// Without `force`, nothing is read when the collection's modification
    /// time equals the recorded baseline. Returns `true` if the in-memory
    /// list was replaced.
    pub fn reload(&mut self, force: bool) -> bool {
        let modified = self.store.modified(Collection::Rules);
        if !force && modified == self.baseline {
            debug!("Rules unchanged since last load, skipping reload");
            return false;
        }
        self.baseline = modified;

        match load_records::<Rule>(&*self.store, Collection::Rules) {
            Ok(Some(rules)) => {
                self.patterns = PatternCache::build(&rules);
                self.rules = rules;
                info!("Rules reloaded ({} rules)", self.rules.len());
                true
            }
            Ok(None) => {
                debug!("No rules collection yet, keeping {} rules", self.rules.len());
                false
            }
            Err(e) => {
                warn!(
                    "Rules reload failed (keeping {} rules): {}",
                    self.rules.len(),
                    e
                );
                false
            }
        }
    }

    /// Append a rule and write the full list through to the store.
    pub fn add(&mut self, rule: Rule) {
        if rule.is_regex {
            self.patterns.insert(&rule.endpoint_addr);
        }
        info!(
            "Adding rule {}: {} -> {}:{} = {}",
            rule.id, rule.process, rule.endpoint_addr, rule.endpoint_port, rule.action
        );
        self.rules.push(rule);
        self.persist();
    }

    /// Remove every rule with the given id. Returns `false` (and writes
    /// nothing) if no rule had that id.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        if self.rules.len() == before {
            debug!("No rule with id {} to remove", id);
            return false;
        }
        info!("Removed rule {}", id);
        self.persist();
        true
    }

    /// Snapshot of the rules in insertion order.
    pub fn list(&self) -> Vec<Rule> {
        self.rules.clone()
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// The most specific rule governing `flow`, if any.
    pub fn find(&self, flow: &FlowInfo) -> Option<Rule> {
        find_best_match(&self.rules, flow, &self.patterns).map(|m| m.rule.clone())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn persist(&mut self) {
        match save_records(&*self.store, Collection::Rules, &self.rules) {
            Ok(()) => self.baseline = self.store.modified(Collection::Rules),
            Err(e) => warn!("Failed to persist rules (change kept in memory only): {}", e),
        }
    }
}
