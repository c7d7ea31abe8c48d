//! The decision facade.
//!
//! [`FirewallEngine`] is the single entry point for both collaborators of the
//! firewall: the interception hook calls [`FirewallEngine::classify`] once per
//! new outbound flow, and the management front end calls
//! [`FirewallEngine::refresh`] and the rule/pending mutators. Construct one
//! engine per process and share it (it is `Send + Sync`); both collaborators
//! in a process then see the same in-memory state.
//!
//! Classification never fails. Storage problems are logged and absorbed by
//! the rule table and pending queue, and anything left unclassified is
//! allowed and queued for review.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::config::{AppConfig, EngineConfig};
use crate::pending::{PendingConnection, PendingQueue};
use crate::policy::{FlowInfo, NewRule, Rule, RuleAction, RuleTable};
use crate::store::{FileStore, RecordStore};

/// The outcome handed back to the interception hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Block,
}

impl From<RuleAction> for Verdict {
    fn from(action: RuleAction) -> Self {
        match action {
            RuleAction::Allow => Verdict::Allow,
            RuleAction::Block => Verdict::Block,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Allow => f.write_str("allow"),
            Verdict::Block => f.write_str("block"),
        }
    }
}

/// Result of classifying a flow, including why the verdict was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    pub reason: String,
    /// Id of the rule that decided the verdict, if one did.
    pub matched_rule: Option<String>,
    /// Set when the flow was unclassified and this call queued it for the
    /// first time. Callers use it to decide whether to alert the user.
    pub is_novel_pending: bool,
}

impl Classification {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Allow,
            reason: reason.into(),
            matched_rule: None,
            is_novel_pending: false,
        }
    }
}

/// Point-in-time copies of both lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub rules: Vec<Rule>,
    pub pending: Vec<PendingConnection>,
}

struct State {
    rules: RuleTable,
    pending: PendingQueue,
}

pub struct FirewallEngine {
    state: Mutex<State>,
    config: EngineConfig,
}

impl FirewallEngine {
    /// Build an engine over `store`, hydrating rules and pending entries.
    pub fn new(store: Arc<dyn RecordStore>, config: EngineConfig) -> Self {
        let rules = RuleTable::open(store.clone());
        let pending = PendingQueue::open(store, config.pending_capacity);
        info!(
            "Engine ready ({} rules, {} pending)",
            rules.len(),
            pending.len()
        );
        Self {
            state: Mutex::new(State { rules, pending }),
            config,
        }
    }

    /// Build an engine over the shared directory named in `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        let store = Arc::new(FileStore::new(&config.storage.dir));
        Self::new(store, config.engine.clone())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decide the fate of an outbound flow.
    ///
    /// Flows from this tool's own processes are always allowed. Otherwise the
    /// rules are refreshed if the store changed, and the most specific
    /// matching rule decides. Unmatched flows are allowed and queued.
    pub fn classify(&self, flow: &FlowInfo) -> Classification {
        let flow = self.normalize(flow);

        if self.is_self(&flow.process) {
            debug!("Self-exempt flow from {}", flow.process);
            return Classification::allow("self-exempt process");
        }

        let mut state = self.lock();
        state.rules.reload(false);

        if let Some(rule) = state.rules.find(&flow) {
            debug!(
                "{} -> {}:{} matched rule {} ({})",
                flow.process, flow.endpoint_addr, flow.endpoint_port, rule.id, rule.action
            );
            return Classification {
                verdict: rule.action.into(),
                reason: format!("Matched rule {}", rule.id),
                matched_rule: Some(rule.id),
                is_novel_pending: false,
            };
        }

        let is_novel = state.pending.insert(PendingConnection::observe(&flow));
        Classification {
            is_novel_pending: is_novel,
            ..Classification::allow("No matching rule; queued for review")
        }
    }

    /// Force-reload both lists from the store and return snapshots.
    pub fn refresh(&self) -> Snapshot {
        let mut state = self.lock();
        state.rules.reload(true);
        state.pending.reload();
        Snapshot {
            rules: state.rules.list(),
            pending: state.pending.list(),
        }
    }

    /// Current rules without touching the store.
    pub fn rules(&self) -> Vec<Rule> {
        self.lock().rules.list()
    }

    /// Current pending entries without touching the store.
    pub fn pending(&self) -> Vec<PendingConnection> {
        self.lock().pending.list()
    }

    /// Store a new rule. If `pending_id` names a queued entry, that entry is
    /// removed: the observation has been turned into a decision.
    pub fn add_rule(&self, new_rule: NewRule, pending_id: Option<&str>) -> Rule {
        let rule = new_rule.into_rule();
        let mut state = self.lock();
        state.rules.reload(false);
        state.rules.add(rule.clone());
        if let Some(id) = pending_id {
            state.pending.reload();
            state.pending.remove(id);
        }
        rule
    }

    /// Turn a queued observation into an exact rule and drop it from the
    /// queue. Returns `None` if no entry has that id.
    pub fn add_rule_from_pending(&self, pending_id: &str, action: RuleAction) -> Option<Rule> {
        let mut state = self.lock();
        state.pending.reload();
        let entry = state.pending.get(pending_id)?.clone();

        let rule = NewRule::exact(
            entry.process,
            entry.endpoint_addr,
            entry.endpoint_port,
            action,
        )
        .into_rule();

        state.rules.reload(false);
        state.rules.add(rule.clone());
        state.pending.remove(pending_id);
        Some(rule)
    }

    pub fn remove_rule(&self, id: &str) -> bool {
        let mut state = self.lock();
        state.rules.reload(false);
        state.rules.remove(id)
    }

    pub fn remove_pending(&self, id: &str) -> bool {
        let mut state = self.lock();
        state.pending.reload();
        state.pending.remove(id)
    }

    pub fn clear_pending(&self) {
        let mut state = self.lock();
        state.pending.clear();
        info!("Pending queue cleared");
    }

    fn normalize(&self, flow: &FlowInfo) -> FlowInfo {
        if flow.process.trim().is_empty() {
            FlowInfo {
                process: self.config.unknown_process.clone(),
                ..flow.clone()
            }
        } else {
            flow.clone()
        }
    }

    fn is_self(&self, process: &str) -> bool {
        self.config
            .self_identifiers
            .iter()
            .any(|id| !id.is_empty() && process.contains(id.as_str()))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ANY;
    use crate::store::{Collection, MemoryStore};

    fn engine() -> (Arc<MemoryStore>, FirewallEngine) {
        let store = Arc::new(MemoryStore::new());
        let engine = FirewallEngine::new(store.clone(), EngineConfig::default());
        (store, engine)
    }

    fn flow(process: &str, addr: &str, port: &str) -> FlowInfo {
        FlowInfo::new(process, addr, port)
    }

    #[test]
    fn block_rule_blocks() {
        let (_store, engine) = engine();
        let rule = engine.add_rule(
            NewRule::exact("com.example.app", "evil.com", "443", RuleAction::Block),
            None,
        );

        let result = engine.classify(&flow("com.example.app", "evil.com", "443"));
        assert_eq!(result.verdict, Verdict::Block);
        assert_eq!(result.matched_rule, Some(rule.id));
        assert!(!result.is_novel_pending);
        assert!(engine.pending().is_empty());
    }

    #[test]
    fn allow_rule_allows() {
        let (_store, engine) = engine();
        engine.add_rule(NewRule::exact("app", ANY, ANY, RuleAction::Allow), None);
        let result = engine.classify(&flow("app", "example.com", "80"));
        assert_eq!(result.verdict, Verdict::Allow);
        assert!(result.matched_rule.is_some());
    }

    #[test]
    fn unmatched_flow_is_allowed_and_queued_once() {
        let (_store, engine) = engine();

        let first = engine.classify(&flow("app", "new.com", "443"));
        assert_eq!(first.verdict, Verdict::Allow);
        assert!(first.is_novel_pending);
        assert!(first.matched_rule.is_none());
        assert_eq!(engine.pending().len(), 1);

        let second = engine.classify(&flow("app", "new.com", "443"));
        assert_eq!(second.verdict, Verdict::Allow);
        assert!(!second.is_novel_pending);
        assert_eq!(engine.pending().len(), 1);
    }

    #[test]
    fn self_process_is_exempt_even_from_block_rules() {
        let (_store, engine) = engine();
        engine.add_rule(NewRule::exact(ANY, ANY, ANY, RuleAction::Block), None);

        let result = engine.classify(&flow("io.flowguard.manager", "example.com", "443"));
        assert_eq!(result.verdict, Verdict::Allow);
        assert!(engine.pending().is_empty());
    }

    #[test]
    fn unknown_process_uses_configured_selector() {
        let (_store, engine) = engine();
        engine.classify(&flow("", "example.com", "443"));
        assert_eq!(engine.pending()[0].process, "unknown");
    }

    #[test]
    fn add_rule_from_pending_promotes_entry() {
        let (_store, engine) = engine();
        engine.classify(&flow("app", "tracker.net", "443"));
        let pending_id = engine.pending()[0].id.clone();

        let rule = engine
            .add_rule_from_pending(&pending_id, RuleAction::Block)
            .unwrap();
        assert_eq!(rule.process, "app");
        assert_eq!(rule.endpoint_addr, "tracker.net");
        assert_eq!(rule.endpoint_port, "443");
        assert!(engine.pending().is_empty());

        let result = engine.classify(&flow("app", "tracker.net", "443"));
        assert_eq!(result.verdict, Verdict::Block);
    }

    #[test]
    fn add_rule_from_unknown_pending_is_none() {
        let (_store, engine) = engine();
        assert!(engine.add_rule_from_pending("nope", RuleAction::Allow).is_none());
        assert!(engine.rules().is_empty());
    }

    #[test]
    fn add_rule_with_pending_id_removes_entry() {
        let (_store, engine) = engine();
        engine.classify(&flow("app", "a.com", "443"));
        let pending_id = engine.pending()[0].id.clone();

        engine.add_rule(
            NewRule::exact("app", r"\.com$", ANY, RuleAction::Allow).regex(),
            Some(&pending_id),
        );
        assert!(engine.pending().is_empty());
        assert_eq!(engine.rules().len(), 1);
    }

    #[test]
    fn remove_rule_and_pending() {
        let (_store, engine) = engine();
        let rule = engine.add_rule(NewRule::exact("app", ANY, ANY, RuleAction::Block), None);
        assert!(engine.remove_rule(&rule.id));
        assert!(!engine.remove_rule(&rule.id));

        engine.classify(&flow("app", "a.com", "443"));
        let id = engine.pending()[0].id.clone();
        assert!(engine.remove_pending(&id));
        assert!(engine.pending().is_empty());
    }

    #[test]
    fn refresh_forces_reload() {
        let (store, engine) = engine();
        let reads = store.reads(Collection::Rules);
        engine.refresh();
        engine.refresh();
        assert_eq!(store.reads(Collection::Rules), reads + 2);
    }

    #[test]
    fn classify_only_probes_when_unchanged() {
        let (store, engine) = engine();
        engine.add_rule(NewRule::exact("app", ANY, ANY, RuleAction::Allow), None);
        let reads = store.reads(Collection::Rules);

        for _ in 0..50 {
            engine.classify(&flow("app", "example.com", "443"));
        }
        assert_eq!(store.reads(Collection::Rules), reads);
    }

    #[test]
    fn storage_failure_still_allows() {
        let (store, engine) = engine();
        store.write(Collection::Rules, b"garbage").unwrap();
        store.set_fail_writes(true);

        let result = engine.classify(&flow("app", "example.com", "443"));
        assert_eq!(result.verdict, Verdict::Allow);
        assert!(result.is_novel_pending);
    }

    #[test]
    fn corrupt_rules_keep_last_known_good() {
        let (store, engine) = engine();
        engine.add_rule(NewRule::exact("app", ANY, ANY, RuleAction::Block), None);

        store.write(Collection::Rules, b"[{").unwrap();
        let result = engine.classify(&flow("app", "example.com", "443"));
        assert_eq!(result.verdict, Verdict::Block);
    }

    #[test]
    fn clear_pending_empties_queue() {
        let (_store, engine) = engine();
        engine.classify(&flow("app", "a.com", "1"));
        engine.classify(&flow("app", "b.com", "1"));
        engine.clear_pending();
        assert!(engine.refresh().pending.is_empty());
    }

    #[test]
    fn engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FirewallEngine>();
    }
}
