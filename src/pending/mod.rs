//! Queue of unclassified connections awaiting a user decision.
//!
//! When no rule governs a flow, the engine records a [`PendingConnection`]
//! here. The queue holds at most one entry per `(process, address, port)`
//! triple, keeps the most recent observation first, and is bounded: once it
//! grows past its capacity the oldest entry is evicted. Every change is
//! written through to the shared pending collection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::policy::matcher::FlowInfo;
use crate::store::{load_records, save_records, Collection, RecordStore};

/// Default bound on the number of queued connections.
pub const DEFAULT_CAPACITY: usize = 100;

/// An observed flow no rule applied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConnection {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub process: String,
    pub endpoint_addr: String,
    pub endpoint_port: String,
    pub observed_at: DateTime<Utc>,
}

impl PendingConnection {
    /// Record an observation of `flow` made now.
    pub fn observe(flow: &FlowInfo) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            process: flow.process.clone(),
            endpoint_addr: flow.endpoint_addr.clone(),
            endpoint_port: flow.endpoint_port.clone(),
            observed_at: Utc::now(),
        }
    }

    /// Whether both entries describe the same process/address/port triple.
    pub fn same_endpoint(&self, other: &PendingConnection) -> bool {
        self.process == other.process
            && self.endpoint_addr == other.endpoint_addr
            && self.endpoint_port == other.endpoint_port
    }

    pub fn flow(&self) -> FlowInfo {
        FlowInfo::new(&self.process, &self.endpoint_addr, &self.endpoint_port)
    }
}

pub struct PendingQueue {
    store: Arc<dyn RecordStore>,
    entries: Vec<PendingConnection>,
    capacity: usize,
}

impl PendingQueue {
    /// An empty queue that has not read the store yet.
    pub fn new(store: Arc<dyn RecordStore>, capacity: usize) -> Self {
        Self {
            store,
            entries: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// A queue hydrated from the store.
    pub fn open(store: Arc<dyn RecordStore>, capacity: usize) -> Self {
        let mut queue = Self::new(store, capacity);
        queue.reload();
        queue
    }

    /// Queue a new observation at the front.
    ///
    /// Returns `false` without touching anything if an entry for the same
    /// triple is already queued.
    pub fn insert(&mut self, conn: PendingConnection) -> bool {
        if self.entries.iter().any(|e| e.same_endpoint(&conn)) {
            debug!(
                "Pending entry for {} -> {}:{} already queued",
                conn.process, conn.endpoint_addr, conn.endpoint_port
            );
            return false;
        }

        info!(
            "Queued unclassified connection {} -> {}:{}",
            conn.process, conn.endpoint_addr, conn.endpoint_port
        );
        self.entries.insert(0, conn);
        if self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop() {
                debug!("Pending queue full, evicted {}", evicted.id);
            }
        }
        self.persist();
        true
    }

    /// Remove the entry with `id`. Returns `false` if there was none.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        if self.entries.len() == before {
            return false;
        }
        self.persist();
        true
    }

    /// Drop every queued entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.persist();
    }

    /// Replace the in-memory queue with the stored one. A missing or
    /// unreadable collection keeps the current entries.
    pub fn reload(&mut self) -> bool {
        match load_records::<PendingConnection>(&*self.store, Collection::Pending) {
            Ok(Some(entries)) => {
                self.entries = entries;
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(
                    "Pending reload failed (keeping {} entries): {}",
                    self.entries.len(),
                    e
                );
                false
            }
        }
    }

    /// Snapshot, most recent first.
    pub fn list(&self) -> Vec<PendingConnection> {
        self.entries.clone()
    }

    pub fn get(&self, id: &str) -> Option<&PendingConnection> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn persist(&self) {
        if let Err(e) = save_records(&*self.store, Collection::Pending, &self.entries) {
            warn!("Failed to persist pending connections: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn observe(process: &str, addr: &str, port: &str) -> PendingConnection {
        PendingConnection::observe(&FlowInfo::new(process, addr, port))
    }

    fn setup() -> (Arc<MemoryStore>, PendingQueue) {
        let store = Arc::new(MemoryStore::new());
        let queue = PendingQueue::open(store.clone(), DEFAULT_CAPACITY);
        (store, queue)
    }

    #[test]
    fn insert_puts_newest_first() {
        let (_store, mut queue) = setup();
        assert!(queue.insert(observe("a", "one.com", "443")));
        assert!(queue.insert(observe("a", "two.com", "443")));

        let list = queue.list();
        assert_eq!(list[0].endpoint_addr, "two.com");
        assert_eq!(list[1].endpoint_addr, "one.com");
    }

    #[test]
    fn duplicate_triple_is_rejected() {
        let (_store, mut queue) = setup();
        assert!(queue.insert(observe("a", "one.com", "443")));
        assert!(!queue.insert(observe("a", "one.com", "443")));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn duplicate_anywhere_in_list_is_rejected() {
        let (_store, mut queue) = setup();
        queue.insert(observe("a", "one.com", "443"));
        queue.insert(observe("a", "two.com", "443"));
        queue.insert(observe("a", "three.com", "443"));
        assert!(!queue.insert(observe("a", "one.com", "443")));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn differing_port_is_a_new_entry() {
        let (_store, mut queue) = setup();
        assert!(queue.insert(observe("a", "one.com", "443")));
        assert!(queue.insert(observe("a", "one.com", "80")));
        assert!(queue.insert(observe("b", "one.com", "80")));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn overflow_evicts_oldest() {
        let (store, mut queue) = setup();
        for i in 0..DEFAULT_CAPACITY {
            assert!(queue.insert(observe("a", &format!("host{}.com", i), "443")));
        }
        assert_eq!(queue.len(), DEFAULT_CAPACITY);

        assert!(queue.insert(observe("a", "newest.com", "443")));
        let list = queue.list();
        assert_eq!(list.len(), DEFAULT_CAPACITY);
        assert_eq!(list[0].endpoint_addr, "newest.com");
        assert_eq!(list[DEFAULT_CAPACITY - 1].endpoint_addr, "host1.com");
        assert!(!list.iter().any(|e| e.endpoint_addr == "host0.com"));

        let stored = PendingQueue::open(store, DEFAULT_CAPACITY);
        assert_eq!(stored.len(), DEFAULT_CAPACITY);
    }

    #[test]
    fn small_capacity_is_respected() {
        let store = Arc::new(MemoryStore::new());
        let mut queue = PendingQueue::new(store, 2);
        queue.insert(observe("a", "1.com", "1"));
        queue.insert(observe("a", "2.com", "1"));
        queue.insert(observe("a", "3.com", "1"));
        let addrs: Vec<String> = queue.list().into_iter().map(|e| e.endpoint_addr).collect();
        assert_eq!(addrs, vec!["3.com", "2.com"]);
    }

    #[test]
    fn remove_by_id() {
        let (store, mut queue) = setup();
        let entry = observe("a", "one.com", "443");
        queue.insert(entry.clone());
        queue.insert(observe("a", "two.com", "443"));

        assert!(queue.remove(&entry.id));
        assert!(queue.get(&entry.id).is_none());
        assert!(!queue.remove(&entry.id));
        assert_eq!(PendingQueue::open(store, DEFAULT_CAPACITY).len(), 1);
    }

    #[test]
    fn removed_triple_can_be_queued_again() {
        let (_store, mut queue) = setup();
        let entry = observe("a", "one.com", "443");
        queue.insert(entry.clone());
        queue.remove(&entry.id);
        assert!(queue.insert(observe("a", "one.com", "443")));
    }

    #[test]
    fn clear_empties_store() {
        let (store, mut queue) = setup();
        queue.insert(observe("a", "one.com", "443"));
        queue.clear();
        assert!(queue.is_empty());
        assert!(PendingQueue::open(store, DEFAULT_CAPACITY).is_empty());
    }

    #[test]
    fn reload_replaces_with_stored_entries() {
        let (store, mut queue) = setup();
        queue.insert(observe("a", "mine.com", "443"));

        let theirs = vec![observe("b", "theirs.com", "80")];
        save_records(&*store, Collection::Pending, &theirs).unwrap();

        assert!(queue.reload());
        assert_eq!(queue.list(), theirs);
    }

    #[test]
    fn reload_of_corrupt_data_keeps_entries() {
        let (store, mut queue) = setup();
        queue.insert(observe("a", "mine.com", "443"));
        store.write(Collection::Pending, b"[{\"id\": 1}]").unwrap();

        assert!(!queue.reload());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn pending_roundtrips_through_json() {
        let entry = observe("com.example.app", "10.0.0.1", "22");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"observed_at\""));
        let back: PendingConnection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
