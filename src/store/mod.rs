//! Shared record persistence.
//!
//! Rules and pending connections live in two independent collections at a
//! shared, app-scoped location. Both the management process and the
//! traffic-inspection process read and write them through a [`RecordStore`].
//! There is no locking: every write replaces the whole collection, and
//! readers use the collection's modification time as a cheap staleness probe.
//!
//! - [`file::FileStore`] keeps each collection in a JSON file and replaces it
//!   atomically (write a sibling temp file, then rename).
//! - [`memory::MemoryStore`] keeps collections in process memory; used by tests
//!   and by embedders that supply their own sharing mechanism.

pub mod file;
pub mod memory;

use std::time::SystemTime;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

pub use file::FileStore;
pub use memory::MemoryStore;

/// The record collections kept by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Firewall rules, insertion order.
    Rules,
    /// Unclassified connections, most-recent first.
    Pending,
}

impl Collection {
    /// File name used by on-disk stores.
    pub fn file_name(&self) -> &'static str {
        match self {
            Collection::Rules => "rules.json",
            Collection::Pending => "pending.json",
        }
    }
}

/// Byte-level access to a shared collection blob.
///
/// Implementations must be `Send + Sync`; one store instance is shared by the
/// rule table and the pending queue of a process.
pub trait RecordStore: Send + Sync {
    /// Read the whole blob. `Ok(None)` when the collection does not exist yet.
    fn read(&self, collection: Collection) -> Result<Option<Vec<u8>>>;

    /// Replace the whole blob. A failed write must leave the previous
    /// contents intact.
    fn write(&self, collection: Collection, bytes: &[u8]) -> Result<()>;

    /// Metadata-only probe of the blob's modification time.
    fn modified(&self, collection: Collection) -> Option<SystemTime>;
}

/// Load and decode a collection as a sequence of records.
///
/// Returns `Ok(None)` if the collection does not exist, and an error if it
/// exists but cannot be read or decoded. Callers treat both as "no data".
pub fn load_records<T: DeserializeOwned>(
    store: &dyn RecordStore,
    collection: Collection,
) -> Result<Option<Vec<T>>> {
    match store.read(collection)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Encode the full sequence and replace the collection with it.
pub fn save_records<T: Serialize>(
    store: &dyn RecordStore,
    collection: Collection,
    records: &[T],
) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(records)?;
    store.write(collection, &bytes)
}
