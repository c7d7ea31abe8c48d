use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{Collection, RecordStore};
use crate::error::{FlowGuardError, Result};

struct Blob {
    bytes: Vec<u8>,
    modified: SystemTime,
}

/// In-process [`RecordStore`].
///
/// Every write stamps the blob with a strictly increasing modification time.
/// Reads are counted per collection so callers can observe whether a reload
/// actually touched the data. Wrap it in an `Arc` to share one store between
/// several engines, which stands in for two processes sharing a directory.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<Collection, Blob>>,
    reads: Mutex<HashMap<Collection, usize>>,
    generation: AtomicU64,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of full reads performed on `collection` so far.
    pub fn reads(&self, collection: Collection) -> usize {
        let reads = self.reads.lock().unwrap_or_else(PoisonError::into_inner);
        reads.get(&collection).copied().unwrap_or(0)
    }

    /// Make subsequent writes fail with [`FlowGuardError::StorageUnavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn next_timestamp(&self) -> SystemTime {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        UNIX_EPOCH + Duration::from_nanos(generation)
    }
}

impl RecordStore for MemoryStore {
    fn read(&self, collection: Collection) -> Result<Option<Vec<u8>>> {
        *self
            .reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(collection)
            .or_insert(0) += 1;

        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.get(&collection).map(|b| b.bytes.clone()))
    }

    fn write(&self, collection: Collection, bytes: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(FlowGuardError::StorageUnavailable(format!(
                "write to {} rejected",
                collection.file_name()
            )));
        }

        let blob = Blob {
            bytes: bytes.to_vec(),
            modified: self.next_timestamp(),
        };
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection, blob);
        Ok(())
    }

    fn modified(&self, collection: Collection) -> Option<SystemTime> {
        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        blobs.get(&collection).map(|b| b.modified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_are_counted_per_collection() {
        let store = MemoryStore::new();
        store.read(Collection::Rules).unwrap();
        store.read(Collection::Rules).unwrap();
        store.read(Collection::Pending).unwrap();
        assert_eq!(store.reads(Collection::Rules), 2);
        assert_eq!(store.reads(Collection::Pending), 1);
    }

    #[test]
    fn modified_probe_does_not_count_as_read() {
        let store = MemoryStore::new();
        store.write(Collection::Rules, b"[]").unwrap();
        store.modified(Collection::Rules);
        assert_eq!(store.reads(Collection::Rules), 0);
    }

    #[test]
    fn failed_write_keeps_previous_blob() {
        let store = MemoryStore::new();
        store.write(Collection::Rules, b"[1]").unwrap();
        let before = store.modified(Collection::Rules);

        store.set_fail_writes(true);
        assert!(store.write(Collection::Rules, b"[2]").is_err());

        assert_eq!(store.read(Collection::Rules).unwrap().unwrap(), b"[1]");
        assert_eq!(store.modified(Collection::Rules), before);
    }
}
