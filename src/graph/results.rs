//! Byte-bounded cache of finished node values.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use ndarray::Array3;

use super::task::NodeId;

/// Default capacity: 256 MiB of tile values
pub const DEFAULT_RESULT_CACHE_CAPACITY: usize = 256 * 1024 * 1024;

/// Bound on entry count, independent of their size
const DEFAULT_MAX_ENTRIES: usize = 16_384;

struct Entries {
    lru: LruCache<NodeId, Arc<Array3<u8>>>,
    bytes: usize,
}

/// LRU of computed tiles, evicting by total bytes.
pub(crate) struct ResultCache {
    entries: Mutex<Entries>,
    max_bytes: usize,
}

impl ResultCache {
    /// A capacity of 0 disables caching.
    pub(crate) fn with_capacity(max_bytes: usize) -> Self {
        let max_entries = NonZeroUsize::new(DEFAULT_MAX_ENTRIES).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(Entries {
                lru: LruCache::new(max_entries),
                bytes: 0,
            }),
            max_bytes,
        }
    }

    pub(crate) fn get(&self, id: &NodeId) -> Option<Arc<Array3<u8>>> {
        self.entries.lock().ok()?.lru.get(id).cloned()
    }

    pub(crate) fn contains(&self, id: &NodeId) -> bool {
        self.entries
            .lock()
            .map(|e| e.lru.contains(id))
            .unwrap_or(false)
    }

    /// Values larger than the whole budget are not stored.
    pub(crate) fn put(&self, id: NodeId, value: Arc<Array3<u8>>) {
        let size = value.len();
        if size > self.max_bytes {
            return;
        }
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };

        if let Some((_, old)) = entries.lru.push(id, value) {
            entries.bytes -= old.len();
        }
        entries.bytes += size;

        while entries.bytes > self.max_bytes {
            match entries.lru.pop_lru() {
                Some((_, evicted)) => entries.bytes -= evicted.len(),
                None => break,
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().map(|e| e.lru.len()).unwrap_or(0)
    }

    pub(crate) fn size(&self) -> usize {
        self.entries.lock().map(|e| e.bytes).unwrap_or(0)
    }

    pub(crate) fn capacity(&self) -> usize {
        self.max_bytes
    }

    pub(crate) fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.lru.clear();
            entries.bytes = 0;
        }
    }
}
