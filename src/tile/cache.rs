//! Cache of decoded source tiles.
//!
//! A Deep Zoom tile usually covers several source tiles and neighbouring
//! Deep Zoom tiles share source tiles along their edges, so decoded source
//! tiles are kept in an LRU bounded by total pixel bytes.

use std::num::NonZeroUsize;
use std::sync::Arc;

use image::RgbImage;
use lru::LruCache;
use tokio::sync::Mutex;

/// Default capacity: 64 MiB of decoded pixels
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Bound on entry count, independent of their size
const DEFAULT_MAX_ENTRIES: usize = 4_096;

/// Source tile address within one slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    pub level: usize,
    pub tile_x: u32,
    pub tile_y: u32,
}

impl TileCacheKey {
    pub fn new(level: usize, tile_x: u32, tile_y: u32) -> Self {
        Self {
            level,
            tile_x,
            tile_y,
        }
    }
}

struct Entries {
    lru: LruCache<TileCacheKey, Arc<RgbImage>>,
    bytes: usize,
}

/// Size-bounded LRU of decoded tiles, shareable across tasks.
pub struct TileCache {
    entries: Mutex<Entries>,
    max_bytes: usize,
}

impl TileCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Cache holding at most `max_bytes` of pixel data.
    ///
    /// A capacity of 0 disables caching.
    pub fn with_capacity(max_bytes: usize) -> Self {
        let max_entries = NonZeroUsize::new(DEFAULT_MAX_ENTRIES).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(Entries {
                lru: LruCache::new(max_entries),
                bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Fetch a tile, marking it recently used.
    pub async fn get(&self, key: &TileCacheKey) -> Option<Arc<RgbImage>> {
        self.entries.lock().await.lru.get(key).cloned()
    }

    /// Insert a tile, evicting least-recently-used tiles to stay in budget.
    ///
    /// Tiles larger than the whole budget are not stored.
    pub async fn put(&self, key: TileCacheKey, tile: Arc<RgbImage>) {
        let size = tile.as_raw().len();
        if size > self.max_bytes {
            return;
        }

        let mut entries = self.entries.lock().await;
        // `push` hands back either the replaced value or the entry evicted
        // by the entry-count bound
        if let Some((_, old)) = entries.lru.push(key, tile) {
            entries.bytes -= old.as_raw().len();
        }
        entries.bytes += size;

        while entries.bytes > self.max_bytes {
            match entries.lru.pop_lru() {
                Some((_, evicted)) => entries.bytes -= evicted.as_raw().len(),
                None => break,
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.lru.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Bytes of pixel data currently held.
    pub async fn size(&self) -> usize {
        self.entries.lock().await.bytes
    }

    pub fn capacity(&self) -> usize {
        self.max_bytes
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        entries.lru.clear();
        entries.bytes = 0;
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}
