use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use lru::LruCache;
use tokio::sync::OnceCell;

use super::RangeReader;
use crate::error::IoError;

/// Default block size: 256 KiB.
pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024;

/// Default number of cached blocks (32 MiB at the default block size).
pub const DEFAULT_BLOCK_CACHE_CAPACITY: usize = 128;

type Flight = Arc<OnceCell<Result<Bytes, IoError>>>;

/// Fixed-size block cache in front of a [`RangeReader`].
///
/// TIFF parsing issues many small reads at scattered offsets (IFD entries,
/// tag arrays, JPEG tables). Reads are rounded out to whole blocks, blocks
/// are kept in an LRU, and concurrent misses on the same block share one
/// underlying read.
pub struct BlockCache<R> {
    inner: Arc<R>,
    block_size: usize,
    blocks: Mutex<LruCache<u64, Bytes>>,
    in_flight: Mutex<HashMap<u64, Flight>>,
}

impl<R: RangeReader> BlockCache<R> {
    /// Wrap `inner` with the default block size and capacity.
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BLOCK_SIZE, DEFAULT_BLOCK_CACHE_CAPACITY)
    }

    /// Wrap `inner` with an explicit block size and capacity (in blocks).
    ///
    /// Zero values are bumped to 1.
    pub fn with_capacity(inner: R, block_size: usize, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(inner),
            block_size: block_size.max(1),
            blocks: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// The wrapped reader.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Number of blocks currently cached.
    pub fn cached_blocks(&self) -> usize {
        self.blocks.lock().map(|b| b.len()).unwrap_or(0)
    }

    async fn block(&self, index: u64) -> Result<Bytes, IoError> {
        if let Some(data) = self.lookup(index) {
            return Ok(data);
        }

        let flight = {
            let mut in_flight = self
                .in_flight
                .lock()
                .map_err(|_| IoError::Io("block cache lock poisoned".to_string()))?;
            // Re-check under the flight lock: the leader may have finished
            // between the lookup above and here.
            if let Some(data) = self.lookup(index) {
                return Ok(data);
            }
            Arc::clone(in_flight.entry(index).or_default())
        };

        let result = flight
            .get_or_init(|| async {
                let result = self.fetch(index).await;
                if let Ok(data) = &result {
                    if let Ok(mut blocks) = self.blocks.lock() {
                        blocks.put(index, data.clone());
                    }
                }
                if let Ok(mut in_flight) = self.in_flight.lock() {
                    in_flight.remove(&index);
                }
                result
            })
            .await;

        result.clone()
    }

    fn lookup(&self, index: u64) -> Option<Bytes> {
        self.blocks.lock().ok()?.get(&index).cloned()
    }

    async fn fetch(&self, index: u64) -> Result<Bytes, IoError> {
        let offset = index * self.block_size as u64;
        let size = self.inner.size();
        let remaining = size.saturating_sub(offset);
        if remaining == 0 {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: self.block_size as u64,
                size,
            });
        }

        let len = remaining.min(self.block_size as u64) as usize;
        self.inner.read_exact_at(offset, len).await
    }
}

#[async_trait]
impl<R: RangeReader + 'static> RangeReader for BlockCache<R> {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let size = self.inner.size();
        if offset.saturating_add(len as u64) > size {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size,
            });
        }
        if len == 0 {
            return Ok(Bytes::new());
        }

        let block_size = self.block_size as u64;
        let first = offset / block_size;
        let last = (offset + len as u64 - 1) / block_size;

        if first == last {
            let block = self.block(first).await?;
            let start = (offset % block_size) as usize;
            return Ok(block.slice(start..start + len));
        }

        let mut out = BytesMut::with_capacity(len);
        let mut cursor = offset;
        for index in first..=last {
            let block = self.block(index).await?;
            let start = (cursor % block_size) as usize;
            let take = (block.len() - start).min(len - out.len());
            out.extend_from_slice(&block[start..start + take]);
            cursor += take as u64;
        }
        Ok(out.freeze())
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}
