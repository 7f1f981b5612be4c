use std::{num::NonZeroUsize, sync::Arc, sync::RwLock};

use lru::LruCache;

use super::lock::{rw_read, rw_write};
use super::{CacheError, ResultCache};
use crate::domain::CacheKey;

const SOURCE: &str = "infra::cache::memory";

/// In-process LRU of rendered blobs, bounded by entry count.
pub struct MemoryCache {
    blobs: RwLock<LruCache<CacheKey, Arc<[u8]>>>,
}

impl MemoryCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            blobs: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.blobs, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultCache for MemoryCache {
    fn has(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(rw_read(&self.blobs, SOURCE, "has").contains(key))
    }

    fn get(&self, key: &CacheKey) -> Result<Vec<u8>, CacheError> {
        rw_write(&self.blobs, SOURCE, "get")
            .get(key)
            .map(|blob| blob.to_vec())
            .ok_or(CacheError::NotFound(*key))
    }

    fn set(&self, key: &CacheKey, blob: &[u8]) -> Result<(), CacheError> {
        rw_write(&self.blobs, SOURCE, "set").put(*key, Arc::from(blob));
        Ok(())
    }
}
