//! Result caches fronting the mermaid CLI.
//!
//! The render service only relies on `has`/`get`/`set`. Eviction belongs to the
//! backend: the file cache never evicts on its own (operators prune the
//! directory), the memory cache drops least recently used blobs once full.
//!
//! Backends are selected in `mermaid-render.toml`:
//!
//! ```toml
//! [cache]
//! backend = "file"        # file | memory | none
//! directory = "/var/cache/mermaid-render"
//! memory_entries = 256
//! ```

mod file;
mod lock;
mod memory;

use std::sync::Arc;

use thiserror::Error;

use crate::config::{CacheBackendKind, CacheSettings};
use crate::domain::CacheKey;

pub use file::FileCache;
pub use memory::MemoryCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no cached blob for key {0}")]
    NotFound(CacheKey),
    #[error("{backend} cache unavailable: {reason}")]
    Unavailable {
        backend: &'static str,
        reason: String,
    },
}

impl CacheError {
    pub(crate) fn unavailable(backend: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            backend,
            reason: reason.into(),
        }
    }
}

/// Key to blob store consulted before every render.
///
/// Implementations must tolerate concurrent callers. Writing the same key
/// twice is allowed; the last write wins since equal keys always carry equal
/// bytes.
pub trait ResultCache: Send + Sync {
    fn has(&self, key: &CacheKey) -> Result<bool, CacheError>;

    /// Fails with [`CacheError::NotFound`] when the key is absent.
    fn get(&self, key: &CacheKey) -> Result<Vec<u8>, CacheError>;

    fn set(&self, key: &CacheKey, blob: &[u8]) -> Result<(), CacheError>;
}

/// Open the backend selected by `settings`; `Ok(None)` when caching is disabled.
pub fn open(settings: &CacheSettings) -> Result<Option<Arc<dyn ResultCache>>, CacheError> {
    match settings.backend {
        CacheBackendKind::File => {
            let cache = FileCache::new(settings.directory.clone())?;
            Ok(Some(Arc::new(cache)))
        }
        CacheBackendKind::Memory => Ok(Some(Arc::new(MemoryCache::new(settings.memory_entries)))),
        CacheBackendKind::None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use tempfile::TempDir;

    use super::*;

    fn settings(backend: CacheBackendKind, dir: &TempDir) -> CacheSettings {
        CacheSettings {
            backend,
            directory: dir.path().join("blobs"),
            memory_entries: NonZeroUsize::new(4).expect("non-zero"),
        }
    }

    #[test]
    fn disabled_backend_opens_to_none() {
        let dir = TempDir::new().expect("temp dir");
        let cache = open(&settings(CacheBackendKind::None, &dir)).expect("open");
        assert!(cache.is_none());
        assert!(!dir.path().join("blobs").exists());
    }

    #[test]
    fn file_backend_creates_its_directory() {
        let dir = TempDir::new().expect("temp dir");
        let cache = open(&settings(CacheBackendKind::File, &dir)).expect("open");
        assert!(cache.is_some());
        assert!(dir.path().join("blobs").is_dir());
    }

    #[test]
    fn memory_backend_opens() {
        let dir = TempDir::new().expect("temp dir");
        let cache = open(&settings(CacheBackendKind::Memory, &dir))
            .expect("open")
            .expect("memory cache");
        let key = crate::domain::KeyMaterial {
            format: crate::domain::OutputFormat::Svg,
            source: b"graph TD; A-->B;",
            config: b"{}",
            diagram_config: b"",
            secondary: None,
        }
        .derive();
        assert!(!cache.has(&key).expect("has"));
    }
}
