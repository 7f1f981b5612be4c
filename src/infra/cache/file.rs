use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::debug;

use super::{CacheError, ResultCache};
use crate::domain::CacheKey;

const BACKEND: &str = "file";

/// One file per key under a cache directory.
///
/// Blobs are staged in a sibling temp file and renamed into place, so readers
/// in this or any other process never observe a partially written blob.
#[derive(Debug, Clone)]
pub struct FileCache {
    directory: PathBuf,
}

impl FileCache {
    pub fn new(directory: PathBuf) -> Result<Self, CacheError> {
        fs::create_dir_all(&directory).map_err(|err| {
            CacheError::unavailable(
                BACKEND,
                format!("failed to create {}: {err}", directory.display()),
            )
        })?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn blob_path(&self, key: &CacheKey) -> PathBuf {
        self.directory.join(format!("{key}.bin"))
    }
}

impl ResultCache for FileCache {
    fn has(&self, key: &CacheKey) -> Result<bool, CacheError> {
        match fs::metadata(self.blob_path(key)) {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(CacheError::unavailable(BACKEND, err.to_string())),
        }
    }

    fn get(&self, key: &CacheKey) -> Result<Vec<u8>, CacheError> {
        match fs::read(self.blob_path(key)) {
            Ok(blob) => Ok(blob),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(CacheError::NotFound(*key)),
            Err(err) => Err(CacheError::unavailable(BACKEND, err.to_string())),
        }
    }

    fn set(&self, key: &CacheKey, blob: &[u8]) -> Result<(), CacheError> {
        let path = self.blob_path(key);
        let mut staged = NamedTempFile::new_in(&self.directory)
            .map_err(|err| CacheError::unavailable(BACKEND, err.to_string()))?;
        staged
            .write_all(blob)
            .and_then(|()| staged.flush())
            .map_err(|err| CacheError::unavailable(BACKEND, err.to_string()))?;
        staged
            .persist(&path)
            .map_err(|err| CacheError::unavailable(BACKEND, err.error.to_string()))?;

        debug!(
            target = "infra::cache::file",
            op = "file_cache::set",
            cache_path = %path.display(),
            blob_bytes = blob.len(),
            "Stored rendered diagram"
        );
        Ok(())
    }
}
