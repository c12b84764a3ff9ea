//! Mapping from executable file IDs to their symbolization metadata.
use crate::error::Result;
use crate::k8s::cache::errors::invalid_config_error;
use lru::LruCache;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::{debug, warn};

/// 64-bit content hash identifying an executable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingFile {
    pub file_id: FileId,
    pub file_name: String,
    pub gnu_build_id: Option<String>,
}

pub trait FileIdMapper: Send + Sync {
    /// Metadata stored for `file_id`, if still known.
    fn get(&self, file_id: FileId) -> Option<MappingFile>;

    /// Associate `metadata` with `file_id`.
    fn set(&self, file_id: FileId, metadata: MappingFile);
}

/// Bounded mapper evicting the least recently used file.
pub struct LruFileIdMapper {
    cache: Mutex<LruCache<FileId, MappingFile>>,
}

impl LruFileIdMapper {
    /// # Errors
    ///
    /// Returns an error if `size` is zero
    pub fn new(size: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(size)
            .ok_or_else(|| invalid_config_error("file_id_cache_size", "must be greater than 0"))?;
        Ok(Self {
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FileIdMapper for LruFileIdMapper {
    fn get(&self, file_id: FileId) -> Option<MappingFile> {
        let found = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&file_id)
            .cloned();
        if found.is_none() {
            warn!("failed to lookup file ID {}", file_id);
        }
        found
    }

    fn set(&self, file_id: FileId, metadata: MappingFile) {
        debug!("stored file ID mapping {} -> {}", file_id, metadata.file_name);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(file_id, metadata);
    }
}

/// Unbounded mapper backed by a plain map.
#[derive(Default)]
pub struct MapFileIdMapper {
    files: RwLock<HashMap<FileId, MappingFile>>,
}

impl MapFileIdMapper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileIdMapper for MapFileIdMapper {
    fn get(&self, file_id: FileId) -> Option<MappingFile> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&file_id)
            .cloned()
    }

    fn set(&self, file_id: FileId, metadata: MappingFile) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(file_id, metadata);
    }
}
