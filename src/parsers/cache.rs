use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::core::loader::content_hash;
use crate::core::AnalysisRecord;
use crate::error::CacheError;

pub const DEFAULT_MAX_MEMORY_ENTRIES: usize = 1000;

type CacheKey = (String, String);

/// On-disk form of a cache entry. The key is stored alongside the record so a
/// file that landed under the wrong name is detected instead of trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub path: String,
    pub content_hash: String,
    pub record: AnalysisRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(AnalysisRecord),
    Miss,
    /// A disk entry exists but cannot be used. Callers treat it as a miss.
    Corrupt(String),
}

/// Content-addressed result cache: a bounded in-memory tier in front of
/// an optional directory of bincode files.
pub struct ResultCache {
    memory_cache: DashMap<CacheKey, AnalysisRecord>,
    cache_dir: Option<PathBuf>,
    max_memory_entries: usize,
}

impl ResultCache {
    /// Opens the disk tier at `cache_dir`. A directory that cannot be created
    /// leaves the cache memory-only.
    pub fn new(cache_dir: Option<PathBuf>, max_memory_entries: usize) -> Self {
        let cache_dir = cache_dir.and_then(|dir| match fs::create_dir_all(&dir) {
            Ok(()) => Some(dir),
            Err(err) => {
                tracing::warn!(
                    "Failed to initialize disk cache at {}: {err}; using memory only",
                    dir.display()
                );
                None
            }
        });

        Self {
            memory_cache: DashMap::with_capacity(max_memory_entries.min(4096)),
            cache_dir,
            max_memory_entries: max_memory_entries.max(1),
        }
    }

    pub fn in_memory_only() -> Self {
        Self::new(None, DEFAULT_MAX_MEMORY_ENTRIES)
    }

    pub fn has_disk_tier(&self) -> bool {
        self.cache_dir.is_some()
    }

    pub fn get(&self, path: &str, hash: &str) -> CacheLookup {
        let key = (path.to_string(), hash.to_string());
        if let Some(record) = self.memory_cache.get(&key) {
            return CacheLookup::Hit(record.clone());
        }

        let Some(cache_path) = self.cache_path(path, hash) else {
            return CacheLookup::Miss;
        };

        match self.load_from_disk(&cache_path, path, hash) {
            Ok(Some(record)) => {
                self.remember(key, record.clone());
                CacheLookup::Hit(record)
            }
            Ok(None) => CacheLookup::Miss,
            Err(err) => CacheLookup::Corrupt(err.to_string()),
        }
    }

    /// Stores `record` in both tiers. Concurrent writers of the same key are
    /// last-write-wins; a reader never sees a partially written file.
    pub fn put(&self, path: &str, hash: &str, record: &AnalysisRecord) -> Result<(), CacheError> {
        self.remember((path.to_string(), hash.to_string()), record.clone());

        if let (Some(cache_dir), Some(cache_path)) =
            (self.cache_dir.as_ref(), self.cache_path(path, hash))
        {
            let entry = CacheEntry {
                path: path.to_string(),
                content_hash: hash.to_string(),
                record: record.clone(),
            };
            let data = bincode::serialize(&entry)?;
            let mut temp = tempfile::NamedTempFile::new_in(cache_dir)?;
            temp.write_all(&data)?;
            temp.persist(&cache_path).map_err(|err| err.error)?;
        }

        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_entries: self.memory_cache.len(),
            disk_entries: self.disk_entry_count(),
        }
    }

    fn remember(&self, key: CacheKey, record: AnalysisRecord) {
        if self.memory_cache.len() >= self.max_memory_entries && !self.memory_cache.contains_key(&key)
        {
            if let Some(entry) = self.memory_cache.iter().next() {
                let evicted = entry.key().clone();
                drop(entry);
                self.memory_cache.remove(&evicted);
            }
        }
        self.memory_cache.insert(key, record);
    }

    fn cache_path(&self, path: &str, hash: &str) -> Option<PathBuf> {
        let cache_dir = self.cache_dir.as_ref()?;
        let digest = content_hash(format!("{path}\0{hash}").as_bytes());
        Some(cache_dir.join(format!("{digest}.bincode")))
    }

    fn load_from_disk(
        &self,
        cache_path: &Path,
        path: &str,
        hash: &str,
    ) -> Result<Option<AnalysisRecord>, CacheError> {
        let data = match fs::read(cache_path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let entry: CacheEntry = bincode::deserialize(&data)?;
        if entry.path != path || entry.content_hash != hash {
            return Err(CacheError::KeyMismatch {
                stored: format!("{}@{}", entry.path, entry.content_hash),
                requested: format!("{path}@{hash}"),
            });
        }
        Ok(Some(entry.record))
    }

    fn disk_entry_count(&self) -> usize {
        self.cache_dir
            .as_ref()
            .and_then(|dir| fs::read_dir(dir).ok())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "bincode"))
                    .count()
            })
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub disk_entries: usize,
}
